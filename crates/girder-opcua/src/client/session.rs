// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session identity and per-session configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::UaResult;
use crate::stack::UaSession;
use crate::types::{ClientCertificate, ClientConfig, EndpointTarget, SecurityMode, UserToken};

// =============================================================================
// SessionKey
// =============================================================================

/// Pooling identity of a session.
///
/// Derived from an [`EndpointTarget`] with the target's optional fields
/// substituted by their defaults, so a target that spells out a default
/// explicitly and one that omits it map to the same key. Alternative URLs
/// never participate: two targets with different primary URLs are
/// distinct keys even when they describe the same physical server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Endpoint URL.
    pub url: String,

    /// Security mode, defaults substituted.
    pub security_mode: SecurityMode,

    /// Security policy URI, when the target pins one.
    pub security_policy: Option<String>,

    /// Credential, including its value. Sessions activated under
    /// different credentials are never interchangeable.
    pub token: UserToken,

    /// Trust flag, defaults substituted.
    pub is_trusted: bool,
}

impl From<&EndpointTarget> for SessionKey {
    fn from(target: &EndpointTarget) -> Self {
        Self {
            url: target.url.clone(),
            security_mode: target.security_mode,
            security_policy: target.security_policy.clone(),
            token: target.user_token.clone(),
            is_trusted: target.trusted(),
        }
    }
}

// =============================================================================
// SessionConfig
// =============================================================================

/// Configuration snapshot a single session is created under.
///
/// Captures the application configuration and the client certificate at
/// creation time. Pooled sessions are revalidated against the *current*
/// certificate on acquire, so a snapshot taken under a replaced
/// certificate marks its session stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Application configuration the session was created with.
    pub application: ClientConfig,

    /// Client certificate bound into the session, when one was
    /// configured.
    pub client_certificate: Option<ClientCertificate>,

    /// Whether the stack's certificate validator should accept untrusted
    /// server certificates for this session.
    pub auto_accept_untrusted: bool,
}

impl SessionConfig {
    /// Validates the snapshot as a client application configuration.
    pub fn validate(&self) -> UaResult<()> {
        self.application.validate()
    }
}

// =============================================================================
// PooledSession
// =============================================================================

/// A live session together with everything needed to revalidate and
/// recreate it.
///
/// Value semantics: acquiring one removes it from the pool entirely, so
/// no two callers ever share it. Releasing moves it back.
#[derive(Debug)]
pub struct PooledSession<H: UaSession> {
    /// Unique session name, for logs and targeted eviction.
    pub name: String,

    /// Configuration the session was created under.
    pub config: SessionConfig,

    /// Target the session was created for.
    pub target: EndpointTarget,

    /// The live handle.
    pub handle: Arc<H>,
}

impl<H: UaSession> PooledSession<H> {
    /// Creates a pooled session with a fresh unique name.
    pub fn new(config: SessionConfig, target: EndpointTarget, handle: Arc<H>) -> Self {
        Self {
            name: uuid::Uuid::new_v4().to_string(),
            config,
            target,
            handle,
        }
    }

    /// Recomputes the pooling key from the stored target.
    pub fn key(&self) -> SessionKey {
        SessionKey::from(&self.target)
    }
}
