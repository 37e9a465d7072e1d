// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol stack abstraction.
//!
//! The engine never talks OPC UA wire bytes itself; everything below the
//! session boundary lives behind these traits. A production deployment
//! binds them to a real protocol library, tests bind them to an in-memory
//! mock. The traits carry only the operations the engine actually drives:
//! discovery reads ([`UaDiscovery`]), session lifecycle ([`UaSession`]),
//! and the two entry points that produce them ([`UaStack`]).
//!
//! Failures cross this boundary as [`ServiceFault`], a raw status-bearing
//! error the engine classifies into its own taxonomy at the seam.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::client::SessionConfig;
use crate::error::{self, UaError};
use crate::types::{EndpointDescription, NetworkServer, ServerDescription, UserToken};

// =============================================================================
// ServiceFault
// =============================================================================

/// Low-level failure reported by the protocol stack.
///
/// Carries the raw OPC UA status code; the engine converts it into a
/// [`UaError`] via the status classification table.
#[derive(Debug, Clone, Error)]
pub struct ServiceFault {
    /// The OPC UA status code.
    pub status: u32,

    /// Symbolic identifier reported by the stack, when available.
    pub symbolic_id: Option<String>,
}

impl ServiceFault {
    /// Creates a fault from a status code.
    pub fn new(status: u32) -> Self {
        Self {
            status,
            symbolic_id: error::status::symbolic_name(status).map(str::to_string),
        }
    }

    /// Creates a fault with an explicit symbolic identifier.
    pub fn with_symbolic_id(status: u32, symbolic_id: impl Into<String>) -> Self {
        Self {
            status,
            symbolic_id: Some(symbolic_id.into()),
        }
    }
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbolic_id {
            Some(id) => write!(f, "service fault {} ({:#010x})", id, self.status),
            None => write!(f, "service fault {:#010x}", self.status),
        }
    }
}

impl From<ServiceFault> for UaError {
    fn from(fault: ServiceFault) -> Self {
        let err = UaError::from_status(fault.status);
        // Vendor-specific codes are absent from the local table; a
        // symbolic id reported by the stack beats the hex fallback.
        match (err.symbolic_id(), fault.symbolic_id) {
            (None, Some(id)) => err.with_detail(id),
            _ => err,
        }
    }
}

// =============================================================================
// UserIdentity
// =============================================================================

/// Identity presented to the stack when activating a session.
#[derive(Debug, Clone)]
pub enum UserIdentity {
    /// Anonymous activation.
    Anonymous,

    /// Username/password activation.
    UserName {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },

    /// X.509 certificate activation.
    X509Certificate {
        /// DER-encoded certificate bytes.
        der: Vec<u8>,
    },
}

impl From<&UserToken> for UserIdentity {
    fn from(token: &UserToken) -> Self {
        match token {
            UserToken::Anonymous => Self::Anonymous,
            UserToken::UserName { username, password } => Self::UserName {
                username: username.clone(),
                password: password.clone(),
            },
            UserToken::X509Certificate { der } => Self::X509Certificate { der: der.clone() },
        }
    }
}

// =============================================================================
// KeepAlive
// =============================================================================

/// Action a keep-alive handler returns to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    /// Keep the session alive.
    Continue,

    /// Cancel keep-alive monitoring; the session is being torn down.
    Cancel,
}

/// Keep-alive handler installed on a live session. Receives the status
/// code of each keep-alive response.
pub type KeepAliveHandler = Box<dyn Fn(u32) -> KeepAlive + Send + Sync>;

// =============================================================================
// UaSession
// =============================================================================

/// A live session handle owned by the pool.
#[async_trait]
pub trait UaSession: Send + Sync + 'static {
    /// Returns `true` while the underlying secure channel is usable.
    fn is_connected(&self) -> bool;

    /// Installs the keep-alive handler. Called once, right after the
    /// session opens.
    fn set_keep_alive(&self, handler: KeepAliveHandler);

    /// Closes the session and releases its secure channel.
    async fn close(&self) -> Result<(), ServiceFault>;
}

// =============================================================================
// UaDiscovery
// =============================================================================

/// A discovery channel to a single server URL.
#[async_trait]
pub trait UaDiscovery: Send + Sync {
    /// Returns the endpoints the server advertises.
    async fn get_endpoints(&self) -> Result<Vec<EndpointDescription>, ServiceFault>;

    /// Enumerates servers known to the local discovery server, including
    /// their capability tags. Older servers do not implement this.
    async fn find_servers_on_network(&self) -> Result<Vec<NetworkServer>, ServiceFault>;

    /// Returns the applications the server knows about.
    async fn find_servers(&self) -> Result<Vec<ServerDescription>, ServiceFault>;
}

// =============================================================================
// UaStack
// =============================================================================

/// Entry points into the protocol stack.
#[async_trait]
pub trait UaStack: Send + Sync + 'static {
    /// Discovery channel type.
    type Discovery: UaDiscovery;

    /// Session handle type.
    type Session: UaSession;

    /// Opens a discovery channel to `url`.
    async fn connect_discovery(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Self::Discovery, ServiceFault>;

    /// Opens and activates a session on the given endpoint.
    ///
    /// Returns `Ok(None)` when the stack reports success but yields no
    /// session object; the engine treats that as a fatal engine error.
    async fn open_session(
        &self,
        config: &SessionConfig,
        endpoint: &EndpointDescription,
        identity: &UserIdentity,
        timeout: Duration,
    ) -> Result<Option<Arc<Self::Session>>, ServiceFault>;
}
