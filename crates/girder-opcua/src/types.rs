// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core value types for the session engine.
//!
//! This module defines the caller-facing description of *what* to connect
//! to ([`EndpointTarget`]), the wire-level descriptions discovery returns
//! ([`EndpointDescription`], [`ServerDescription`]), and the process-wide
//! application configuration the engine treats as mostly opaque input
//! ([`ClientConfig`]).
//!
//! # Examples
//!
//! ```
//! use girder_opcua::types::{EndpointTarget, SecurityMode};
//!
//! let target = EndpointTarget::builder("opc.tcp://plant:4840")
//!     .security_mode(SecurityMode::Best)
//!     .trusted(true)
//!     .build()
//!     .unwrap();
//! assert_eq!(target.security_mode, SecurityMode::Best);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{UaError, UaResult};

/// Transport profile URI of the OPC UA binary TCP transport, the only
/// transport this engine supports.
pub const TRANSPORT_PROFILE_TCP: &str =
    "http://opcfoundation.org/UA-Profile/Transport/uatcp-uasc-uabinary";

/// Default OPC UA discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = 4840;

// =============================================================================
// SecurityMode
// =============================================================================

/// Requested message security posture for a target.
///
/// `Best` defers the decision to the endpoint selector, which picks the
/// strongest compatible endpoint when a client certificate is available
/// and the weakest otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Let the selector decide.
    #[default]
    Best,

    /// No security (messages are neither signed nor encrypted).
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns `true` if an endpoint with the given wire mode satisfies
    /// this preference.
    pub fn accepts(&self, wire: MessageSecurityMode) -> bool {
        match self {
            Self::Best => true,
            Self::None => wire == MessageSecurityMode::None,
            Self::Sign => wire == MessageSecurityMode::Sign,
            Self::SignAndEncrypt => wire == MessageSecurityMode::SignAndEncrypt,
        }
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Best => "Best",
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// MessageSecurityMode
// =============================================================================

/// Security mode advertised by an endpoint on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageSecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl MessageSecurityMode {
    /// Returns the OPC UA enumeration value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Sign => 2,
            Self::SignAndEncrypt => 3,
        }
    }

    /// Creates from the OPC UA enumeration value.
    pub const fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::None),
            2 => Some(Self::Sign),
            3 => Some(Self::SignAndEncrypt),
            _ => None,
        }
    }
}

// =============================================================================
// UserToken
// =============================================================================

/// Credential the engine presents when activating a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserToken {
    /// Anonymous authentication.
    #[default]
    Anonymous,

    /// Username and password authentication.
    UserName {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },

    /// X.509 certificate authentication.
    X509Certificate {
        /// DER-encoded certificate bytes.
        der: Vec<u8>,
    },
}

impl UserToken {
    /// Returns `true` if this is anonymous authentication.
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns the token type name.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::UserName { .. } => "UserName",
            Self::X509Certificate { .. } => "X509Certificate",
        }
    }
}

impl fmt::Display for UserToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { username, .. } => write!(f, "UserName({})", username),
            Self::X509Certificate { der } => write!(f, "X509Certificate(<{} bytes>)", der.len()),
        }
    }
}

// =============================================================================
// EndpointTarget
// =============================================================================

/// Caller-supplied description of what server to connect to and how.
///
/// Two targets that normalize to the same [`SessionKey`] are
/// interchangeable for session reuse; `alternative_urls` is carried for
/// callers but never participates in pooling identity.
///
/// [`SessionKey`]: crate::client::SessionKey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTarget {
    /// Endpoint URL, e.g. `opc.tcp://plant:4840`.
    pub url: String,

    /// Requested security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Requested security policy URI; `None` accepts any policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,

    /// Credential to activate the session with.
    #[serde(default)]
    pub user_token: UserToken,

    /// Whether the server is explicitly trusted, bypassing untrusted
    /// certificate rejection. Unset means not trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trusted: Option<bool>,

    /// Alternative URLs for the same server. Informational only.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub alternative_urls: BTreeSet<String>,
}

impl EndpointTarget {
    /// Creates a target with defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            security_mode: SecurityMode::Best,
            security_policy: None,
            user_token: UserToken::Anonymous,
            is_trusted: None,
            alternative_urls: BTreeSet::new(),
        }
    }

    /// Returns a builder for this target.
    pub fn builder(url: impl Into<String>) -> EndpointTargetBuilder {
        EndpointTargetBuilder {
            target: Self::new(url),
        }
    }

    /// Returns the trust flag with the default substituted.
    #[inline]
    pub fn trusted(&self) -> bool {
        self.is_trusted.unwrap_or(false)
    }
}

/// Builder for [`EndpointTarget`].
#[derive(Debug, Clone)]
pub struct EndpointTargetBuilder {
    target: EndpointTarget,
}

impl EndpointTargetBuilder {
    /// Sets the security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.target.security_mode = mode;
        self
    }

    /// Sets the security policy URI.
    pub fn security_policy(mut self, policy: impl Into<String>) -> Self {
        self.target.security_policy = Some(policy.into());
        self
    }

    /// Sets username/password authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.target.user_token = UserToken::UserName {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Sets X.509 certificate authentication.
    pub fn certificate_token(mut self, der: Vec<u8>) -> Self {
        self.target.user_token = UserToken::X509Certificate { der };
        self
    }

    /// Marks the server as explicitly trusted.
    pub fn trusted(mut self, trusted: bool) -> Self {
        self.target.is_trusted = Some(trusted);
        self
    }

    /// Adds an alternative URL.
    pub fn alternative_url(mut self, url: impl Into<String>) -> Self {
        self.target.alternative_urls.insert(url.into());
        self
    }

    /// Builds the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty.
    pub fn build(self) -> UaResult<EndpointTarget> {
        if self.target.url.is_empty() {
            return Err(UaError::invalid_argument("endpoint url must not be empty"));
        }
        Ok(self.target)
    }
}

// =============================================================================
// ApplicationType
// =============================================================================

/// Kind of OPC UA application a server advertises itself as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// A regular server.
    #[default]
    Server,

    /// A client-only application.
    Client,

    /// Both client and server.
    ClientAndServer,

    /// A discovery server. Excluded from crawl results.
    DiscoveryServer,
}

// =============================================================================
// ServerDescription
// =============================================================================

/// Application description of the server behind an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerDescription {
    /// Application URI.
    pub application_uri: String,

    /// Human-readable application name.
    pub application_name: String,

    /// Application type.
    pub application_type: ApplicationType,

    /// Discovery URLs the server advertises.
    #[serde(default)]
    pub discovery_urls: Vec<String>,
}

// =============================================================================
// EndpointDescription
// =============================================================================

/// Endpoint description as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescription {
    /// The endpoint URL.
    pub endpoint_url: String,

    /// Wire security mode of the endpoint.
    pub security_mode: MessageSecurityMode,

    /// Security policy URI of the endpoint.
    pub security_policy_uri: String,

    /// Transport profile URI.
    pub transport_profile_uri: String,

    /// Relative security strength assigned by the server; higher is
    /// stronger. Used only for tie-breaking during selection.
    pub security_level: u8,

    /// The server behind this endpoint.
    pub server: ServerDescription,

    /// DER-encoded server certificate, when one is advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_certificate: Option<Vec<u8>>,
}

// =============================================================================
// NetworkServer
// =============================================================================

/// Entry returned by the network-wide server enumeration
/// (`FindServersOnNetwork`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServer {
    /// Record id assigned by the discovery server.
    pub record_id: u32,

    /// Server name.
    pub server_name: String,

    /// Discovery URL of the server.
    pub discovery_url: String,

    /// Server capability tags, e.g. `LDS`, `DA`, `HD`.
    #[serde(default)]
    pub server_capabilities: Vec<String>,
}

// =============================================================================
// DiscoveryResult
// =============================================================================

/// An endpoint found by the discovery crawl, tagged with the capability
/// list accumulated along the crawl path that reached it.
///
/// Equality and hashing consider only the description, so inserting into
/// a set deduplicates endpoints regardless of which path found them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// The discovered endpoint.
    pub description: EndpointDescription,

    /// Inherited server capability tags.
    pub capabilities: Vec<String>,
}

impl PartialEq for DiscoveryResult {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
    }
}

impl Eq for DiscoveryResult {}

impl std::hash::Hash for DiscoveryResult {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.description.hash(state);
    }
}

// =============================================================================
// ClientCertificate
// =============================================================================

/// The process client certificate bound into each session configuration.
///
/// Compared bytewise when validating pooled sessions for reuse: a session
/// created under a different certificate is stale and gets disposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertificate {
    /// DER-encoded certificate bytes.
    pub der: Vec<u8>,

    /// Application URI embedded in the certificate, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,
}

impl ClientCertificate {
    /// Creates a certificate from DER bytes.
    pub fn new(der: Vec<u8>) -> Self {
        Self {
            der,
            application_uri: None,
        }
    }

    /// Creates a certificate with a known application URI.
    pub fn with_application_uri(der: Vec<u8>, application_uri: impl Into<String>) -> Self {
        Self {
            der,
            application_uri: Some(application_uri.into()),
        }
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Process-wide application configuration.
///
/// Produced by an external configuration layer and treated as opaque input
/// by the engine: each new session snapshots it into a per-session
/// configuration. Store paths and transport quotas are passed through to
/// the underlying protocol stack unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Application name advertised during session creation.
    pub application_name: String,

    /// Application URI.
    pub application_uri: String,

    /// Path of the application certificate store.
    pub certificate_store_path: String,

    /// Path of the trusted peer certificate store.
    pub trusted_peer_store_path: String,

    /// Path of the trusted issuer certificate store.
    pub trusted_issuer_store_path: String,

    /// Path of the rejected certificate store.
    pub rejected_store_path: String,

    /// Default session timeout.
    pub session_timeout: Duration,

    /// Default service operation timeout.
    pub operation_timeout: Duration,

    /// Maximum string length the transport accepts.
    pub max_string_length: u32,

    /// Maximum byte string length the transport accepts.
    pub max_byte_string_length: u32,

    /// Maximum array length the transport accepts.
    pub max_array_length: u32,

    /// Maximum message size the transport accepts.
    pub max_message_size: u32,

    /// Nonce length used during the secure channel handshake.
    pub nonce_length: u32,
}

impl ClientConfig {
    /// Validates this configuration as a client application configuration.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidArgument`] error when a required
    /// field is empty or a quota is zero.
    ///
    /// [`ErrorKind::InvalidArgument`]: crate::error::ErrorKind::InvalidArgument
    pub fn validate(&self) -> UaResult<()> {
        if self.application_name.is_empty() {
            return Err(UaError::invalid_argument("application name must not be empty"));
        }
        if self.application_uri.is_empty() {
            return Err(UaError::invalid_argument("application uri must not be empty"));
        }
        if self.max_message_size == 0 {
            return Err(UaError::invalid_argument("max message size must not be zero"));
        }
        if self.session_timeout.is_zero() {
            return Err(UaError::invalid_argument("session timeout must not be zero"));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            application_name: "Girder OPC UA Client".to_string(),
            application_uri: "urn:girder:opcua:client".to_string(),
            certificate_store_path: "pki/own".to_string(),
            trusted_peer_store_path: "pki/trusted".to_string(),
            trusted_issuer_store_path: "pki/issuer".to_string(),
            rejected_store_path: "pki/rejected".to_string(),
            session_timeout: Duration::from_secs(120),
            operation_timeout: Duration::from_secs(120),
            max_string_length: u16::MAX as u32,
            max_byte_string_length: u16::MAX as u32 * 16,
            max_array_length: u16::MAX as u32,
            max_message_size: u16::MAX as u32 * 32,
            nonce_length: 32,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
