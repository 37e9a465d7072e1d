// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error taxonomy for OPC UA service execution.
//!
//! Every failure surfaced by this crate carries exactly one [`ErrorKind`]
//! from a closed set, plus the original low-level OPC UA status code when
//! one exists. Callers pattern-match on the kind; they never need to know
//! the several hundred `Bad*` status codes the wire can produce.
//!
//! # Classification
//!
//! [`classify`] maps a status code to a kind. The mapping is total and
//! deterministic: codes are grouped by cause, and anything unrecognized
//! falls through to [`ErrorKind::Generic`] rather than failing.
//!
//! ```text
//! transport/channel failures   -> Connection / Communication
//! resource exhaustion          -> ServerBusy
//! malformed wire data          -> Protocol / Format
//! timing                      -> Timeout
//! application/semantic errors  -> InvalidOperation / InvalidArgument
//! broken trust chain           -> CertificateInvalid
//! valid chain, not trusted     -> CertificateUntrusted
//! access control               -> Unauthorized
//! capability gaps              -> NotSupported / NotImplemented
//! everything else              -> Generic
//! ```
//!
//! Certificate failures are split in two because they need different
//! recovery: an invalid certificate must be re-validated or renewed, while
//! an untrusted one needs an operator to extend trust.
//!
//! # Examples
//!
//! ```
//! use girder_opcua::error::{classify, status, ErrorKind};
//!
//! assert_eq!(classify(status::BAD_TCP_SERVER_TOO_BUSY), ErrorKind::ServerBusy);
//! assert_eq!(classify(status::BAD_CERTIFICATE_UNTRUSTED), ErrorKind::CertificateUntrusted);
//! assert!(ErrorKind::Timeout.is_transient());
//! ```

use std::fmt;

use thiserror::Error;

/// Convenience result alias for this crate.
pub type UaResult<T> = Result<T, UaError>;

// =============================================================================
// ErrorKind
// =============================================================================

/// Closed set of domain error kinds.
///
/// The five transient kinds ([`is_transient`](ErrorKind::is_transient))
/// are the only ones eligible for the executor's single-retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Endpoint unreachable, rejected, or no compatible endpoint found.
    Connection,

    /// Server is out of sessions, licenses, or worker capacity.
    ServerBusy,

    /// The peer violated the binary protocol framing rules.
    Protocol,

    /// The secure channel or session broke mid-conversation.
    Communication,

    /// A request or connect attempt ran out of time.
    Timeout,

    /// The operation is not valid for the addressed node.
    InvalidOperation,

    /// A request argument was missing, mistyped, or out of range.
    InvalidArgument,

    /// A certificate in the chain is malformed, expired, or revoked.
    CertificateInvalid,

    /// The certificate chain is valid but not trusted.
    CertificateUntrusted,

    /// Credentials were rejected or access was denied.
    Unauthorized,

    /// A message could not be encoded or decoded.
    Format,

    /// The server does not support the requested service or encoding.
    NotSupported,

    /// The server recognizes the service but has not implemented it.
    NotImplemented,

    /// Anything that does not fit one of the kinds above.
    Generic,
}

impl ErrorKind {
    /// Returns `true` if a fresh session may make the operation succeed.
    ///
    /// Only these kinds are considered by the executor's retry path;
    /// everything else propagates on first occurrence.
    #[inline]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServerBusy
                | Self::Timeout
                | Self::Connection
                | Self::Protocol
                | Self::Communication
        )
    }

    /// Returns the kind name for logging and metrics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::ServerBusy => "server_busy",
            Self::Protocol => "protocol",
            Self::Communication => "communication",
            Self::Timeout => "timeout",
            Self::InvalidOperation => "invalid_operation",
            Self::InvalidArgument => "invalid_argument",
            Self::CertificateInvalid => "certificate_invalid",
            Self::CertificateUntrusted => "certificate_untrusted",
            Self::Unauthorized => "unauthorized",
            Self::Format => "format",
            Self::NotSupported => "not_supported",
            Self::NotImplemented => "not_implemented",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// UaError
// =============================================================================

/// A classified OPC UA failure.
///
/// Immutable once constructed. Errors raised by the engine itself (bad
/// input, missing certificate, no matching endpoint) have no status code;
/// errors derived from a low-level fault keep the original for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct UaError {
    kind: ErrorKind,
    status: Option<u32>,
    detail: String,
}

impl UaError {
    /// Creates an error with an explicit kind and detail message.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            detail: detail.into(),
        }
    }

    /// Creates an error by classifying a low-level status code.
    ///
    /// The detail becomes the symbolic status name when the code is known,
    /// or the hex representation when it is not.
    pub fn from_status(status: u32) -> Self {
        let detail = match status::symbolic_name(status) {
            Some(name) => name.to_string(),
            None => format!("{:#010x}", status),
        };
        Self {
            kind: classify(status),
            status: Some(status),
            detail,
        }
    }

    /// Replaces the detail message, keeping the kind and status.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Creates a connection error.
    pub fn connection(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, detail)
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, detail)
    }

    /// Creates a certificate-invalid error.
    pub fn certificate_invalid(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::CertificateInvalid, detail)
    }

    /// Creates a generic error.
    pub fn generic(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, detail)
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the original low-level status code, if any.
    #[inline]
    pub fn status(&self) -> Option<u32> {
        self.status
    }

    /// Returns the symbolic identifier of the wrapped status, if known.
    pub fn symbolic_id(&self) -> Option<&'static str> {
        self.status.and_then(status::symbolic_name)
    }

    /// Returns the detail message.
    #[inline]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Returns `true` if this error is eligible for the retry path.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Classifies a low-level OPC UA status code into an [`ErrorKind`].
///
/// Total and pure: every input maps to exactly one kind and unknown codes
/// map to [`ErrorKind::Generic`]. This function never fails.
pub fn classify(code: u32) -> ErrorKind {
    use status::*;

    match code {
        BAD_PROTOCOL_VERSION_UNSUPPORTED
        | BAD_CONNECTION_CLOSED
        | BAD_NOT_CONNECTED
        | BAD_TCP_ENDPOINT_URL_INVALID
        | BAD_CONNECTION_REJECTED
        | BAD_SECURITY_MODE_REJECTED
        | BAD_SECURITY_POLICY_REJECTED => ErrorKind::Connection,

        BAD_LICENSE_LIMITS_EXCEEDED | BAD_TCP_SERVER_TOO_BUSY | BAD_TOO_MANY_SESSIONS => {
            ErrorKind::ServerBusy
        }

        BAD_TCP_MESSAGE_TYPE_INVALID
        | BAD_TCP_MESSAGE_TOO_LARGE
        | BAD_SEQUENCE_NUMBER_UNKNOWN
        | BAD_SEQUENCE_NUMBER_INVALID
        | BAD_NONCE_INVALID => ErrorKind::Protocol,

        BAD_SECURE_CHANNEL_CLOSED
        | BAD_SECURE_CHANNEL_TOKEN_UNKNOWN
        | BAD_SECURE_CHANNEL_ID_INVALID
        | BAD_COMMUNICATION_ERROR
        | BAD_TCP_NOT_ENOUGH_RESOURCES
        | BAD_TCP_INTERNAL_ERROR
        | BAD_SESSION_CLOSED
        | BAD_SESSION_ID_INVALID
        | BAD_DISCONNECT => ErrorKind::Communication,

        BAD_TIMEOUT | BAD_REQUEST_TIMEOUT => ErrorKind::Timeout,

        BAD_WRITE_NOT_SUPPORTED | BAD_METHOD_INVALID | BAD_NOT_READABLE | BAD_NOT_WRITABLE => {
            ErrorKind::InvalidOperation
        }

        BAD_TYPE_MISMATCH
        | BAD_ARGUMENTS_MISSING
        | BAD_INVALID_ARGUMENT
        | BAD_TOO_MANY_ARGUMENTS
        | BAD_OUT_OF_RANGE => ErrorKind::InvalidArgument,

        BAD_CERTIFICATE_REVOCATION_UNKNOWN
        | BAD_CERTIFICATE_ISSUER_REVOCATION_UNKNOWN
        | BAD_CERTIFICATE_REVOKED
        | BAD_CERTIFICATE_ISSUER_REVOKED
        | BAD_CERTIFICATE_CHAIN_INCOMPLETE
        | BAD_CERTIFICATE_ISSUER_USE_NOT_ALLOWED
        | BAD_CERTIFICATE_USE_NOT_ALLOWED
        | BAD_CERTIFICATE_URI_INVALID
        | BAD_CERTIFICATE_TIME_INVALID
        | BAD_CERTIFICATE_ISSUER_TIME_INVALID
        | BAD_CERTIFICATE_INVALID
        | BAD_CERTIFICATE_HOST_NAME_INVALID
        | BAD_NO_VALID_CERTIFICATES => ErrorKind::CertificateInvalid,

        BAD_CERTIFICATE_UNTRUSTED => ErrorKind::CertificateUntrusted,

        BAD_USER_ACCESS_DENIED
        | BAD_IDENTITY_TOKEN_INVALID
        | BAD_IDENTITY_TOKEN_REJECTED
        | BAD_REQUEST_NOT_ALLOWED
        | BAD_LICENSE_EXPIRED
        | BAD_LICENSE_NOT_AVAILABLE => ErrorKind::Unauthorized,

        BAD_ENCODING_ERROR
        | BAD_DECODING_ERROR
        | BAD_ENCODING_LIMITS_EXCEEDED
        | BAD_REQUEST_TOO_LARGE
        | BAD_RESPONSE_TOO_LARGE
        | BAD_DATA_ENCODING_INVALID => ErrorKind::Format,

        BAD_DATA_ENCODING_UNSUPPORTED | BAD_SERVICE_UNSUPPORTED | BAD_NOT_SUPPORTED => {
            ErrorKind::NotSupported
        }

        BAD_NOT_IMPLEMENTED => ErrorKind::NotImplemented,

        _ => ErrorKind::Generic,
    }
}

// =============================================================================
// Status Codes
// =============================================================================

/// OPC UA status code constants and helpers.
///
/// Only the codes this engine classifies are listed; anything else is
/// handled by the [`classify`](super::classify) fallback.
pub mod status {
    #![allow(missing_docs)] // the constant names are the documentation

    /// Severity mask. A set top bit marks the status as `Bad`.
    pub const SEVERITY_BAD: u32 = 0x8000_0000;

    /// Returns `true` if the status code has bad severity.
    #[inline]
    pub const fn is_bad(code: u32) -> bool {
        code & SEVERITY_BAD != 0
    }

    // Transport and channel.
    pub const BAD_COMMUNICATION_ERROR: u32 = 0x8005_0000;
    pub const BAD_TIMEOUT: u32 = 0x800A_0000;
    pub const BAD_SERVICE_UNSUPPORTED: u32 = 0x800B_0000;
    pub const BAD_NONCE_INVALID: u32 = 0x8024_0000;
    pub const BAD_SESSION_ID_INVALID: u32 = 0x8025_0000;
    pub const BAD_SESSION_CLOSED: u32 = 0x8026_0000;
    pub const BAD_SECURE_CHANNEL_ID_INVALID: u32 = 0x8022_0000;
    pub const BAD_SEQUENCE_NUMBER_UNKNOWN: u32 = 0x807A_0000;
    pub const BAD_TCP_SERVER_TOO_BUSY: u32 = 0x807D_0000;
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: u32 = 0x807E_0000;
    pub const BAD_TCP_MESSAGE_TOO_LARGE: u32 = 0x8080_0000;
    pub const BAD_TCP_NOT_ENOUGH_RESOURCES: u32 = 0x8081_0000;
    pub const BAD_TCP_INTERNAL_ERROR: u32 = 0x8082_0000;
    pub const BAD_TCP_ENDPOINT_URL_INVALID: u32 = 0x8083_0000;
    pub const BAD_REQUEST_TIMEOUT: u32 = 0x8085_0000;
    pub const BAD_SECURE_CHANNEL_CLOSED: u32 = 0x8086_0000;
    pub const BAD_SECURE_CHANNEL_TOKEN_UNKNOWN: u32 = 0x8087_0000;
    pub const BAD_SEQUENCE_NUMBER_INVALID: u32 = 0x8088_0000;
    pub const BAD_NOT_CONNECTED: u32 = 0x808A_0000;
    pub const BAD_CONNECTION_REJECTED: u32 = 0x80AC_0000;
    pub const BAD_DISCONNECT: u32 = 0x80AD_0000;
    pub const BAD_CONNECTION_CLOSED: u32 = 0x80AE_0000;
    pub const BAD_PROTOCOL_VERSION_UNSUPPORTED: u32 = 0x80BE_0000;

    // Security and trust.
    pub const BAD_CERTIFICATE_INVALID: u32 = 0x8012_0000;
    pub const BAD_CERTIFICATE_TIME_INVALID: u32 = 0x8014_0000;
    pub const BAD_CERTIFICATE_ISSUER_TIME_INVALID: u32 = 0x8015_0000;
    pub const BAD_CERTIFICATE_HOST_NAME_INVALID: u32 = 0x8016_0000;
    pub const BAD_CERTIFICATE_URI_INVALID: u32 = 0x8017_0000;
    pub const BAD_CERTIFICATE_USE_NOT_ALLOWED: u32 = 0x8018_0000;
    pub const BAD_CERTIFICATE_ISSUER_USE_NOT_ALLOWED: u32 = 0x8019_0000;
    pub const BAD_CERTIFICATE_UNTRUSTED: u32 = 0x801A_0000;
    pub const BAD_CERTIFICATE_REVOCATION_UNKNOWN: u32 = 0x801B_0000;
    pub const BAD_CERTIFICATE_ISSUER_REVOCATION_UNKNOWN: u32 = 0x801C_0000;
    pub const BAD_CERTIFICATE_REVOKED: u32 = 0x801D_0000;
    pub const BAD_CERTIFICATE_ISSUER_REVOKED: u32 = 0x801E_0000;
    pub const BAD_CERTIFICATE_CHAIN_INCOMPLETE: u32 = 0x810D_0000;
    pub const BAD_NO_VALID_CERTIFICATES: u32 = 0x8059_0000;
    pub const BAD_SECURITY_MODE_REJECTED: u32 = 0x8054_0000;
    pub const BAD_SECURITY_POLICY_REJECTED: u32 = 0x8055_0000;

    // Access control.
    pub const BAD_USER_ACCESS_DENIED: u32 = 0x801F_0000;
    pub const BAD_IDENTITY_TOKEN_INVALID: u32 = 0x8020_0000;
    pub const BAD_IDENTITY_TOKEN_REJECTED: u32 = 0x8021_0000;
    pub const BAD_REQUEST_NOT_ALLOWED: u32 = 0x80E4_0000;
    pub const BAD_TOO_MANY_SESSIONS: u32 = 0x8056_0000;
    pub const BAD_LICENSE_EXPIRED: u32 = 0x810E_0000;
    pub const BAD_LICENSE_LIMITS_EXCEEDED: u32 = 0x810F_0000;
    pub const BAD_LICENSE_NOT_AVAILABLE: u32 = 0x8110_0000;

    // Encoding.
    pub const BAD_ENCODING_ERROR: u32 = 0x8006_0000;
    pub const BAD_DECODING_ERROR: u32 = 0x8007_0000;
    pub const BAD_ENCODING_LIMITS_EXCEEDED: u32 = 0x8008_0000;
    pub const BAD_REQUEST_TOO_LARGE: u32 = 0x80B8_0000;
    pub const BAD_RESPONSE_TOO_LARGE: u32 = 0x80B9_0000;
    pub const BAD_DATA_ENCODING_INVALID: u32 = 0x8038_0000;
    pub const BAD_DATA_ENCODING_UNSUPPORTED: u32 = 0x8039_0000;

    // Application semantics.
    pub const BAD_NOT_READABLE: u32 = 0x803A_0000;
    pub const BAD_NOT_WRITABLE: u32 = 0x803B_0000;
    pub const BAD_OUT_OF_RANGE: u32 = 0x803C_0000;
    pub const BAD_NOT_SUPPORTED: u32 = 0x803D_0000;
    pub const BAD_NOT_IMPLEMENTED: u32 = 0x8040_0000;
    pub const BAD_WRITE_NOT_SUPPORTED: u32 = 0x8073_0000;
    pub const BAD_TYPE_MISMATCH: u32 = 0x8074_0000;
    pub const BAD_METHOD_INVALID: u32 = 0x8075_0000;
    pub const BAD_ARGUMENTS_MISSING: u32 = 0x8076_0000;
    pub const BAD_INVALID_ARGUMENT: u32 = 0x80AB_0000;
    pub const BAD_TOO_MANY_ARGUMENTS: u32 = 0x80E5_0000;

    /// Returns the symbolic name of a status code, if it is one this
    /// engine knows about.
    pub const fn symbolic_name(code: u32) -> Option<&'static str> {
        Some(match code {
            BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            BAD_TIMEOUT => "BadTimeout",
            BAD_SERVICE_UNSUPPORTED => "BadServiceUnsupported",
            BAD_NONCE_INVALID => "BadNonceInvalid",
            BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            BAD_SESSION_CLOSED => "BadSessionClosed",
            BAD_SECURE_CHANNEL_ID_INVALID => "BadSecureChannelIdInvalid",
            BAD_SEQUENCE_NUMBER_UNKNOWN => "BadSequenceNumberUnknown",
            BAD_TCP_SERVER_TOO_BUSY => "BadTcpServerTooBusy",
            BAD_TCP_MESSAGE_TYPE_INVALID => "BadTcpMessageTypeInvalid",
            BAD_TCP_MESSAGE_TOO_LARGE => "BadTcpMessageTooLarge",
            BAD_TCP_NOT_ENOUGH_RESOURCES => "BadTcpNotEnoughResources",
            BAD_TCP_INTERNAL_ERROR => "BadTcpInternalError",
            BAD_TCP_ENDPOINT_URL_INVALID => "BadTcpEndpointUrlInvalid",
            BAD_REQUEST_TIMEOUT => "BadRequestTimeout",
            BAD_SECURE_CHANNEL_CLOSED => "BadSecureChannelClosed",
            BAD_SECURE_CHANNEL_TOKEN_UNKNOWN => "BadSecureChannelTokenUnknown",
            BAD_SEQUENCE_NUMBER_INVALID => "BadSequenceNumberInvalid",
            BAD_NOT_CONNECTED => "BadNotConnected",
            BAD_CONNECTION_REJECTED => "BadConnectionRejected",
            BAD_DISCONNECT => "BadDisconnect",
            BAD_CONNECTION_CLOSED => "BadConnectionClosed",
            BAD_PROTOCOL_VERSION_UNSUPPORTED => "BadProtocolVersionUnsupported",
            BAD_CERTIFICATE_INVALID => "BadCertificateInvalid",
            BAD_CERTIFICATE_TIME_INVALID => "BadCertificateTimeInvalid",
            BAD_CERTIFICATE_ISSUER_TIME_INVALID => "BadCertificateIssuerTimeInvalid",
            BAD_CERTIFICATE_HOST_NAME_INVALID => "BadCertificateHostNameInvalid",
            BAD_CERTIFICATE_URI_INVALID => "BadCertificateUriInvalid",
            BAD_CERTIFICATE_USE_NOT_ALLOWED => "BadCertificateUseNotAllowed",
            BAD_CERTIFICATE_ISSUER_USE_NOT_ALLOWED => "BadCertificateIssuerUseNotAllowed",
            BAD_CERTIFICATE_UNTRUSTED => "BadCertificateUntrusted",
            BAD_CERTIFICATE_REVOCATION_UNKNOWN => "BadCertificateRevocationUnknown",
            BAD_CERTIFICATE_ISSUER_REVOCATION_UNKNOWN => "BadCertificateIssuerRevocationUnknown",
            BAD_CERTIFICATE_REVOKED => "BadCertificateRevoked",
            BAD_CERTIFICATE_ISSUER_REVOKED => "BadCertificateIssuerRevoked",
            BAD_CERTIFICATE_CHAIN_INCOMPLETE => "BadCertificateChainIncomplete",
            BAD_NO_VALID_CERTIFICATES => "BadNoValidCertificates",
            BAD_SECURITY_MODE_REJECTED => "BadSecurityModeRejected",
            BAD_SECURITY_POLICY_REJECTED => "BadSecurityPolicyRejected",
            BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            BAD_IDENTITY_TOKEN_INVALID => "BadIdentityTokenInvalid",
            BAD_IDENTITY_TOKEN_REJECTED => "BadIdentityTokenRejected",
            BAD_REQUEST_NOT_ALLOWED => "BadRequestNotAllowed",
            BAD_TOO_MANY_SESSIONS => "BadTooManySessions",
            BAD_LICENSE_EXPIRED => "BadLicenseExpired",
            BAD_LICENSE_LIMITS_EXCEEDED => "BadLicenseLimitsExceeded",
            BAD_LICENSE_NOT_AVAILABLE => "BadLicenseNotAvailable",
            BAD_ENCODING_ERROR => "BadEncodingError",
            BAD_DECODING_ERROR => "BadDecodingError",
            BAD_ENCODING_LIMITS_EXCEEDED => "BadEncodingLimitsExceeded",
            BAD_REQUEST_TOO_LARGE => "BadRequestTooLarge",
            BAD_RESPONSE_TOO_LARGE => "BadResponseTooLarge",
            BAD_DATA_ENCODING_INVALID => "BadDataEncodingInvalid",
            BAD_DATA_ENCODING_UNSUPPORTED => "BadDataEncodingUnsupported",
            BAD_NOT_READABLE => "BadNotReadable",
            BAD_NOT_WRITABLE => "BadNotWritable",
            BAD_OUT_OF_RANGE => "BadOutOfRange",
            BAD_NOT_SUPPORTED => "BadNotSupported",
            BAD_NOT_IMPLEMENTED => "BadNotImplemented",
            BAD_WRITE_NOT_SUPPORTED => "BadWriteNotSupported",
            BAD_TYPE_MISMATCH => "BadTypeMismatch",
            BAD_METHOD_INVALID => "BadMethodInvalid",
            BAD_ARGUMENTS_MISSING => "BadArgumentsMissing",
            BAD_INVALID_ARGUMENT => "BadInvalidArgument",
            BAD_TOO_MANY_ARGUMENTS => "BadTooManyArguments",
            _ => return None,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
