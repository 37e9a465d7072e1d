// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client engine for the Girder gateway.
//!
//! This crate owns the client-side session machinery the gateway uses to
//! talk to OPC UA servers: a concurrent keyed session pool, breadth-first
//! server discovery, secure endpoint selection, and a service executor
//! that retries transient failures once on a fresh session. The wire
//! protocol itself lives behind the [`stack`] traits, so the engine runs
//! identically over a real protocol library or an in-memory test double.
//!
//! # Architecture
//!
//! ```text
//!   caller
//!     |
//!     v
//!   UaClient::execute_service          client
//!     |         \
//!     v          v
//!   SessionPool  session factory       client::pool / client::session
//!     |               |
//!     |          select_endpoint       select
//!     |               |
//!     v               v
//!   UaSession    UaStack / UaDiscovery stack (trait boundary)
//! ```
//!
//! Failures cross the trait boundary as raw status codes and are
//! classified exactly once, at the seam, into the closed [`error::ErrorKind`]
//! taxonomy. Everything above the seam reasons about kinds, never codes.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod discovery;
pub mod error;
pub mod select;
pub mod stack;
pub mod types;

pub use client::{PoolStatsSnapshot, SessionKey, TransportRoute, UaClient};
pub use error::{classify, ErrorKind, UaError, UaResult};
pub use types::{
    ClientCertificate, ClientConfig, DiscoveryResult, EndpointDescription, EndpointTarget,
    SecurityMode, UserToken,
};
