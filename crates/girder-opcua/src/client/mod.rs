// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The OPC UA client engine.
//!
//! [`UaClient`] ties the pieces together: it keeps a pool of activated
//! sessions keyed by endpoint identity, creates new ones through the
//! protocol stack when the pool comes up empty, and runs caller-supplied
//! service operations with a single retry on transient failures. Server
//! discovery and endpoint validation are exposed alongside.
//!
//! # Examples
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use girder_opcua::client::{TransportRoute, UaClient};
//! # use girder_opcua::stack::UaStack;
//! # use girder_opcua::types::{ClientConfig, EndpointTarget};
//! # async fn demo<S: UaStack>(stack: Arc<S>) -> girder_opcua::error::UaResult<()> {
//! let client = UaClient::new(stack, ClientConfig::default(), TransportRoute::Direct);
//! let target = EndpointTarget::builder("opc.tcp://plant:4840")
//!     .trusted(true)
//!     .build()?;
//!
//! let value = client
//!     .execute_service(&target, |session| async move {
//!         // issue a read/write/call against `session` here
//!         # let _ = session;
//!         Ok(42u32)
//!     }, |_error| true)
//!     .await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

mod pool;
mod session;

pub use pool::{PoolEvent, PoolStatsSnapshot, SessionPool};
pub use session::{PooledSession, SessionConfig, SessionKey};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{self, DiscoveryError};
use crate::error::{self, UaError, UaResult};
use crate::select::select_endpoint;
use crate::stack::{KeepAlive, ServiceFault, UaDiscovery, UaSession, UaStack, UserIdentity};
use crate::types::{
    ClientCertificate, ClientConfig, DiscoveryResult, EndpointDescription, EndpointTarget,
    SecurityMode, DEFAULT_DISCOVERY_PORT,
};

/// Timeout for the endpoint discovery the session factory performs
/// against the target's own URL.
const FACTORY_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// TransportRoute
// =============================================================================

/// How requests reach the server, fixed at client construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportRoute {
    /// Server reachable directly on the plant network.
    #[default]
    Direct,

    /// Server reached through a relay hop, which needs looser timing.
    Relay,
}

impl TransportRoute {
    /// Connect timeout for this route.
    pub const fn connect_timeout(&self) -> Duration {
        match self {
            Self::Direct => Duration::from_secs(10),
            Self::Relay => Duration::from_secs(30),
        }
    }
}

// =============================================================================
// UaClient
// =============================================================================

/// Pooled OPC UA client over a pluggable protocol stack.
pub struct UaClient<S: UaStack> {
    stack: Arc<S>,
    config: ClientConfig,
    route: TransportRoute,
    client_certificate: RwLock<Option<ClientCertificate>>,
    pool: SessionPool<S::Session>,
}

impl<S: UaStack> UaClient<S> {
    /// Creates a client without a client certificate.
    ///
    /// Must be called within a tokio runtime; the pool starts a
    /// background eviction worker.
    pub fn new(stack: Arc<S>, config: ClientConfig, route: TransportRoute) -> Self {
        Self {
            stack,
            config,
            route,
            client_certificate: RwLock::new(None),
            pool: SessionPool::new(),
        }
    }

    /// Creates a client with an initial client certificate.
    pub fn with_certificate(
        stack: Arc<S>,
        config: ClientConfig,
        route: TransportRoute,
        certificate: ClientCertificate,
    ) -> Self {
        let client = Self::new(stack, config, route);
        *client.client_certificate.write() = Some(certificate);
        client
    }

    /// Replaces the process client certificate.
    ///
    /// Takes effect immediately for new sessions. Sessions pooled under
    /// the previous certificate fail reuse validation on their next
    /// acquire and are disposed lazily.
    pub fn update_client_certificate(&self, certificate: Option<ClientCertificate>) {
        info!(
            present = certificate.is_some(),
            "client certificate updated"
        );
        *self.client_certificate.write() = certificate;
    }

    /// Returns a copy of the current client certificate.
    pub fn client_certificate(&self) -> Option<ClientCertificate> {
        self.client_certificate.read().clone()
    }

    /// Number of idle pooled sessions for the given target.
    pub fn idle_session_count(&self, target: &EndpointTarget) -> usize {
        self.pool.idle_count(&SessionKey::from(target))
    }

    /// Returns the pool counters.
    pub fn pool_stats(&self) -> PoolStatsSnapshot {
        self.pool.stats()
    }

    /// Returns a receiver observing the completed-disposal counter.
    /// Useful for synchronizing on fire-and-forget session teardown.
    pub fn disposals(&self) -> watch::Receiver<u64> {
        self.pool.disposals()
    }

    /// Disposes every idle pooled session.
    pub fn clear_pool(&self) {
        self.pool.clear();
    }

    // =========================================================================
    // Service execution
    // =========================================================================

    /// Runs `operation` against a session for `target`, retrying once on
    /// a transient failure.
    ///
    /// The session comes from the pool when a valid idle one exists and
    /// is created fresh otherwise. When the operation fails with a
    /// transient kind and `retry_predicate` accepts the error, the failed
    /// session is discarded, a fresh session is created (bypassing the
    /// pool), and the operation runs exactly once more. Session creation
    /// failures and non-transient errors propagate immediately. On
    /// completion the session returns to the pool if its channel is
    /// still up.
    pub async fn execute_service<T, F, Fut, P>(
        &self,
        target: &EndpointTarget,
        mut operation: F,
        mut retry_predicate: P,
    ) -> UaResult<T>
    where
        F: FnMut(Arc<S::Session>) -> Fut + Send,
        Fut: Future<Output = Result<T, ServiceFault>> + Send,
        P: FnMut(&UaError) -> bool + Send,
    {
        if target.url.trim().is_empty() {
            return Err(UaError::invalid_argument("endpoint url must not be empty"));
        }

        let key = SessionKey::from(target);
        let current_certificate = self.client_certificate();
        let mut session = match self.pool.acquire(&key, current_certificate.as_ref()) {
            Some(session) => {
                debug!(endpoint = %target.url, session = %session.name, "reusing pooled session");
                session
            }
            None => self.create_session(target).await?,
        };

        let mut retried = false;
        loop {
            match operation(Arc::clone(&session.handle)).await {
                Ok(value) => {
                    if session.handle.is_connected() {
                        self.pool.release(session);
                    } else {
                        self.pool.dispose(session);
                    }
                    return Ok(value);
                }
                Err(fault) => {
                    let err = UaError::from(fault);
                    if !retried && err.is_transient() && retry_predicate(&err) {
                        warn!(
                            endpoint = %target.url,
                            session = %session.name,
                            error = %err,
                            "transient service failure, retrying on a fresh session"
                        );
                        self.pool.dispose(session);
                        session = self.create_session(target).await?;
                        retried = true;
                        continue;
                    }

                    if session.handle.is_connected() {
                        self.pool.release(session);
                    } else {
                        self.pool.dispose(session);
                    }
                    return Err(err);
                }
            }
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Crawls the discovery graph rooted at `seed_url` and returns the
    /// deduplicated endpoints of every reachable server. `timeout` bounds
    /// each individual discovery connection.
    pub async fn discover(
        &self,
        seed_url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveryResult>, DiscoveryError> {
        let seed = discovery::normalize_discovery_uri(seed_url, DEFAULT_DISCOVERY_PORT)
            .ok_or_else(|| {
                DiscoveryError::Invalid(UaError::invalid_argument(format!(
                    "invalid discovery url: {seed_url}"
                )))
            })?;
        discovery::crawl(self.stack.as_ref(), seed, timeout, cancel).await
    }

    /// Checks that `target` resolves to an endpoint a session could be
    /// opened on, without opening a session.
    ///
    /// Runs the same discovery and selection the session factory uses and
    /// hands the open discovery channel plus the selected endpoint to
    /// `inspect`, whose return value is passed through. Selection assumes
    /// a client certificate is available, so the strongest matching
    /// endpoint is reported.
    pub async fn validate_endpoint<R, F>(&self, target: &EndpointTarget, inspect: F) -> UaResult<R>
    where
        F: FnOnce(&S::Discovery, &EndpointDescription) -> R + Send,
    {
        let (channel, endpoints) = self.discover_target_endpoints(target).await?;
        let endpoint = select_endpoint(&endpoints, target, true)
            .ok_or_else(|| UaError::connection("unable to select secure endpoint"))?;
        Ok(inspect(&channel, endpoint))
    }

    // =========================================================================
    // Session factory
    // =========================================================================

    /// Creates, activates, and registers a new session for `target`.
    async fn create_session(&self, target: &EndpointTarget) -> UaResult<PooledSession<S::Session>> {
        let certificate = self.client_certificate();
        let no_validation =
            target.trusted() || target.security_mode == SecurityMode::None;

        if certificate.is_none() {
            if no_validation && target.security_mode == SecurityMode::None {
                warn!(endpoint = %target.url, "opening unsecured connection without a client certificate");
            } else {
                return Err(UaError::certificate_invalid("missing client certificate"));
            }
        }

        let config = SessionConfig {
            application: self.config.clone(),
            auto_accept_untrusted: certificate.is_some() && no_validation,
            client_certificate: certificate,
        };
        config.validate()?;

        let have_certificate = config.client_certificate.is_some();
        let (_channel, endpoints) = self.discover_target_endpoints(target).await?;
        let endpoint = select_endpoint(&endpoints, target, have_certificate)
            .ok_or_else(|| UaError::connection("unable to select secure endpoint"))?;

        debug!(
            endpoint = %endpoint.endpoint_url,
            security_policy = %endpoint.security_policy_uri,
            security_level = endpoint.security_level,
            "selected endpoint"
        );

        let identity = UserIdentity::from(&target.user_token);
        let open_timeout = self.route.connect_timeout() * 2;
        let handle = self
            .stack
            .open_session(&config, endpoint, &identity, open_timeout)
            .await
            .map_err(UaError::from)?
            .ok_or_else(|| UaError::generic("protocol stack returned no session object"))?;

        let pooled = PooledSession::new(config, target.clone(), handle);

        let evictor = self.pool.evictor();
        let key = pooled.key();
        let name = pooled.name.clone();
        let endpoint_url = target.url.clone();
        pooled.handle.set_keep_alive(Box::new(move |status| {
            if error::status::is_bad(status) {
                warn!(
                    endpoint = %endpoint_url,
                    session = %name,
                    status,
                    symbolic_id = error::status::symbolic_name(status).unwrap_or("unknown"),
                    "keep-alive failed, evicting session"
                );
                let _ = evictor.send(PoolEvent {
                    key: key.clone(),
                    name: name.clone(),
                });
                KeepAlive::Cancel
            } else {
                KeepAlive::Continue
            }
        }));

        self.pool.record_created();
        info!(endpoint = %target.url, session = %pooled.name, "session created");
        Ok(pooled)
    }

    /// Discovers the endpoints of the target's own URL, rewriting
    /// loopback endpoint URLs to the host that was dialed. Returns the
    /// discovery channel alongside for callers that need it.
    async fn discover_target_endpoints(
        &self,
        target: &EndpointTarget,
    ) -> UaResult<(S::Discovery, Vec<EndpointDescription>)> {
        let dialed_host = discovery::normalize_discovery_uri(&target.url, DEFAULT_DISCOVERY_PORT)
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| {
                UaError::invalid_argument(format!("invalid endpoint url: {}", target.url))
            })?;

        let channel = self
            .stack
            .connect_discovery(&target.url, FACTORY_DISCOVERY_TIMEOUT)
            .await
            .map_err(UaError::from)?;
        let mut endpoints = channel.get_endpoints().await.map_err(UaError::from)?;

        for endpoint in &mut endpoints {
            if let Some(mut url) =
                discovery::normalize_discovery_uri(&endpoint.endpoint_url, DEFAULT_DISCOVERY_PORT)
            {
                discovery::replace_localhost(&mut url, &dialed_host);
                endpoint.endpoint_url = url.to_string();
            }
        }
        Ok((channel, endpoints))
    }
}
