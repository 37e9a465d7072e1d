// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine integration tests.
//!
//! Everything runs against an in-memory mock protocol stack: the mock
//! serves scripted endpoint and referral data, records every session it
//! opens, and lets tests inject faults at the open and service layers.
//! No real OPC UA server is involved.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use girder_opcua::client::{SessionConfig, TransportRoute, UaClient};
use girder_opcua::discovery::DiscoveryError;
use girder_opcua::error::{status, ErrorKind, UaError};
use girder_opcua::stack::{
    KeepAlive, KeepAliveHandler, ServiceFault, UaDiscovery, UaSession, UaStack, UserIdentity,
};
use girder_opcua::types::{
    ApplicationType, ClientCertificate, ClientConfig, EndpointDescription, EndpointTarget,
    MessageSecurityMode, NetworkServer, SecurityMode, ServerDescription, TRANSPORT_PROFILE_TCP,
};

// =============================================================================
// Test Fixtures
// =============================================================================

static INIT: Once = Once::new();

/// Initialize test logging. Call this at the start of each test.
fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn,girder_opcua=debug")),
            )
            .with_test_writer()
            .init();
    });
}

const PLANT_URL: &str = "opc.tcp://plant:4840";
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
const POLICY_NONE: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";
const POLICY_B256: &str = "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";

fn server_description(uri: &str) -> ServerDescription {
    ServerDescription {
        application_uri: uri.to_string(),
        application_name: uri.to_string(),
        application_type: ApplicationType::Server,
        discovery_urls: vec![],
    }
}

fn endpoint(url: &str, mode: MessageSecurityMode, policy: &str, level: u8) -> EndpointDescription {
    EndpointDescription {
        endpoint_url: url.to_string(),
        security_mode: mode,
        security_policy_uri: policy.to_string(),
        transport_profile_uri: TRANSPORT_PROFILE_TCP.to_string(),
        security_level: level,
        server: server_description("urn:plant"),
        server_certificate: Some(vec![0xCA]),
    }
}

/// The usual three-endpoint server: None/Sign/SignAndEncrypt.
fn plant_endpoints() -> Vec<EndpointDescription> {
    vec![
        endpoint(PLANT_URL, MessageSecurityMode::None, POLICY_NONE, 1),
        endpoint(PLANT_URL, MessageSecurityMode::Sign, POLICY_B256, 5),
        endpoint(PLANT_URL, MessageSecurityMode::SignAndEncrypt, POLICY_B256, 9),
    ]
}

fn client_certificate() -> ClientCertificate {
    ClientCertificate::with_application_uri(vec![1, 2, 3, 4], "urn:girder:opcua:client")
}

// =============================================================================
// Mock Protocol Stack
// =============================================================================

#[derive(Clone, Default)]
struct MockServer {
    endpoints: Vec<EndpointDescription>,
    /// Applications returned from `find_servers`.
    referrals: Vec<ServerDescription>,
    /// Entries returned from `find_servers_on_network`.
    network: Vec<NetworkServer>,
    /// Simulate a legacy server without `find_servers_on_network`.
    network_unsupported: bool,
}

struct MockSession {
    id: u64,
    connected: AtomicBool,
    keep_alive: Mutex<Option<KeepAliveHandler>>,
}

impl MockSession {
    fn fire_keep_alive(&self, status: u32) -> Option<KeepAlive> {
        let guard = self.keep_alive.lock().unwrap();
        guard.as_ref().map(|handler| handler(status))
    }
}

#[async_trait]
impl UaSession for MockSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_keep_alive(&self, handler: KeepAliveHandler) {
        *self.keep_alive.lock().unwrap() = Some(handler);
    }

    async fn close(&self) -> Result<(), ServiceFault> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MockDiscovery {
    server: MockServer,
}

#[async_trait]
impl UaDiscovery for MockDiscovery {
    async fn get_endpoints(&self) -> Result<Vec<EndpointDescription>, ServiceFault> {
        Ok(self.server.endpoints.clone())
    }

    async fn find_servers_on_network(&self) -> Result<Vec<NetworkServer>, ServiceFault> {
        if self.server.network_unsupported {
            return Err(ServiceFault::new(status::BAD_SERVICE_UNSUPPORTED));
        }
        Ok(self.server.network.clone())
    }

    async fn find_servers(&self) -> Result<Vec<ServerDescription>, ServiceFault> {
        Ok(self.server.referrals.clone())
    }
}

enum OpenScript {
    Fault(u32),
    Missing,
}

#[derive(Default)]
struct MockStack {
    servers: RwLock<HashMap<String, MockServer>>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    open_scripts: Mutex<VecDeque<OpenScript>>,
    open_configs: Mutex<Vec<SessionConfig>>,
    discovery_connects: Mutex<HashMap<String, u32>>,
    next_session_id: AtomicU64,
}

impl MockStack {
    fn with_server(url: &str, server: MockServer) -> Arc<Self> {
        let stack = Arc::new(Self::default());
        stack.add_server(url, server);
        stack
    }

    fn add_server(&self, url: &str, server: MockServer) {
        self.servers.write().unwrap().insert(url.to_string(), server);
    }

    fn script_open(&self, script: OpenScript) {
        self.open_scripts.lock().unwrap().push_back(script);
    }

    fn opened(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn session(&self, index: usize) -> Arc<MockSession> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    fn last_open_config(&self) -> SessionConfig {
        self.open_configs.lock().unwrap().last().cloned().unwrap()
    }

    fn connects_to(&self, url: &str) -> u32 {
        self.discovery_connects
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl UaStack for MockStack {
    type Discovery = MockDiscovery;
    type Session = MockSession;

    async fn connect_discovery(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<MockDiscovery, ServiceFault> {
        *self
            .discovery_connects
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let server = self.servers.read().unwrap().get(url).cloned();
        match server {
            Some(server) => Ok(MockDiscovery { server }),
            None => Err(ServiceFault::new(status::BAD_NOT_CONNECTED)),
        }
    }

    async fn open_session(
        &self,
        config: &SessionConfig,
        _endpoint: &EndpointDescription,
        _identity: &UserIdentity,
        _timeout: Duration,
    ) -> Result<Option<Arc<MockSession>>, ServiceFault> {
        self.open_configs.lock().unwrap().push(config.clone());

        if let Some(script) = self.open_scripts.lock().unwrap().pop_front() {
            match script {
                OpenScript::Fault(code) => return Err(ServiceFault::new(code)),
                OpenScript::Missing => return Ok(None),
            }
        }

        let session = Arc::new(MockSession {
            id: self.next_session_id.fetch_add(1, Ordering::SeqCst),
            connected: AtomicBool::new(true),
            keep_alive: Mutex::new(None),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(Some(session))
    }
}

fn plant_stack() -> Arc<MockStack> {
    MockStack::with_server(
        PLANT_URL,
        MockServer {
            endpoints: plant_endpoints(),
            ..Default::default()
        },
    )
}

fn secured_client(stack: Arc<MockStack>) -> UaClient<MockStack> {
    UaClient::with_certificate(
        stack,
        ClientConfig::default(),
        TransportRoute::Direct,
        client_certificate(),
    )
}

fn trusted_target() -> EndpointTarget {
    EndpointTarget::builder(PLANT_URL)
        .security_mode(SecurityMode::Best)
        .trusted(true)
        .build()
        .unwrap()
}

// =============================================================================
// Service Execution
// =============================================================================

#[tokio::test]
async fn test_session_created_then_pooled_and_reused() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();

    let value = client
        .execute_service(&target, |_session| async { Ok::<_, ServiceFault>(42u32) }, |_| true)
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert_eq!(stack.opened(), 1);
    assert_eq!(client.idle_session_count(&target), 1);

    client
        .execute_service(&target, |_session| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();
    assert_eq!(stack.opened(), 1, "second call must reuse the pooled session");

    let stats = client.pool_stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.reused, 1);
}

#[tokio::test]
async fn test_equivalent_targets_share_sessions() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));

    let plain = trusted_target();
    let with_alternatives = EndpointTarget::builder(PLANT_URL)
        .trusted(true)
        .alternative_url("opc.tcp://plant.local:4840")
        .build()
        .unwrap();

    client
        .execute_service(&plain, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();
    client
        .execute_service(&with_alternatives, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();

    assert_eq!(stack.opened(), 1, "alternative urls must not split the pool key");
}

#[tokio::test]
async fn test_no_double_handout_under_concurrency() {
    init_test_logging();
    let stack = plant_stack();
    let client = Arc::new(secured_client(Arc::clone(&stack)));
    let in_use: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = Arc::clone(&client);
        let in_use = Arc::clone(&in_use);
        tasks.push(tokio::spawn(async move {
            let target = trusted_target();
            for _ in 0..20 {
                client
                    .execute_service(
                        &target,
                        |session| {
                            let in_use = Arc::clone(&in_use);
                            async move {
                                let fresh = in_use.lock().unwrap().insert(session.id);
                                assert!(fresh, "session {} handed out twice", session.id);
                                tokio::time::sleep(Duration::from_millis(1)).await;
                                in_use.lock().unwrap().remove(&session.id);
                                Ok::<_, ServiceFault>(())
                            }
                        },
                        |_| true,
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_transient_failure_retries_once_on_fresh_session() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();
    let attempts = Arc::new(AtomicU32::new(0));

    let value = {
        let attempts = Arc::clone(&attempts);
        client
            .execute_service(
                &target,
                move |_session| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(ServiceFault::new(status::BAD_TCP_SERVER_TOO_BUSY))
                        } else {
                            Ok(7u32)
                        }
                    }
                },
                |_| true,
            )
            .await
            .unwrap()
    };

    assert_eq!(value, 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(stack.opened(), 2, "retry must run on a freshly created session");
}

#[tokio::test]
async fn test_second_transient_failure_propagates() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();
    let attempts = Arc::new(AtomicU32::new(0));

    let err = {
        let attempts = Arc::clone(&attempts);
        client
            .execute_service(
                &target,
                move |_session| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err::<u32, _>(ServiceFault::new(status::BAD_TCP_SERVER_TOO_BUSY))
                        } else {
                            Err(ServiceFault::new(status::BAD_TIMEOUT))
                        }
                    }
                },
                |_| true,
            )
            .await
            .unwrap_err()
    };

    assert_eq!(attempts.load(Ordering::SeqCst), 2, "exactly one retry");
    assert_eq!(err.kind(), ErrorKind::Timeout, "the second failure is the one reported");
}

#[tokio::test]
async fn test_non_transient_failure_is_immediate() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();
    let attempts = Arc::new(AtomicU32::new(0));

    let err = {
        let attempts = Arc::clone(&attempts);
        client
            .execute_service(
                &target,
                move |_session| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, _>(ServiceFault::new(status::BAD_CERTIFICATE_UNTRUSTED))
                    }
                },
                |_| true,
            )
            .await
            .unwrap_err()
    };

    assert_eq!(err.kind(), ErrorKind::CertificateUntrusted);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(stack.opened(), 1);
    assert_eq!(
        client.idle_session_count(&target),
        1,
        "a healthy session goes back to the pool even when the call failed"
    );
}

#[tokio::test]
async fn test_retry_predicate_can_refuse() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();
    let attempts = Arc::new(AtomicU32::new(0));

    let err = {
        let attempts = Arc::clone(&attempts);
        client
            .execute_service(
                &target,
                move |_session| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, _>(ServiceFault::new(status::BAD_TIMEOUT))
                    }
                },
                |error: &UaError| error.kind() != ErrorKind::Timeout,
            )
            .await
            .unwrap_err()
    };

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "refused by predicate, no retry");
}

#[tokio::test]
async fn test_empty_url_is_rejected_without_io() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = EndpointTarget::new("");

    let err = client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(stack.opened(), 0);
    assert_eq!(stack.connects_to(PLANT_URL), 0);
}

#[tokio::test]
async fn test_session_creation_failure_propagates_without_retry() {
    init_test_logging();
    let stack = plant_stack();
    stack.script_open(OpenScript::Fault(status::BAD_TOO_MANY_SESSIONS));
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();

    let err = client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServerBusy);
    assert_eq!(stack.opened(), 0);
}

#[tokio::test]
async fn test_missing_session_object_is_generic() {
    init_test_logging();
    let stack = plant_stack();
    stack.script_open(OpenScript::Missing);
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();

    let err = client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Generic);
}

// =============================================================================
// Trust and Certificates
// =============================================================================

#[tokio::test]
async fn test_no_certificate_rejects_secured_target() {
    init_test_logging();
    let stack = plant_stack();
    let client = UaClient::new(
        Arc::clone(&stack),
        ClientConfig::default(),
        TransportRoute::Direct,
    );
    let target = EndpointTarget::builder(PLANT_URL)
        .security_mode(SecurityMode::SignAndEncrypt)
        .build()
        .unwrap();

    let err = client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CertificateInvalid);
    assert_eq!(stack.connects_to(PLANT_URL), 0, "rejected before any discovery");
}

#[tokio::test]
async fn test_no_certificate_allows_unsecured_target() {
    init_test_logging();
    let stack = plant_stack();
    let client = UaClient::new(
        Arc::clone(&stack),
        ClientConfig::default(),
        TransportRoute::Direct,
    );
    let target = EndpointTarget::builder(PLANT_URL)
        .security_mode(SecurityMode::None)
        .build()
        .unwrap();

    client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();

    let config = stack.last_open_config();
    assert!(config.client_certificate.is_none());
    assert!(!config.auto_accept_untrusted);
}

#[tokio::test]
async fn test_trusted_target_auto_accepts_untrusted_peers() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));

    client
        .execute_service(&trusted_target(), |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();
    assert!(stack.last_open_config().auto_accept_untrusted);

    let strict = EndpointTarget::builder(PLANT_URL)
        .security_mode(SecurityMode::Sign)
        .build()
        .unwrap();
    client
        .execute_service(&strict, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();
    assert!(!stack.last_open_config().auto_accept_untrusted);
}

#[tokio::test]
async fn test_certificate_rotation_invalidates_pooled_sessions() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();

    client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();
    assert_eq!(client.idle_session_count(&target), 1);

    let mut disposals = client.disposals();
    client.update_client_certificate(Some(ClientCertificate::new(vec![9, 9, 9])));

    client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();
    assert_eq!(stack.opened(), 2, "the stale session must not be reused");

    disposals.changed().await.unwrap();
    assert_eq!(client.pool_stats().disposed, 1);
}

#[tokio::test]
async fn test_no_matching_endpoint_is_a_connection_error() {
    init_test_logging();
    let stack = MockStack::with_server(
        PLANT_URL,
        MockServer {
            endpoints: vec![endpoint(PLANT_URL, MessageSecurityMode::Sign, POLICY_B256, 5)],
            ..Default::default()
        },
    );
    let client = secured_client(Arc::clone(&stack));
    let target = EndpointTarget::builder(PLANT_URL)
        .security_mode(SecurityMode::SignAndEncrypt)
        .trusted(true)
        .build()
        .unwrap();

    let err = client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.detail().contains("unable to select secure endpoint"));
}

// =============================================================================
// Keep-Alive Eviction
// =============================================================================

#[tokio::test]
async fn test_keep_alive_fault_evicts_pooled_session() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));
    let target = trusted_target();

    client
        .execute_service(&target, |_s| async { Ok::<_, ServiceFault>(()) }, |_| true)
        .await
        .unwrap();
    assert_eq!(client.idle_session_count(&target), 1);

    let session = stack.session(0);
    assert_eq!(session.fire_keep_alive(0), Some(KeepAlive::Continue));

    let mut disposals = client.disposals();
    assert_eq!(
        session.fire_keep_alive(status::BAD_CONNECTION_CLOSED),
        Some(KeepAlive::Cancel)
    );

    disposals.changed().await.unwrap();
    assert_eq!(client.idle_session_count(&target), 0);
    assert_eq!(client.pool_stats().evicted, 1);
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_discovery_cycle_terminates_and_deduplicates() {
    init_test_logging();
    let stack = Arc::new(MockStack::default());
    stack.add_server(
        "opc.tcp://a:4840",
        MockServer {
            endpoints: vec![endpoint("opc.tcp://a:4840", MessageSecurityMode::None, POLICY_NONE, 1)],
            referrals: vec![ServerDescription {
                discovery_urls: vec!["opc.tcp://b:4840".to_string()],
                ..server_description("urn:b")
            }],
            ..Default::default()
        },
    );
    stack.add_server(
        "opc.tcp://b:4840",
        MockServer {
            endpoints: vec![endpoint("opc.tcp://b:4840", MessageSecurityMode::None, POLICY_NONE, 1)],
            referrals: vec![ServerDescription {
                discovery_urls: vec!["opc.tcp://a:4840".to_string()],
                ..server_description("urn:a")
            }],
            ..Default::default()
        },
    );

    let client = secured_client(Arc::clone(&stack));
    let results = client
        .discover("opc.tcp://a:4840", DISCOVERY_TIMEOUT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(stack.connects_to("opc.tcp://a:4840"), 1, "each node visited once");
    assert_eq!(stack.connects_to("opc.tcp://b:4840"), 1);
}

#[tokio::test]
async fn test_discovery_skips_unreachable_and_discovery_servers() {
    init_test_logging();
    let mut lds_endpoint =
        endpoint("opc.tcp://a:4840", MessageSecurityMode::None, POLICY_NONE, 1);
    lds_endpoint.server.application_type = ApplicationType::DiscoveryServer;

    let stack = MockStack::with_server(
        "opc.tcp://a:4840",
        MockServer {
            endpoints: vec![
                endpoint("opc.tcp://a:4841", MessageSecurityMode::None, POLICY_NONE, 1),
                lds_endpoint,
            ],
            referrals: vec![ServerDescription {
                discovery_urls: vec!["opc.tcp://unreachable:4840".to_string()],
                ..server_description("urn:gone")
            }],
            network_unsupported: true,
            ..Default::default()
        },
    );

    let client = secured_client(Arc::clone(&stack));
    let results = client
        .discover("opc.tcp://a:4840", DISCOVERY_TIMEOUT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 1, "discovery-server endpoints are excluded");
    assert_eq!(results[0].description.endpoint_url, "opc.tcp://a:4841");
    assert_eq!(stack.connects_to("opc.tcp://unreachable:4840"), 1);
}

#[tokio::test]
async fn test_discovery_capabilities_travel_with_referrals() {
    init_test_logging();
    let stack = Arc::new(MockStack::default());
    stack.add_server(
        "opc.tcp://a:4840",
        MockServer {
            endpoints: vec![endpoint("opc.tcp://a:4840", MessageSecurityMode::None, POLICY_NONE, 1)],
            network: vec![NetworkServer {
                record_id: 1,
                server_name: "b".to_string(),
                discovery_url: "opc.tcp://b:4840".to_string(),
                server_capabilities: vec!["LDS".to_string(), "DA".to_string()],
            }],
            ..Default::default()
        },
    );
    stack.add_server(
        "opc.tcp://b:4840",
        MockServer {
            endpoints: vec![endpoint("opc.tcp://b:4840", MessageSecurityMode::None, POLICY_NONE, 1)],
            ..Default::default()
        },
    );

    let client = secured_client(Arc::clone(&stack));
    let results = client
        .discover("opc.tcp://a:4840", DISCOVERY_TIMEOUT, &CancellationToken::new())
        .await
        .unwrap();

    let b = results
        .iter()
        .find(|r| r.description.endpoint_url == "opc.tcp://b:4840")
        .unwrap();
    assert_eq!(b.capabilities, vec!["LDS".to_string(), "DA".to_string()]);

    let a = results
        .iter()
        .find(|r| r.description.endpoint_url == "opc.tcp://a:4840")
        .unwrap();
    assert!(a.capabilities.is_empty());
}

#[tokio::test]
async fn test_discovery_default_port_applied_to_seed() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));

    let results = client
        .discover("opc.tcp://plant", DISCOVERY_TIMEOUT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(stack.connects_to(PLANT_URL), 1);
}

#[tokio::test]
async fn test_discovery_cancellation() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.discover(PLANT_URL, DISCOVERY_TIMEOUT, &cancel).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Cancelled));
}

#[tokio::test]
async fn test_discovery_rejects_invalid_seed() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));

    let err = client
        .discover("not a url", DISCOVERY_TIMEOUT, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Invalid(_)));
}

// =============================================================================
// Endpoint Validation
// =============================================================================

#[tokio::test]
async fn test_validate_endpoint_returns_strongest_match() {
    init_test_logging();
    let stack = plant_stack();
    let client = secured_client(Arc::clone(&stack));

    let chosen = client
        .validate_endpoint(&trusted_target(), |_channel, endpoint| endpoint.clone())
        .await
        .unwrap();
    assert_eq!(chosen.security_mode, MessageSecurityMode::SignAndEncrypt);
    assert_eq!(chosen.security_level, 9);
    assert_eq!(stack.opened(), 0, "validation must not open a session");
}
