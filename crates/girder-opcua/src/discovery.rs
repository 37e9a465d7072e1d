// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Breadth-first server discovery.
//!
//! Starting from a seed URL, the crawl asks each reachable server for its
//! endpoints and for other servers it knows about, following referrals
//! until the frontier is exhausted. Servers in industrial networks
//! routinely refer to each other (and to themselves) under several names,
//! so every URL is normalized before it enters the visited set: default
//! port applied, trailing host dots and path slashes trimmed. A node that
//! cannot be reached is logged and skipped; the crawl only fails as a
//! whole on cancellation or an invalid seed.
//!
//! Capability tags reported by `FindServersOnNetwork` travel with the
//! referral: endpoints found through a tagged referral carry those tags
//! in their [`DiscoveryResult`].

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::UaError;
use crate::stack::{UaDiscovery, UaStack};
use crate::types::{ApplicationType, DiscoveryResult, DEFAULT_DISCOVERY_PORT};

// =============================================================================
// DiscoveryError
// =============================================================================

/// Failure of a discovery crawl as a whole.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The crawl was cancelled before completing.
    #[error("discovery cancelled")]
    Cancelled,

    /// The seed URL could not be used.
    #[error(transparent)]
    Invalid(#[from] UaError),
}

// =============================================================================
// URI normalization
// =============================================================================

/// Normalizes a discovery URL for visited-set identity.
///
/// Applies `default_port` when the URL has none, strips trailing dots
/// from the host and trailing slashes from the path. Returns `None` for
/// URLs that do not parse or have no host.
pub fn normalize_discovery_uri(raw: &str, default_port: u16) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    url.set_host(Some(&host)).ok()?;
    if url.port().is_none() {
        url.set_port(Some(default_port)).ok()?;
    }
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    Some(url)
}

/// Rewrites loopback hosts to the host that was actually dialed.
///
/// Servers frequently advertise referral URLs as `localhost`, which is
/// only reachable from the server's own machine.
pub fn replace_localhost(url: &mut Url, dialed_host: &str) {
    let is_loopback = matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    );
    if is_loopback {
        // Failure leaves the URL as-is; the crawl will just skip it.
        let _ = url.set_host(Some(dialed_host));
    }
}

// =============================================================================
// Crawl
// =============================================================================

/// Crawls the discovery graph rooted at `seed`.
///
/// Returns the deduplicated endpoints of every reachable, non-discovery
/// server. `timeout` bounds each individual discovery connection.
///
/// # Errors
///
/// [`DiscoveryError::Cancelled`] when `cancel` fires mid-crawl.
pub async fn crawl<S: UaStack>(
    stack: &S,
    seed: Url,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveryResult>, DiscoveryError> {
    let mut visited: HashSet<Url> = HashSet::new();
    let mut queue: VecDeque<(Url, Vec<String>)> = VecDeque::new();
    let mut results: HashSet<DiscoveryResult> = HashSet::new();

    visited.insert(seed.clone());
    queue.push_back((seed, Vec::new()));

    while let Some((url, capabilities)) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }

        let default_port = url.port().unwrap_or(DEFAULT_DISCOVERY_PORT);
        let dialed_host = url.host_str().unwrap_or_default().to_string();

        let discovery = match stack.connect_discovery(url.as_str(), timeout).await {
            Ok(discovery) => discovery,
            Err(fault) => {
                debug!(endpoint = %url, %fault, "discovery node unreachable, skipping");
                continue;
            }
        };

        match discovery.get_endpoints().await {
            Ok(endpoints) => {
                for mut description in endpoints {
                    if description.server.application_type == ApplicationType::DiscoveryServer {
                        continue;
                    }
                    // Endpoints advertised as loopback are useless from the
                    // caller's vantage point; pin them to the dialed host.
                    if let Some(mut endpoint_url) =
                        normalize_discovery_uri(&description.endpoint_url, default_port)
                    {
                        replace_localhost(&mut endpoint_url, &dialed_host);
                        description.endpoint_url = endpoint_url.to_string();
                    }
                    results.insert(DiscoveryResult {
                        description,
                        capabilities: capabilities.clone(),
                    });
                }
            }
            Err(fault) => {
                debug!(endpoint = %url, %fault, "get_endpoints failed, skipping node");
                continue;
            }
        }

        // Legacy discovery servers do not implement this; a failure here
        // is not a reason to abandon the node's other referrals.
        match discovery.find_servers_on_network().await {
            Ok(servers) => {
                for server in servers {
                    enqueue(
                        &server.discovery_url,
                        server.server_capabilities,
                        default_port,
                        &dialed_host,
                        &mut visited,
                        &mut queue,
                    );
                }
            }
            Err(fault) => {
                debug!(endpoint = %url, %fault, "find_servers_on_network unsupported");
            }
        }

        match discovery.find_servers().await {
            Ok(servers) => {
                for server in servers {
                    for discovery_url in server.discovery_urls {
                        enqueue(
                            &discovery_url,
                            Vec::new(),
                            default_port,
                            &dialed_host,
                            &mut visited,
                            &mut queue,
                        );
                    }
                }
            }
            Err(fault) => {
                debug!(endpoint = %url, %fault, "find_servers failed");
            }
        }
    }

    let mut results: Vec<DiscoveryResult> = results.into_iter().collect();
    results.sort_by(|a, b| {
        (&a.description.endpoint_url, &a.description.security_policy_uri)
            .cmp(&(&b.description.endpoint_url, &b.description.security_policy_uri))
    });
    Ok(results)
}

fn enqueue(
    raw: &str,
    capabilities: Vec<String>,
    default_port: u16,
    dialed_host: &str,
    visited: &mut HashSet<Url>,
    queue: &mut VecDeque<(Url, Vec<String>)>,
) {
    let Some(mut url) = normalize_discovery_uri(raw, default_port) else {
        debug!(referral = raw, "ignoring unparseable referral url");
        return;
    };
    replace_localhost(&mut url, dialed_host);
    if visited.insert(url.clone()) {
        queue.push_back((url, capabilities));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_applies_default_port() {
        let url = normalize_discovery_uri("opc.tcp://plant", 4840).unwrap();
        assert_eq!(url.port(), Some(4840));
    }

    #[test]
    fn test_normalize_keeps_explicit_port() {
        let url = normalize_discovery_uri("opc.tcp://plant:4850", 4840).unwrap();
        assert_eq!(url.port(), Some(4850));
    }

    #[test]
    fn test_normalize_trims_host_dots_and_path_slashes() {
        let a = normalize_discovery_uri("opc.tcp://plant.example.com.:4840/", 4840).unwrap();
        let b = normalize_discovery_uri("opc.tcp://plant.example.com:4840", 4840).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_lowercases_host() {
        let a = normalize_discovery_uri("opc.tcp://PLANT:4840", 4840).unwrap();
        let b = normalize_discovery_uri("opc.tcp://plant:4840", 4840).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_discovery_uri("not a url", 4840).is_none());
    }

    #[test]
    fn test_replace_localhost() {
        let mut url = normalize_discovery_uri("opc.tcp://localhost:4840", 4840).unwrap();
        replace_localhost(&mut url, "plant");
        assert_eq!(url.host_str(), Some("plant"));

        let mut url = normalize_discovery_uri("opc.tcp://plant:4840", 4840).unwrap();
        replace_localhost(&mut url, "other");
        assert_eq!(url.host_str(), Some("plant"));
    }
}
