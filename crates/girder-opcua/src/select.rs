// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure endpoint selection.
//!
//! Given the endpoints a server advertises and the caller's target
//! preferences, picks the single endpoint the session factory should
//! open. Filtering is strict (transport, mode, policy); the remaining
//! tie-break direction depends on whether a client certificate is
//! available: with one, prefer the strongest endpoint, without one the
//! weakest, since unsecured endpoints are the only ones a certificate-less
//! client can actually activate.

use crate::types::{EndpointDescription, EndpointTarget, TRANSPORT_PROFILE_TCP};

/// Selects the endpoint to open for `target` from `candidates`.
///
/// Returns `None` when no candidate survives filtering. The scan is
/// deterministic: filtered candidates are ordered by
/// `(security_policy_uri, endpoint_url)` before the security-level
/// tie-break, so the result does not depend on server-advertised order.
pub fn select_endpoint<'a>(
    candidates: &'a [EndpointDescription],
    target: &EndpointTarget,
    have_certificate: bool,
) -> Option<&'a EndpointDescription> {
    let mut filtered: Vec<&EndpointDescription> = candidates
        .iter()
        .filter(|ep| ep.transport_profile_uri == TRANSPORT_PROFILE_TCP)
        .filter(|ep| target.security_mode.accepts(ep.security_mode))
        .filter(|ep| match &target.security_policy {
            Some(policy) => ep.security_policy_uri == *policy,
            None => true,
        })
        .collect();

    filtered.sort_by(|a, b| {
        (&a.security_policy_uri, &a.endpoint_url).cmp(&(&b.security_policy_uri, &b.endpoint_url))
    });

    let mut best: Option<&EndpointDescription> = None;
    for candidate in filtered {
        let better = match best {
            None => true,
            Some(current) => {
                if have_certificate {
                    candidate.security_level > current.security_level
                } else {
                    candidate.security_level < current.security_level
                }
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}
