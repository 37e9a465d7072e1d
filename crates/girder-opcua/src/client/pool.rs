// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Keyed session pool.
//!
//! Idle sessions are stored per [`SessionKey`]; acquiring one transfers
//! it out of the pool entirely, so a session is only ever held by one
//! caller at a time. Sessions have no idle timeout: they leave the pool
//! when reuse validation fails, when a keep-alive fault evicts them, or
//! when the pool is cleared.
//!
//! Disposal is fire-and-forget: the close runs on a detached task so no
//! caller ever waits on a dying session. The [`PoolStats::disposals`]
//! watch channel ticks once per completed close, which is what tests
//! synchronize on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::client::session::{PooledSession, SessionKey};
use crate::stack::UaSession;
use crate::types::ClientCertificate;

// =============================================================================
// PoolEvent
// =============================================================================

/// Eviction request raised outside the acquire/release path, typically
/// from a keep-alive handler.
#[derive(Debug, Clone)]
pub struct PoolEvent {
    /// Key of the session to evict.
    pub key: SessionKey,

    /// Name of the session to evict.
    pub name: String,
}

// =============================================================================
// PoolStats
// =============================================================================

struct PoolStats {
    created: AtomicU64,
    reused: AtomicU64,
    evicted: AtomicU64,
    disposed: watch::Sender<u64>,
}

impl PoolStats {
    fn new() -> Self {
        Self {
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            disposed: watch::Sender::new(0),
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatsSnapshot {
    /// Sessions created.
    pub created: u64,

    /// Successful reuses from the pool.
    pub reused: u64,

    /// Sessions evicted (keep-alive faults and failed reuse validation).
    pub evicted: u64,

    /// Disposals that have fully completed.
    pub disposed: u64,
}

// =============================================================================
// SessionPool
// =============================================================================

struct PoolInner<H: UaSession> {
    sessions: DashMap<SessionKey, Vec<PooledSession<H>>>,
    stats: PoolStats,
}

impl<H: UaSession> PoolInner<H> {
    /// Closes the session on a detached task and ticks the disposal
    /// counter once the close has completed.
    fn dispose_detached(&self, session: PooledSession<H>) {
        self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        let name = session.name;
        let handle = session.handle;
        let disposed = self.stats.disposed.clone();
        tokio::spawn(async move {
            if let Err(fault) = handle.close().await {
                debug!(session = %name, %fault, "session close reported a fault");
            }
            disposed.send_modify(|count| *count += 1);
        });
    }

    fn evict(&self, key: &SessionKey, name: &str) {
        let removed = self.sessions.get_mut(key).and_then(|mut idle| {
            idle.iter()
                .position(|session| session.name == name)
                .map(|index| idle.swap_remove(index))
        });
        match removed {
            Some(session) => {
                warn!(endpoint = %key.url, session = %name, "evicting session");
                self.dispose_detached(session);
            }
            None => {
                debug!(endpoint = %key.url, session = %name, "eviction target not pooled");
            }
        }
    }
}

/// Concurrent keyed pool of idle sessions.
pub struct SessionPool<H: UaSession> {
    inner: Arc<PoolInner<H>>,
    events: mpsc::UnboundedSender<PoolEvent>,
}

impl<H: UaSession> Clone for SessionPool<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
        }
    }
}

impl<H: UaSession> SessionPool<H> {
    /// Creates an empty pool and starts its eviction worker.
    ///
    /// Must be called within a tokio runtime.
    pub fn new() -> Self {
        let inner = Arc::new(PoolInner {
            sessions: DashMap::new(),
            stats: PoolStats::new(),
        });
        let (events, mut rx) = mpsc::unbounded_channel::<PoolEvent>();

        let worker = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                worker.evict(&event.key, &event.name);
            }
        });

        Self { inner, events }
    }

    /// Acquires an idle session for `key`, transferring ownership to the
    /// caller.
    ///
    /// The popped session must still match the current client certificate
    /// and report a connected handle; a stale one is disposed on a
    /// detached task and the acquire reports a miss, so the caller falls
    /// through to session creation. Returns `None` on an empty bucket.
    pub fn acquire(
        &self,
        key: &SessionKey,
        current_certificate: Option<&ClientCertificate>,
    ) -> Option<PooledSession<H>> {
        let candidate = self
            .inner
            .sessions
            .get_mut(key)
            .and_then(|mut idle| idle.pop())?;

        let certificate_matches =
            candidate.config.client_certificate.as_ref() == current_certificate;
        if certificate_matches && candidate.handle.is_connected() {
            self.inner.stats.reused.fetch_add(1, Ordering::Relaxed);
            return Some(candidate);
        }

        debug!(
            endpoint = %key.url,
            session = %candidate.name,
            stale_certificate = !certificate_matches,
            "disposing stale pooled session"
        );
        self.inner.dispose_detached(candidate);
        None
    }

    /// Returns a session to the pool.
    pub fn release(&self, session: PooledSession<H>) {
        self.inner
            .sessions
            .entry(session.key())
            .or_default()
            .push(session);
    }

    /// Disposes a session the caller owns instead of returning it to the
    /// pool. The close runs detached.
    pub fn dispose(&self, session: PooledSession<H>) {
        self.inner.dispose_detached(session);
    }

    /// Evicts a pooled session by key and name. A no-op when the session
    /// is not currently pooled.
    pub fn evict(&self, key: &SessionKey, name: &str) {
        self.inner.evict(key, name);
    }

    /// Returns a sender for out-of-band eviction requests, safe to move
    /// into keep-alive handlers.
    pub fn evictor(&self) -> mpsc::UnboundedSender<PoolEvent> {
        self.events.clone()
    }

    /// Records a freshly created session in the counters.
    pub fn record_created(&self) {
        self.inner.stats.created.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of idle sessions pooled under `key`.
    pub fn idle_count(&self, key: &SessionKey) -> usize {
        self.inner
            .sessions
            .get(key)
            .map(|idle| idle.len())
            .unwrap_or(0)
    }

    /// Returns the current counters.
    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            created: self.inner.stats.created.load(Ordering::Relaxed),
            reused: self.inner.stats.reused.load(Ordering::Relaxed),
            evicted: self.inner.stats.evicted.load(Ordering::Relaxed),
            disposed: *self.inner.stats.disposed.borrow(),
        }
    }

    /// Returns a receiver that observes the completed-disposal counter.
    pub fn disposals(&self) -> watch::Receiver<u64> {
        self.inner.stats.disposed.subscribe()
    }

    /// Disposes every pooled session.
    pub fn clear(&self) {
        let keys: Vec<SessionKey> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, idle)) = self.inner.sessions.remove(&key) {
                for session in idle {
                    self.inner.dispose_detached(session);
                }
            }
        }
    }
}

impl<H: UaSession> Default for SessionPool<H> {
    fn default() -> Self {
        Self::new()
    }
}
