// ABOUTME: Process-wide ephemeral session store for login flow state
// ABOUTME: LRU-bounded with a server-side TTL for the unauthenticated phase
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Flow Session Store
//!
//! Keeps per-login flow state between the authorization redirect and the
//! provider callback, and the post-auth artifacts afterwards. The map is
//! bounded by an LRU capacity and entries that never complete authentication
//! expire after the configured TTL, so an attacker spraying `/login` cannot
//! grow the store without bound. Authenticated sessions live until logout.

use crate::config::SessionConfig;
use crate::oauth::client::IdentityClaims;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Fallback capacity when the configured bound is zero
const FALLBACK_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => unreachable!(),
};

/// Progress of a login flow through the code exchange and minting steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    /// Login initiated; waiting for the provider callback
    Started,
    /// Callback received and state validated
    Authorized,
    /// Provider tokens obtained and identity claims stored
    TokenExchanged,
    /// Downstream token minted
    Minted,
    /// Terminal failure; the session can only be discarded
    Failed,
}

/// Per-login flow state, keyed by an opaque session identifier
#[derive(Debug, Clone)]
pub struct FlowSession {
    /// PKCE secret; sent to the provider only on the code exchange
    pub code_verifier: String,
    /// Single-use CSRF nonce; taken exactly once, on callback
    pub state: Option<String>,
    /// Creation timestamp, used for unauthenticated-phase expiry
    pub created_at: DateTime<Utc>,
    /// Current flow stage
    pub stage: FlowStage,
    /// Claims decoded from the identity token, present after the exchange
    pub identity: Option<IdentityClaims>,
    /// Provider access token, present after the exchange
    pub provider_access_token: Option<String>,
    /// Minted downstream token, lazily created and cached
    pub downstream_token: Option<String>,
}

impl FlowSession {
    fn new(code_verifier: String, state: String) -> Self {
        Self {
            code_verifier,
            state: Some(state),
            created_at: Utc::now(),
            stage: FlowStage::Started,
            identity: None,
            provider_access_token: None,
            downstream_token: None,
        }
    }

    /// Whether the code exchange has completed for this session
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.stage, FlowStage::TokenExchanged | FlowStage::Minted)
    }

    /// Consume the stored state nonce; subsequent calls return `None`
    pub fn take_state(&mut self) -> Option<String> {
        self.state.take()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        !self.is_authenticated() && Utc::now().signed_duration_since(self.created_at) > ttl
    }
}

/// Shared, capacity-bounded store of [`FlowSession`] records
///
/// All read-modify-write happens under the lock via [`SessionStore::update`],
/// so interleaved requests for the same session cannot lose updates.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<LruCache<String, FlowSession>>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store with the given TTL and capacity bounds
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(FALLBACK_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(LruCache::new(capacity))),
            ttl: Duration::seconds(i64::try_from(config.ttl_secs).unwrap_or(i64::MAX)),
        }
    }

    /// Insert a fresh session and return its identifier
    pub async fn create(&self, code_verifier: String, state: String) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = FlowSession::new(code_verifier, state);
        self.inner.write().await.put(session_id.clone(), session);
        session_id
    }

    /// Fetch a snapshot of a session, dropping it if expired
    pub async fn get(&self, session_id: &str) -> Option<FlowSession> {
        let mut store = self.inner.write().await;
        if store.get(session_id).is_some_and(|s| s.is_expired(self.ttl)) {
            debug!(session_id, "dropping expired unauthenticated session");
            store.pop(session_id);
            return None;
        }
        store.get(session_id).cloned()
    }

    /// Apply a mutation to a session under the write lock
    ///
    /// Returns `false` when the session is absent or expired.
    pub async fn update<F>(&self, session_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut FlowSession),
    {
        let mut store = self.inner.write().await;
        if store.get(session_id).is_some_and(|s| s.is_expired(self.ttl)) {
            store.pop(session_id);
            return false;
        }
        match store.get_mut(session_id) {
            Some(session) => {
                mutate(session);
                true
            }
            None => false,
        }
    }

    /// Remove a session; returns whether it existed
    pub async fn remove(&self, session_id: &str) -> bool {
        self.inner.write().await.pop(session_id).is_some()
    }

    /// Drop every expired unauthenticated session, returning the count removed
    pub async fn sweep(&self) -> usize {
        let mut store = self.inner.write().await;
        let expired: Vec<String> = store
            .iter()
            .filter(|(_, s)| s.is_expired(self.ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            store.pop(key);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "swept expired sessions");
        }
        expired.len()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store holds no sessions
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
