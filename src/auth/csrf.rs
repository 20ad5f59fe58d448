//! In-memory CSRF token manager.
//!
//! One active token per user key, kept in a process-local map. Tokens
//! expire after a configurable TTL; a background sweep evicts expired
//! entries so the map stays bounded between validations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;

/// Token length in bytes before hex encoding.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct CsrfEntry {
    token: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

/// Process-local CSRF token store.
///
/// Cloning is cheap and all clones share the same map. Tokens live only
/// in this process; a restart invalidates every outstanding token.
#[derive(Clone)]
pub struct CsrfTokenManager {
    entries: Arc<Mutex<HashMap<String, CsrfEntry>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CsrfTokenManager {
    /// Create a manager with the given token TTL.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            ttl,
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    fn generate_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Issue a fresh token for a user key, replacing any existing one.
    ///
    /// The previous token (if any) stops validating immediately.
    pub fn issue(&self, user_key: &str) -> String {
        let token = Self::generate_token();
        let now = self.clock.now();

        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            user_key.to_string(),
            CsrfEntry {
                token: token.clone(),
                expires_at: now + self.ttl,
                created_at: now,
            },
        );

        token
    }

    /// Validate a presented token for a user key.
    ///
    /// Fails closed: no entry, empty input, expired entry, and mismatch
    /// all return `false`. An expired entry is deleted on the spot.
    pub fn validate(&self, user_key: &str, presented: &str) -> bool {
        if presented.is_empty() {
            return false;
        }

        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(user_key) else {
            return false;
        };

        if entry.expires_at <= self.clock.now() {
            entries.remove(user_key);
            debug!(user_key, "Expired CSRF token evicted on validation");
            return false;
        }

        constant_time_eq(entry.token.as_bytes(), presented.as_bytes())
    }

    /// Remove the token for a user key, if present.
    pub fn revoke(&self, user_key: &str) {
        self.entries.lock().unwrap().remove(user_key);
    }

    /// Issue a replacement token, invalidating the current one.
    pub fn rotate(&self, user_key: &str) -> String {
        self.issue(user_key)
    }

    /// Drop every stored token.
    pub fn clear_all(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of live entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Evict all expired entries, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Start the periodic background sweep.
    ///
    /// At most one sweeper runs per manager; calling this again replaces
    /// the previous task.
    pub fn start_sweeper(&self, interval: std::time::Duration) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = manager.sweep_expired();
                if evicted > 0 {
                    info!(evicted, "CSRF sweep evicted expired tokens");
                }
            }
        });

        if let Some(old) = self.sweeper.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    /// Stop the sweeper and drop all tokens.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        self.clear_all();
    }

    /// Age of the current token for a user key, if one exists.
    pub fn token_age(&self, user_key: &str) -> Option<Duration> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(user_key)
            .map(|entry| self.clock.now() - entry.created_at)
    }
}

/// Compare two byte strings without short-circuiting on the first
/// mismatching byte. Length differences still return early; token
/// lengths are fixed and public.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
