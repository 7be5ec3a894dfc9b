//! CSRF state token generation and the session-scoped token store
//!
//! One state token exists per authorization attempt. The store holds a
//! single slot under a fixed namespaced key, so starting a new attempt
//! invalidates any unfinished one and unrelated flows sharing the session
//! cannot collide with it.

use ab_types::AppResult;
use anyhow::anyhow;
use parking_lot::RwLock;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::Arc;

/// Session key under which the current state token lives
pub const STATE_STORAGE_KEY: &str = "authbroker.oauth2.state";

/// State token length in characters
pub const STATE_LENGTH: usize = 40;

const STATE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random state token for CSRF protection
///
/// 40 characters drawn from `[A-Za-z0-9]` using the system's secure random
/// source. At ~238 bits of entropy, collisions within a session are not a
/// practical concern.
pub fn generate_state() -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; STATE_LENGTH];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow!("system random source unavailable"))?;

    Ok(bytes
        .iter()
        .map(|b| STATE_ALPHABET[(*b as usize) % STATE_ALPHABET.len()] as char)
        .collect())
}

/// Store interface for the per-attempt state token
///
/// Injected everywhere the token is touched, so tests can swap in a double
/// and no component reaches into storage directly. `check` never removes the
/// token; removal is the explicit job of whoever owns the attempt.
pub trait StateTokenStore: Send + Sync {
    /// Persist the token, replacing any previous one.
    fn save(&self, token: &str);

    /// Read the currently stored token, if any.
    fn get(&self) -> Option<String>;

    /// True iff `candidate` equals the currently stored token.
    fn check(&self, candidate: &str) -> bool {
        self.get().as_deref() == Some(candidate)
    }

    /// Remove the stored token. Idempotent.
    fn clear(&self);
}

/// Session-scoped key/value storage shared by the host and the callback side
///
/// Lives for the duration of the host application's session, mirroring
/// browser `sessionStorage`. Both browsing contexts of one attempt read the
/// same instance.
#[derive(Debug, Default)]
pub struct SessionStore {
    values: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

/// [`StateTokenStore`] backed by a [`SessionStore`] slot under
/// [`STATE_STORAGE_KEY`]
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    session: Arc<SessionStore>,
}

impl SessionStateStore {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }
}

impl StateTokenStore for SessionStateStore {
    fn save(&self, token: &str) {
        self.session.set(STATE_STORAGE_KEY, token);
    }

    fn get(&self) -> Option<String> {
        self.session.get(STATE_STORAGE_KEY)
    }

    fn clear(&self) {
        self.session.remove(STATE_STORAGE_KEY);
    }
}
