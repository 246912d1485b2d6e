//! Response cache and in-flight request tracking.
//!
//! Entries hold raw response envelopes only. Records always live in the
//! collection; a cache hit is re-added through it like a fresh response.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::request::RawResponse;
use crate::error::NetworkError;

/// Lifecycle of one request key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Idle,
    InFlight,
    Resolved,
    Errored,
}

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub response: RawResponse,
    pub type_name: Option<String>,
    pub stored_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        match max_age {
            Some(max_age) => self.stored_at.elapsed() <= max_age,
            None => true,
        }
    }
}

type Waiter = oneshot::Sender<Result<RawResponse, NetworkError>>;

/// Outcome of claiming a key for fetching.
pub(crate) enum Flight {
    /// Nobody is fetching this key; the caller must fetch and `finish` it.
    Lead,
    /// An identical request is already running; wait for its result.
    Follow(oneshot::Receiver<Result<RawResponse, NetworkError>>),
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    status: HashMap<String, RequestStatus>,
    waiters: HashMap<String, Vec<Waiter>>,
}

#[derive(Default)]
pub(crate) struct CacheStore {
    state: Mutex<CacheState>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn put(&self, key: &str, type_name: Option<&str>, response: RawResponse) {
        self.state.lock().entries.insert(
            key.to_string(),
            CacheEntry {
                response,
                type_name: type_name.map(str::to_string),
                stored_at: Instant::now(),
            },
        );
    }

    pub fn status(&self, key: &str) -> RequestStatus {
        self.state
            .lock()
            .status
            .get(key)
            .copied()
            .unwrap_or(RequestStatus::Idle)
    }

    pub fn claim(&self, key: &str) -> Flight {
        let mut state = self.state.lock();
        if state.status.get(key) == Some(&RequestStatus::InFlight) {
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(key.to_string()).or_default().push(tx);
            return Flight::Follow(rx);
        }
        state
            .status
            .insert(key.to_string(), RequestStatus::InFlight);
        Flight::Lead
    }

    /// Settle a claimed key and hand the result to every follower.
    pub fn finish(&self, key: &str, result: &Result<RawResponse, NetworkError>) {
        let waiters = {
            let mut state = self.state.lock();
            let status = match result {
                Ok(response) if response.is_success() => RequestStatus::Resolved,
                _ => RequestStatus::Errored,
            };
            state.status.insert(key.to_string(), status);
            state.waiters.remove(key).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state
            .status
            .retain(|_, status| *status == RequestStatus::InFlight);
    }

    /// Drop every entry recorded for `type_name`.
    pub fn purge_type(&self, type_name: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| entry.type_name.as_deref() != Some(type_name));
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}
