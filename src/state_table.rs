//! # Conversation State Table Module
//!
//! In-memory record of which users are in the middle of a flow. The whole
//! table sits behind one mutex; every operation is O(1) and the guard is
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::dialogue::DialogueState;

#[derive(Debug, Clone, Copy)]
struct StateEntry {
    state: DialogueState,
    last_update: Instant,
}

/// Per-user dialogue state with inactivity expiry.
///
/// A user without an entry is [`DialogueState::Idle`].
#[derive(Debug)]
pub struct ConversationStates {
    entries: Mutex<HashMap<i64, StateEntry>>,
    ttl: Duration,
}

impl ConversationStates {
    /// Create an empty table whose entries expire after `ttl` of inactivity
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    // Entries are plain values, so a poisoned map is still consistent
    fn lock(&self) -> MutexGuard<'_, HashMap<i64, StateEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, user_id: i64) -> DialogueState {
        self.lock()
            .get(&user_id)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Record `state` for `user_id`, stamped with the current time.
    /// Setting [`DialogueState::Idle`] removes the entry.
    pub fn set(&self, user_id: i64, state: DialogueState) {
        self.set_at(user_id, state, Instant::now());
    }

    pub fn set_at(&self, user_id: i64, state: DialogueState, now: Instant) {
        debug!(user_id, state = ?state, "Dialogue state updated");
        let mut entries = self.lock();
        if state == DialogueState::Idle {
            entries.remove(&user_id);
        } else {
            entries.insert(
                user_id,
                StateEntry {
                    state,
                    last_update: now,
                },
            );
        }
    }

    pub fn clear(&self, user_id: i64) {
        if self.lock().remove(&user_id).is_some() {
            debug!(user_id, "Dialogue state cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry last updated more than the TTL before `now`.
    /// Returns the number of entries removed.
    pub fn purge_stale(&self, now: Instant) -> usize {
        let ttl = self.ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_update) <= ttl);
        before - entries.len()
    }

    /// Spawn the background sweep, running every `interval` until aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.purge_stale(Instant::now());
                if removed > 0 {
                    info!(removed, remaining = self.len(), "Swept stale dialogue states");
                }
            }
        })
    }
}
