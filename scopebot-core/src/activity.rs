// ABOUTME: At most one long-running unit of work per key (usually a logical scope)
// ABOUTME: Cooperative stop/pause/resume through a shared state the worker polls

use crate::scope::Scope;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Mutex as AsyncMutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Running,
    Paused,
    Stopped,
}

/// Shared control flag between a worker task and whoever manages it
#[derive(Debug, Clone)]
pub struct ActivityHandle {
    state: Arc<watch::Sender<ActivityState>>,
}

impl Default for ActivityHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ActivityState::Running);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn state(&self) -> ActivityState {
        *self.state.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ActivityState::Stopped
    }

    pub fn stop(&self) {
        self.state.send_replace(ActivityState::Stopped);
    }

    /// Running -> Paused. Returns false in any other state.
    pub fn pause(&self) -> bool {
        self.transition(ActivityState::Running, ActivityState::Paused)
    }

    /// Paused -> Running. Returns false in any other state.
    pub fn resume(&self) -> bool {
        self.transition(ActivityState::Paused, ActivityState::Running)
    }

    fn transition(&self, from: ActivityState, to: ActivityState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Called by the worker between steps. Waits while paused; returns
    /// false once the worker should exit.
    pub async fn checkpoint(&self) -> bool {
        let mut rx = self.state.subscribe();
        let running = match rx.wait_for(|s| *s != ActivityState::Paused).await {
            Ok(state) => *state == ActivityState::Running,
            Err(_) => false,
        };
        running
    }

    /// Resolves when the handle is stopped
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == ActivityState::Stopped).await;
    }
}

type Slot = Arc<AsyncMutex<Option<ActivityHandle>>>;

/// Per-key activity slots.
///
/// Each key has its own async mutex, so transitions on one key are
/// serialized while different keys never wait on each other.
#[derive(Debug)]
pub struct ActivitySlots<K = Scope> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Default for ActivitySlots<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Hash + Eq + Clone> ActivitySlots<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &K) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Drop the map entry for `key` once its slot is empty. Kept while
    /// another caller holds a clone of the slot.
    fn release(&self, key: &K, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let ours = slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot));
        // One reference in the map, one held by the caller
        if ours && Arc::strong_count(slot) == 2 {
            slots.remove(key);
        }
    }

    /// Stop whatever runs under `key` and register a fresh running handle
    pub async fn replace(&self, key: &K) -> ActivityHandle {
        let slot = self.slot(key);
        let mut current = slot.lock().await;
        if let Some(previous) = current.take() {
            previous.stop();
        }
        let handle = ActivityHandle::new();
        *current = Some(handle.clone());
        handle
    }

    /// Stop the activity under `key`. Returns false when nothing was running.
    pub async fn stop(&self, key: &K) -> bool {
        let slot = self.slot(key);
        let mut current = slot.lock().await;
        let stopped = match current.take() {
            Some(handle) if !handle.is_stopped() => {
                handle.stop();
                true
            }
            _ => false,
        };
        self.release(key, &slot);
        stopped
    }

    pub async fn pause(&self, key: &K) -> bool {
        let slot = self.slot(key);
        let current = slot.lock().await;
        if current.is_none() {
            self.release(key, &slot);
            return false;
        }
        current.as_ref().is_some_and(|h| h.pause())
    }

    pub async fn resume(&self, key: &K) -> bool {
        let slot = self.slot(key);
        let current = slot.lock().await;
        if current.is_none() {
            self.release(key, &slot);
            return false;
        }
        current.as_ref().is_some_and(|h| h.resume())
    }

    /// Release the slot if `handle` still owns it. Workers call this when
    /// they finish on their own.
    pub async fn finish(&self, key: &K, handle: &ActivityHandle) {
        let slot = self.slot(key);
        let mut current = slot.lock().await;
        if current
            .as_ref()
            .is_some_and(|h| Arc::ptr_eq(&h.state, &handle.state))
        {
            handle.stop();
            *current = None;
        }
        if current.is_none() {
            self.release(key, &slot);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
