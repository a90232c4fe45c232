//! In-flight action registry
//!
//! One async mutex per [`ActionKey`]. Holding its guard means the action's
//! effect script is running; the entry disappears once nobody holds or
//! waits for it.

use crate::config::DispatchMode;
use dashmap::DashMap;
use loandesk_core::ActionKey;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Tracks which actions currently have a script running
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    slots: DashMap<ActionKey, Arc<Mutex<()>>>,
}

impl InFlightRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for one script
    ///
    /// `DropIfBusy` returns `None` immediately when the key is held;
    /// `Queue` waits its turn in arrival order.
    pub async fn acquire(self: &Arc<Self>, key: &ActionKey, mode: DispatchMode) -> Option<InFlightGuard> {
        let slot = self.slots.entry(key.clone()).or_default().clone();
        let permit = match mode {
            DispatchMode::DropIfBusy => match slot.try_lock_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    // the holder may have released while we held our clone
                    self.prune(key);
                    return None;
                }
            },
            DispatchMode::Queue => slot.lock_owned().await,
        };
        Some(InFlightGuard {
            registry: Arc::clone(self),
            key: key.clone(),
            permit: Some(permit),
        })
    }

    /// Whether a script for `key` is running
    #[must_use]
    pub fn is_busy(&self, key: &ActionKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Number of keys with a holder or waiter
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop the entry for `key` once only the map references it
    fn prune(&self, key: &ActionKey) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Held for the lifetime of one effect script
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: ActionKey,
    permit: Option<OwnedMutexGuard<()>>,
}

impl InFlightGuard {
    #[must_use]
    pub fn key(&self) -> &ActionKey {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        drop(self.permit.take());
        // only the map's own reference left: no holder, no waiter
        self.registry.prune(&self.key);
    }
}
