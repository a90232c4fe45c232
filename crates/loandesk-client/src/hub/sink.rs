//! Local notification list
//!
//! Keyed by notification id, newest push first. Entries are never removed
//! except by a full replace.

use indexmap::IndexMap;
use loandesk_core::{FileId, Notification, NotificationId};
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct NotificationSink {
    entries: RwLock<IndexMap<NotificationId, Notification>>,
}

impl NotificationSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list, keeping server order; returns the new length
    pub fn replace(&self, notifications: Vec<Notification>) -> usize {
        let list: IndexMap<_, _> = notifications
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let len = list.len();
        *self.entries.write() = list;
        len
    }

    /// Add a pushed notification at the front
    ///
    /// Returns `false` and changes nothing if the id is already present.
    pub fn insert(&self, notification: Notification) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&notification.id) {
            return false;
        }
        entries.shift_insert(0, notification.id.clone(), notification);
        true
    }

    /// Flip the read flag of every notification about `file`; returns how many changed
    pub fn mark_file_read(&self, file: &FileId) -> usize {
        let mut entries = self.entries.write();
        let mut changed = 0;
        for notification in entries.values_mut() {
            if notification.concerns(file) && !notification.is_read {
                notification.is_read = true;
                changed += 1;
            }
        }
        changed
    }

    #[must_use]
    pub fn list(&self) -> Vec<Notification> {
        self.entries.read().values().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.entries.read().get(id).cloned()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.entries.read().values().filter(|n| !n.is_read).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
