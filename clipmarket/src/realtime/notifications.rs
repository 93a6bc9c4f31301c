//! In-memory inbox fed by `notification` channel messages.

use super::{
    client::RealtimeClient,
    messages::{ChannelMessage, NOTIFICATION, NotificationRecord},
};
use crate::observer::{ListenerSet, Subscription, lock};
use std::sync::{Arc, Mutex};

/// Holds the user's notifications, newest first.
///
/// Records are only ever added, flagged read, or removed all at once by
/// [`NotificationCenter::clear`].
#[derive(Default)]
pub struct NotificationCenter {
    records: Mutex<Vec<NotificationRecord>>,
    listeners: ListenerSet<Vec<NotificationRecord>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed inbound `notification` messages from `client` into this center
    pub fn attach(self: &Arc<Self>, client: &RealtimeClient) -> Subscription {
        let center = Arc::clone(self);
        client.on(NOTIFICATION, move |message| {
            center.ingest(message);
        })
    }

    /// Store the notification carried by `message`.
    ///
    /// Returns false if the payload is not a notification or its id is
    /// already known.
    pub fn ingest(&self, message: &ChannelMessage) -> bool {
        match serde_json::from_value::<NotificationRecord>(message.payload.clone()) {
            Ok(record) => self.push(record),
            Err(err) => {
                log::warn!("Ignoring malformed notification payload: {}", err);
                false
            }
        }
    }

    /// Add `record` at the front of the inbox
    pub fn push(&self, record: NotificationRecord) -> bool {
        self.mutate(|records| {
            if records.iter().any(|existing| existing.id == record.id) {
                log::debug!("Duplicate notification {} ignored", record.id);
                return false;
            }
            records.insert(0, record);
            true
        })
    }

    pub fn list(&self) -> Vec<NotificationRecord> {
        lock(&self.records).clone()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.records).iter().filter(|record| !record.read).count()
    }

    /// Flag one notification as read. Returns false if it was unknown or
    /// already read.
    pub fn mark_read(&self, id: &str) -> bool {
        self.mutate(|records| {
            match records.iter_mut().find(|record| record.id == id && !record.read) {
                Some(record) => {
                    record.read = true;
                    true
                }
                None => false,
            }
        })
    }

    /// Flag every notification as read; returns how many changed
    pub fn mark_all_read(&self) -> usize {
        let mut changed = 0;
        self.mutate(|records| {
            for record in records.iter_mut().filter(|record| !record.read) {
                record.read = true;
                changed += 1;
            }
            changed > 0
        });
        changed
    }

    pub fn clear(&self) {
        self.mutate(|records| {
            let had_any = !records.is_empty();
            records.clear();
            had_any
        });
    }

    /// Observe the inbox; the listener receives the current list
    /// immediately and again after every change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Vec<NotificationRecord>) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Arc<dyn Fn(&Vec<NotificationRecord>) + Send + Sync> = Arc::new(listener);
        let subscription = self.listeners.add(Arc::clone(&listener));

        let current = self.list();
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&current))).is_err() {
            log::error!("Notification listener panicked during initial emission");
        }
        subscription
    }

    /// Apply `change` under the lock and notify listeners if it reports a
    /// modification.
    fn mutate(&self, change: impl FnOnce(&mut Vec<NotificationRecord>) -> bool) -> bool {
        let snapshot = {
            let mut records = lock(&self.records);
            if !change(&mut records) {
                return false;
            }
            records.clone()
        };
        self.listeners.emit(&snapshot);
        true
    }
}
