//! Store events for observing recoveries and maintenance.
//!
//! The record store never interrupts callers when it repairs persisted
//! state, but repairs imply earlier data loss and must be observable. Every
//! repair, migration, eviction and backup operation is logged through
//! `tracing` and also emitted as a [`StoreEvent`] on the database's
//! [`EventFeed`].
//!
//! # Usage
//!
//! ```rust
//! use ifix_core::{Database, StoreEvent};
//!
//! let db = Database::in_memory();
//! let events = db.subscribe();
//!
//! db.table("CUSTOMERS").unwrap();
//! assert!(matches!(events.try_recv(), Ok(StoreEvent::Created { .. })));
//! ```

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// How a table was obtained when its stored blob was not current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySource {
    /// The envelope was current but its indexes disagreed with the records.
    Reindexed,
    /// An envelope with a `data` array but damaged or outdated metadata.
    Salvaged,
    /// A bare array of records from the original storage shape.
    LegacyArray,
    /// The blob was unusable; the snapshot under this key was loaded.
    Backup(String),
    /// Nothing usable was found; an empty table was substituted.
    Empty,
}

/// An event emitted by a table.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A table was created on first access.
    Created {
        /// Table name.
        table: String,
    },
    /// Persisted state was repaired while loading.
    Recovered {
        /// Table name.
        table: String,
        /// Where the repaired table came from.
        source: RecoverySource,
        /// Stored entries discarded because they did not look like records
        /// or duplicated an earlier id.
        dropped: usize,
    },
    /// Records were compacted to fit under the soft size limit.
    Compacted {
        /// Table name.
        table: String,
        /// Empty fields removed.
        fields_removed: usize,
    },
    /// The oldest records were evicted to fit under the soft size limit.
    Evicted {
        /// Table name.
        table: String,
        /// Evicted record ids.
        ids: Vec<String>,
    },
    /// A snapshot was written.
    BackupCreated {
        /// Table name.
        table: String,
        /// Backup key.
        key: String,
    },
    /// Snapshots were pruned.
    BackupsPruned {
        /// Table name.
        table: String,
        /// Number of snapshots removed.
        removed: usize,
    },
    /// A table was replaced by a snapshot.
    Restored {
        /// Table name.
        table: String,
        /// Backup key.
        key: String,
    },
}

impl StoreEvent {
    /// Name of the table the event belongs to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Created { table }
            | Self::Recovered { table, .. }
            | Self::Compacted { table, .. }
            | Self::Evicted { table, .. }
            | Self::BackupCreated { table, .. }
            | Self::BackupsPruned { table, .. }
            | Self::Restored { table, .. } => table,
        }
    }
}

/// Distributes store events to subscribers.
///
/// - Preserves emission order
/// - Supports multiple subscribers
/// - Drops subscribers whose receiver was dropped
/// - Is thread-safe
#[derive(Debug, Default)]
pub struct EventFeed {
    subscribers: RwLock<Vec<Sender<StoreEvent>>>,
}

impl EventFeed {
    /// Creates a feed without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Sends `event` to every live subscriber.
    pub fn emit(&self, event: StoreEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn created(table: &str) -> StoreEvent {
        StoreEvent::Created {
            table: table.to_string(),
        }
    }

    #[test]
    fn emit_and_receive() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();

        feed.emit(created("ORDERS"));
        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, created("ORDERS"));
        assert_eq!(received.table(), "ORDERS");
    }

    #[test]
    fn multiple_subscribers() {
        let feed = EventFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.emit(created("A"));
        assert_eq!(rx1.recv().unwrap(), created("A"));
        assert_eq!(rx2.recv().unwrap(), created("A"));
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(created("A"));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn threaded_emit() {
        let feed = Arc::new(EventFeed::new());
        let rx = feed.subscribe();

        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            feed_clone.emit(StoreEvent::Evicted {
                table: "ORDERS".into(),
                ids: vec!["o1".into()],
            });
        });

        let received = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!(matches!(received, StoreEvent::Evicted { ids, .. } if ids == ["o1"]));
        handle.join().unwrap();
    }
}
