// ── Device state store ──
//
// Latest-value cache for every observed state id. All writes funnel
// through `watch::Sender::send_modify`, which holds the channel's write
// lock for the duration of the closure, so concurrent writers from the
// realtime loop, the fetcher and the dispatcher are strictly serialized.
// Readers get copy-on-write snapshots.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::DeviceState;

/// Immutable snapshot of the whole state table.
pub type StateTable = Arc<HashMap<String, DeviceState>>;

/// Central store for device state values.
pub struct StateStore {
    table: watch::Sender<StateTable>,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
}

impl StateStore {
    pub fn new() -> Self {
        let (table, _) = watch::channel(Arc::new(HashMap::new()));
        let (last_update, _) = watch::channel(None);
        Self { table, last_update }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Record one observation. Last arrival wins.
    pub fn update(&self, id: &str, value: f64) {
        self.update_batch(std::iter::once((id.to_owned(), value)));
    }

    /// Apply a batch of observations under a single write.
    pub fn update_batch<I>(&self, values: I)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let now = Utc::now();
        let mut touched = false;

        self.table.send_modify(|table| {
            let entries = Arc::make_mut(table);
            for (id, value) in values {
                touched = true;
                match entries.get_mut(&id) {
                    Some(state) => {
                        state.value = value;
                        state.updated_at = now;
                    }
                    None => {
                        entries.insert(
                            id.clone(),
                            DeviceState {
                                id,
                                value,
                                updated_at: now,
                            },
                        );
                    }
                }
            }
        });

        if touched {
            let _ = self.last_update.send_replace(Some(now));
        }
    }

    /// Drop every entry (logout / disconnect).
    pub fn clear(&self) {
        self.table.send_modify(|table| *table = Arc::new(HashMap::new()));
        let _ = self.last_update.send_replace(None);
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<DeviceState> {
        self.table.borrow().get(id).cloned()
    }

    pub fn value(&self, id: &str) -> Option<f64> {
        self.table.borrow().get(id).map(|s| s.value)
    }

    /// `true` when a value is known for `id` and it is strictly positive.
    pub fn is_on(&self, id: &str) -> bool {
        self.table.borrow().get(id).is_some_and(DeviceState::is_on)
    }

    pub fn snapshot(&self) -> StateTable {
        self.table.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(&self) -> StateStream {
        StateStream::new(self.table.subscribe())
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── StateStream ─────────────────────────────────────────────────────

/// A subscription to the state table.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed`](Self::changed) or by converting to a `Stream`.
pub struct StateStream {
    current: StateTable,
    receiver: watch::Receiver<StateTable>,
}

impl StateStream {
    fn new(receiver: watch::Receiver<StateTable>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &StateTable {
        &self.current
    }

    /// Latest snapshot (may have changed since `current`).
    pub fn latest(&self) -> StateTable {
        self.receiver.borrow().clone()
    }

    /// Wait for the next write, returning the new snapshot.
    /// Returns `None` once the store is dropped.
    pub async fn changed(&mut self) -> Option<StateTable> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a snapshot after every write.
pub struct StateWatchStream {
    inner: WatchStream<StateTable>,
}

impl Stream for StateWatchStream {
    type Item = StateTable;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;

    #[test]
    fn update_creates_then_overwrites() {
        let store = StateStore::new();
        assert!(store.get("a").is_none());
        assert!(!store.is_on("a"));

        store.update("a", 1.0);
        assert!(store.is_on("a"));
        store.update("a", 0.0);
        assert!(!store.is_on("a"));
        assert_eq!(store.len(), 1);
        assert!(store.last_update().is_some());
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let store = StateStore::new();
        store.update("a", 1.0);
        let snap = store.snapshot();
        store.update("a", 2.0);
        assert_eq!(snap["a"].value, 1.0);
        assert_eq!(store.value("a"), Some(2.0));
    }

    #[test]
    fn clear_drops_everything() {
        let store = StateStore::new();
        store.update_batch(vec![("a".into(), 1.0), ("b".into(), 2.0)]);
        assert_eq!(store.len(), 2);
        store.clear();
        assert!(store.is_empty());
        assert!(store.last_update().is_none());
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        let store = Arc::new(StateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        store.update(&format!("id-{t}-{i}"), f64::from(i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8 * 200);
    }

    #[tokio::test]
    async fn subscribers_see_batches() {
        let store = Arc::new(StateStore::new());
        let mut sub = store.subscribe();
        assert!(sub.current().is_empty());

        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            writer.update_batch(vec![("a".into(), 1.0), ("b".into(), 0.0)]);
        });

        let snap = tokio::time::timeout(Duration::from_secs(1), sub.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(sub.latest().len(), 2);
    }

    #[tokio::test]
    async fn into_stream_yields_snapshots() {
        let store = StateStore::new();
        let mut stream = store.subscribe().into_stream();

        // WatchStream yields the initial value first.
        let first = stream.next().await.unwrap();
        assert!(first.is_empty());

        store.update("a", 3.0);
        let next = stream.next().await.unwrap();
        assert_eq!(next["a"].value, 3.0);
    }
}
