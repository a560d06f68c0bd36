//! Live view over the locations table.
//!
//! The store owns the sending half of a `watch` channel and republishes the
//! full ordered table after every committed mutation. Each [`LiveQuery`]
//! yields the snapshot current at subscription time first, then every
//! later snapshot. A reader that falls behind skips straight to the newest
//! snapshot; intermediate ones are not buffered.

use futures::Stream;
use tokio::sync::watch;

use crate::models::StoredLocation;

/// A full, ordered snapshot of the locations table.
pub type Snapshot = Vec<StoredLocation>;

/// Subscriber handle for the live locations view.
///
/// Returned by [`Store::observe_all`](crate::Store::observe_all). The
/// sequence ends only when the store is dropped.
#[derive(Debug, Clone)]
pub struct LiveQuery {
    rx: watch::Receiver<Snapshot>,
    primed: bool,
}

impl LiveQuery {
    pub(crate) fn new(rx: watch::Receiver<Snapshot>) -> Self {
        Self { rx, primed: false }
    }

    /// Wait for the next snapshot.
    ///
    /// The first call returns immediately with the current table contents.
    /// Returns `None` once the store has been dropped and every published
    /// snapshot has been seen.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }

        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// The latest published snapshot, without waiting.
    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Convert into a `futures::Stream` of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = Snapshot> + Send + Unpin + 'static {
        Box::pin(futures::stream::unfold(self, |mut query| async move {
            query.next().await.map(|snapshot| (snapshot, query))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, timestamp: i64) -> StoredLocation {
        StoredLocation {
            id,
            latitude: 1.0,
            longitude: 2.0,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_first_next_replays_current() {
        let (tx, rx) = watch::channel(vec![row(1, 10)]);
        let mut query = LiveQuery::new(rx);

        assert_eq!(query.next().await.unwrap(), vec![row(1, 10)]);

        tx.send_replace(vec![row(2, 20), row(1, 10)]);
        assert_eq!(query.next().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ends_when_sender_dropped() {
        let (tx, rx) = watch::channel(Vec::new());
        let mut query = LiveQuery::new(rx);
        assert!(query.next().await.unwrap().is_empty());

        tx.send_replace(vec![row(1, 1)]);
        drop(tx);

        // Unseen value is still delivered before the end
        assert_eq!(query.next().await.unwrap().len(), 1);
        assert!(query.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lagging_reader_sees_latest_only() {
        let (tx, rx) = watch::channel(Vec::new());
        let mut query = LiveQuery::new(rx);
        query.next().await;

        tx.send_replace(vec![row(1, 1)]);
        tx.send_replace(vec![row(2, 2), row(1, 1)]);

        assert_eq!(query.next().await.unwrap().len(), 2);
        assert_eq!(query.current().len(), 2);
    }

    #[tokio::test]
    async fn test_into_stream() {
        use futures::StreamExt;

        let (tx, rx) = watch::channel(vec![row(1, 1)]);
        let mut stream = LiveQuery::new(rx).into_stream();

        assert_eq!(stream.next().await.unwrap().len(), 1);
        drop(tx);
        assert!(stream.next().await.is_none());
    }
}
