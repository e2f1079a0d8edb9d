use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::shared::snapshot::Snapshot;

/// Fan-out of published snapshots to any number of subscribers.
///
/// Each subscriber gets a channel of capacity one holding only the newest
/// snapshot: publishing never blocks, and a slow reader skips stale frames.
#[derive(Default)]
pub struct SnapshotChannel {
    subscribers: Mutex<Vec<Subscriber>>,
}

struct Subscriber {
    tx: Sender<Arc<Snapshot>>,
    // Used to evict the stale value when the slot is full.
    drain: Receiver<Arc<Snapshot>>,
    alive: Weak<()>,
}

/// Receiving end returned by [`SnapshotChannel::subscribe`]. Dropping every
/// clone unsubscribes.
#[derive(Clone)]
pub struct SnapshotReceiver {
    rx: Receiver<Arc<Snapshot>>,
    _alive: Arc<()>,
}

impl SnapshotReceiver {
    pub fn recv(&self) -> Result<Arc<Snapshot>, RecvError> {
        self.rx.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Arc<Snapshot>, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Arc<Snapshot>, TryRecvError> {
        self.rx.try_recv()
    }

    /// Underlying receiver, for use with `crossbeam_channel::select!`.
    pub fn as_receiver(&self) -> &Receiver<Arc<Snapshot>> {
        &self.rx
    }
}

impl SnapshotChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let alive = Arc::new(());
        self.lock().push(Subscriber {
            tx,
            drain: rx.clone(),
            alive: Arc::downgrade(&alive),
        });
        SnapshotReceiver { rx, _alive: alive }
    }

    /// Hands `snapshot` to every live subscriber, replacing whatever it has
    /// not read yet.
    pub fn publish(&self, snapshot: &Arc<Snapshot>) {
        self.lock().retain(|sub| {
            if sub.alive.strong_count() == 0 {
                return false;
            }
            match sub.tx.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(latest)) => {
                    let _ = sub.drain.try_recv();
                    // The reader may have taken the stale value in between;
                    // either way the slot now has room or holds a newer one.
                    let _ = sub.tx.try_send(latest);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|s| s.alive.strong_count() > 0)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::Frame;
    use crate::shared::inference_result::InferenceResult;

    fn snapshot(sequence: u64) -> Arc<Snapshot> {
        let frame = Frame::new(vec![0; 3], 1, 1, 3, sequence, sequence as f64);
        Arc::new(Snapshot::new(
            frame,
            InferenceResult::empty("test", sequence as f64),
            Duration::from_millis(5),
        ))
    }

    #[test]
    fn test_slow_subscriber_sees_only_latest() {
        let channel = SnapshotChannel::new();
        let rx = channel.subscribe();

        for seq in 1..=5 {
            channel.publish(&snapshot(seq));
        }

        assert_eq!(rx.try_recv().unwrap().sequence(), 5);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_every_subscriber_receives() {
        let channel = SnapshotChannel::new();
        let a = channel.subscribe();
        let b = channel.subscribe();
        channel.publish(&snapshot(1));
        assert_eq!(a.try_recv().unwrap().sequence(), 1);
        assert_eq!(b.try_recv().unwrap().sequence(), 1);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let channel = SnapshotChannel::new();
        let kept = channel.subscribe();
        let dropped = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        drop(dropped);
        channel.publish(&snapshot(1));

        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(channel.lock().len(), 1);
        assert_eq!(kept.try_recv().unwrap().sequence(), 1);
    }

    #[test]
    fn test_cloned_receiver_keeps_subscription() {
        let channel = SnapshotChannel::new();
        let rx = channel.subscribe();
        let clone = rx.clone();
        drop(rx);
        channel.publish(&snapshot(7));
        assert_eq!(clone.recv_timeout(Duration::from_secs(1)).unwrap().sequence(), 7);
    }
}
