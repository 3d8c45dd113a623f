//! Analysis stream - hands level/spectrum pairs from the capture callback
//! to any number of consumers
//!
//! Every subscriber owns a small bounded mailbox. Publishing never waits:
//! when a mailbox is full the oldest pending frame is evicted to make room,
//! so a slow consumer always finds the most recent readings instead of
//! holding up the audio thread.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use hark_analysis::{LevelSample, SpectrumFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// One block's worth of analysis, as seen by consumers
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFrame {
    /// Publication order, strictly increasing per stream
    pub sequence: u64,
    pub level: LevelSample,
    pub spectrum: SpectrumFrame,
}

/// Handle identifying one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Mailbox {
    id: SubscriberId,
    tx: Sender<AnalysisFrame>,
    /// Producer-side receiver, used only to evict stale frames
    evict: Receiver<AnalysisFrame>,
}

impl Mailbox {
    #[inline]
    fn deliver(&self, frame: AnalysisFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                let _ = self.evict.try_recv();
                let _ = self.tx.try_send(frame);
            }
            // Unreachable while `evict` is alive
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

struct Shared {
    /// Locked only to add, remove or iterate; never across consumer code
    subscribers: Mutex<Vec<Mailbox>>,
    next_sequence: AtomicU64,
    next_id: AtomicU64,
}

impl Shared {
    fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|m| m.id != id);
        before != subscribers.len()
    }
}

/// Cloneable publish/subscribe hub for analysis frames
#[derive(Clone)]
pub struct AnalysisStream {
    shared: Arc<Shared>,
}

impl Default for AnalysisStream {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisStream {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(Vec::new()),
                next_sequence: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe with a single-slot mailbox (latest value only)
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(1)
    }

    /// Subscribe with room for `capacity` pending frames
    ///
    /// Only frames published after this call are delivered.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let capacity = capacity.max(1);
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = bounded(capacity);

        self.shared.subscribers.lock().push(Mailbox {
            id,
            tx,
            evict: rx.clone(),
        });
        tracing::debug!(subscriber = id.0, capacity, "analysis stream subscriber added");

        Subscription {
            id,
            rx,
            stream: Arc::downgrade(&self.shared),
        }
    }

    /// Remove a subscriber
    ///
    /// Returns false if it was already gone. Frames already sitting in the
    /// subscriber's mailbox stay readable.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.shared.remove(id);
        if removed {
            tracing::debug!(subscriber = id.0, "analysis stream subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Publish one level/spectrum pair to every current subscriber
    ///
    /// Returns the sequence number assigned to the frame.
    pub fn publish(&self, level: LevelSample, spectrum: SpectrumFrame) -> u64 {
        let sequence = self.shared.next_sequence.fetch_add(1, Ordering::Relaxed);
        let frame = AnalysisFrame {
            sequence,
            level,
            spectrum,
        };

        let subscribers = self.shared.subscribers.lock();
        if let Some((last, rest)) = subscribers.split_last() {
            for mailbox in rest {
                mailbox.deliver(frame.clone());
            }
            last.deliver(frame);
        }
        sequence
    }
}

/// Receiving end of a subscription
///
/// Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    rx: Receiver<AnalysisFrame>,
    stream: Weak<Shared>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next pending frame, if any
    pub fn try_recv(&self) -> Option<AnalysisFrame> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next frame
    pub fn recv_timeout(&self, timeout: Duration) -> Result<AnalysisFrame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Drain the mailbox and keep only the newest frame
    pub fn latest(&self) -> Option<AnalysisFrame> {
        self.rx.try_iter().last()
    }

    /// Blocking iterator that ends once unsubscribed and drained
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, AnalysisFrame> {
        self.rx.iter()
    }

    /// Underlying channel, for use with `crossbeam_channel::select!`
    pub fn receiver(&self) -> &Receiver<AnalysisFrame> {
        &self.rx
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.stream.upgrade() {
            shared.remove(self.id);
        }
    }
}
