//! Sample recorder - logs level readings from the analysis stream
//!
//! While recording, a worker thread drains a subscription and appends one
//! [`DataPoint`] per level reading. Stopping unsubscribes first and then
//! lets the worker finish whatever was already delivered, so the log ends
//! exactly at the stop point.

use crate::store::{SampleStore, StoreError};
use hark_analysis::LevelSample;
use hark_audio::{AnalysisStream, SubscriberId, Subscription};
use jiff::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Store key the level log is saved under
pub const LOG_KEY: &str = "level_log.json";

/// Mailbox depth used for the recorder's subscription
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// One recorded level reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub id: Uuid,
    /// RFC 3339 in the persisted form
    pub timestamp: Timestamp,
    pub decibels: f32,
}

impl DataPoint {
    pub fn new(timestamp: Timestamp, decibels: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            decibels,
        }
    }

    pub fn from_level(level: &LevelSample) -> Self {
        Self::new(level.timestamp, level.decibels)
    }
}

/// Errors that can occur while saving or loading the log
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Stored level log is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("Failed to encode level log: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

#[derive(Clone)]
struct Autosave {
    store: Arc<dyn SampleStore>,
    interval: Duration,
}

type SharedLog = Arc<Mutex<Vec<DataPoint>>>;

struct Session {
    stream: AnalysisStream,
    subscriber: SubscriberId,
    worker: JoinHandle<()>,
}

/// Records level readings into an in-memory log
pub struct SampleRecorder {
    log: SharedLog,
    session: Option<Session>,
    queue_capacity: usize,
    autosave: Option<Autosave>,
}

impl Default for SampleRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleRecorder {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            session: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            autosave: None,
        }
    }

    /// How many readings may queue up before the oldest are dropped
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Save the log to `store` every `interval` while recording, and once
    /// more when recording stops
    pub fn with_autosave(mut self, store: Arc<dyn SampleStore>, interval: Duration) -> Self {
        self.autosave = Some(Autosave { store, interval });
        self
    }

    pub fn state(&self) -> RecorderState {
        if self.session.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Start appending readings from `stream`; no-op if already recording
    pub fn start_collecting(&mut self, stream: &AnalysisStream) {
        if self.session.is_some() {
            return;
        }

        let subscription = stream.subscribe_with_capacity(self.queue_capacity);
        let subscriber = subscription.id();
        let log = self.log.clone();
        let autosave = self.autosave.clone();
        let worker = thread::spawn(move || run_worker(subscription, log, autosave));

        self.session = Some(Session {
            stream: stream.clone(),
            subscriber,
            worker,
        });
        tracing::info!("recording started");
    }

    /// Stop recording and keep the log; no-op if already idle
    ///
    /// Readings published before this call are in the log when it returns.
    pub fn stop_collecting(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.stream.unsubscribe(session.subscriber);
        if session.worker.join().is_err() {
            tracing::error!("recorder worker panicked");
        }

        if let Some(autosave) = &self.autosave {
            if let Err(e) = save_log(&self.log, autosave.store.as_ref()) {
                tracing::warn!(error = %e, "failed to save level log");
            }
        }
        tracing::info!(points = self.len(), "recording stopped");
    }

    /// Flip between Idle and Recording, returning the new state
    pub fn toggle(&mut self, stream: &AnalysisStream) -> RecorderState {
        if self.is_recording() {
            self.stop_collecting();
        } else {
            self.start_collecting(stream);
        }
        self.state()
    }

    /// Empty the log, whether recording or not
    pub fn clear(&self) {
        self.log.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Snapshot of the log in arrival order
    pub fn data_points(&self) -> Vec<DataPoint> {
        self.log.lock().clone()
    }

    /// Write the whole log to `store`, returning the number of points saved
    pub fn save(&self, store: &dyn SampleStore) -> Result<usize, RecorderError> {
        save_log(&self.log, store)
    }

    /// Replace the log with the one in `store`
    ///
    /// A store with nothing saved yields an empty log. On error the current
    /// log is left untouched.
    pub fn load(&self, store: &dyn SampleStore) -> Result<usize, RecorderError> {
        let points = match store.read(LOG_KEY)? {
            Some(bytes) => {
                serde_json::from_slice::<Vec<DataPoint>>(&bytes).map_err(RecorderError::Corrupt)?
            }
            None => Vec::new(),
        };
        let count = points.len();
        *self.log.lock() = points;
        tracing::debug!(points = count, "level log loaded");
        Ok(count)
    }
}

impl Drop for SampleRecorder {
    fn drop(&mut self) {
        self.stop_collecting();
    }
}

fn save_log(log: &Mutex<Vec<DataPoint>>, store: &dyn SampleStore) -> Result<usize, RecorderError> {
    // Encode outside the lock so the worker is never held up by I/O
    let points = log.lock().clone();
    let bytes = serde_json::to_vec_pretty(&points).map_err(RecorderError::Encode)?;
    store.write(LOG_KEY, &bytes)?;
    Ok(points.len())
}

fn run_worker(subscription: Subscription, log: SharedLog, autosave: Option<Autosave>) {
    let mut last_save = Instant::now();

    // Ends once unsubscribed and every delivered frame has been consumed
    for frame in subscription.iter() {
        log.lock().push(DataPoint::from_level(&frame.level));

        if let Some(autosave) = &autosave {
            if last_save.elapsed() >= autosave.interval {
                if let Err(e) = save_log(&log, autosave.store.as_ref()) {
                    tracing::warn!(error = %e, "autosave failed");
                }
                last_save = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use hark_analysis::SpectrumFrame;
    use std::collections::HashSet;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_second(secs).unwrap()
    }

    fn publish(stream: &AnalysisStream, secs: i64, db: f32) {
        let timestamp = ts(secs);
        stream.publish(
            LevelSample {
                decibels: db,
                timestamp,
            },
            SpectrumFrame::silence(8, 44100, timestamp),
        );
    }

    struct BrokenStore;

    impl SampleStore for BrokenStore {
        fn read(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            )))
        }

        fn write(&self, _key: &str, _bytes: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            )))
        }
    }

    #[test]
    fn test_starts_idle() {
        let recorder = SampleRecorder::new();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_idle_ignores_samples() {
        let stream = AnalysisStream::new();
        let recorder = SampleRecorder::new();
        publish(&stream, 1, -20.0);
        assert!(recorder.is_empty());
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn test_stop_mid_stream() {
        let stream = AnalysisStream::new();
        let mut recorder = SampleRecorder::new();

        recorder.start_collecting(&stream);
        assert_eq!(recorder.state(), RecorderState::Recording);
        assert_eq!(stream.subscriber_count(), 1);

        publish(&stream, 1, -30.0);
        publish(&stream, 2, -20.0);
        publish(&stream, 3, -10.0);

        recorder.stop_collecting();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert_eq!(stream.subscriber_count(), 0);

        publish(&stream, 4, -5.0);
        publish(&stream, 5, -1.0);

        let points = recorder.data_points();
        let levels: Vec<f32> = points.iter().map(|p| p.decibels).collect();
        let times: Vec<Timestamp> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(levels, vec![-30.0, -20.0, -10.0]);
        assert_eq!(times, vec![ts(1), ts(2), ts(3)]);
    }

    #[test]
    fn test_ids_are_unique() {
        let stream = AnalysisStream::new();
        let mut recorder = SampleRecorder::new();
        recorder.start_collecting(&stream);
        for i in 0..100 {
            publish(&stream, i, -40.0);
        }
        recorder.stop_collecting();

        let ids: HashSet<Uuid> = recorder.data_points().iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let stream = AnalysisStream::new();
        let mut recorder = SampleRecorder::new();

        recorder.stop_collecting();
        recorder.start_collecting(&stream);
        publish(&stream, 1, -12.0);
        recorder.stop_collecting();
        recorder.stop_collecting();

        assert_eq!(recorder.state(), RecorderState::Idle);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_start_twice_keeps_one_subscription() {
        let stream = AnalysisStream::new();
        let mut recorder = SampleRecorder::new();
        recorder.start_collecting(&stream);
        recorder.start_collecting(&stream);
        assert_eq!(stream.subscriber_count(), 1);

        publish(&stream, 1, -12.0);
        recorder.stop_collecting();
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_toggle() {
        let stream = AnalysisStream::new();
        let mut recorder = SampleRecorder::new();
        assert_eq!(recorder.toggle(&stream), RecorderState::Recording);
        publish(&stream, 1, -3.0);
        assert_eq!(recorder.toggle(&stream), RecorderState::Idle);
        publish(&stream, 2, -3.0);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_restart_appends() {
        let stream = AnalysisStream::new();
        let mut recorder = SampleRecorder::new();

        recorder.start_collecting(&stream);
        publish(&stream, 1, -10.0);
        recorder.stop_collecting();

        recorder.start_collecting(&stream);
        publish(&stream, 2, -20.0);
        recorder.stop_collecting();

        let levels: Vec<f32> = recorder.data_points().iter().map(|p| p.decibels).collect();
        assert_eq!(levels, vec![-10.0, -20.0]);
    }

    #[test]
    fn test_clear() {
        let stream = AnalysisStream::new();
        let mut recorder = SampleRecorder::new();

        // Clearing an empty log is a no-op
        recorder.clear();
        assert!(recorder.is_empty());

        recorder.start_collecting(&stream);
        publish(&stream, 1, -10.0);
        recorder.stop_collecting();
        assert_eq!(recorder.len(), 1);

        recorder.clear();
        assert!(recorder.is_empty());
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = MemoryStore::new();
        let recorder = SampleRecorder::new();
        {
            let mut log = recorder.log.lock();
            log.push(DataPoint::new(ts(1_700_000_000), -42.5));
            log.push(DataPoint::new(
                ts(1_700_000_001).checked_add(jiff::SignedDuration::from_millis(250)).unwrap(),
                -160.0,
            ));
            log.push(DataPoint::new(ts(1_700_000_002), -17.375));
        }
        let original = recorder.data_points();

        assert_eq!(recorder.save(&store).unwrap(), 3);

        let restored = SampleRecorder::new();
        assert_eq!(restored.load(&store).unwrap(), 3);
        assert_eq!(restored.data_points(), original);
    }

    #[test]
    fn test_saved_timestamps_are_rfc3339() {
        let store = MemoryStore::new();
        let recorder = SampleRecorder::new();
        recorder.log.lock().push(DataPoint::new(ts(0), -60.0));
        recorder.save(&store).unwrap();

        let text = String::from_utf8(store.read(LOG_KEY).unwrap().unwrap()).unwrap();
        assert!(text.contains("\"1970-01-01T00:00:00Z\""), "got {}", text);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = std::env::temp_dir().join(format!("hark-recorder-{}", Uuid::new_v4()));
        let store = FileStore::new(&dir);

        let recorder = SampleRecorder::new();
        recorder.log.lock().push(DataPoint::new(ts(1_234_567_890), -33.0));
        recorder.save(&store).unwrap();

        let restored = SampleRecorder::new();
        restored.load(&store).unwrap();
        assert_eq!(restored.data_points(), recorder.data_points());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let recorder = SampleRecorder::new();
        recorder.log.lock().push(DataPoint::new(ts(1), -1.0));

        assert_eq!(recorder.load(&MemoryStore::new()).unwrap(), 0);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_load_corrupt_keeps_log() {
        let store = MemoryStore::new();
        store.write(LOG_KEY, b"{ not json").unwrap();

        let recorder = SampleRecorder::new();
        recorder.log.lock().push(DataPoint::new(ts(1), -1.0));
        let before = recorder.data_points();

        assert!(matches!(recorder.load(&store), Err(RecorderError::Corrupt(_))));
        assert_eq!(recorder.data_points(), before);
    }

    #[test]
    fn test_store_failures_are_reported() {
        let recorder = SampleRecorder::new();
        recorder.log.lock().push(DataPoint::new(ts(1), -1.0));
        let before = recorder.data_points();

        assert!(matches!(recorder.save(&BrokenStore), Err(RecorderError::Store(_))));
        assert!(matches!(recorder.load(&BrokenStore), Err(RecorderError::Store(_))));
        assert_eq!(recorder.data_points(), before);
    }

    #[test]
    fn test_autosave_persists_on_stop() {
        let store = Arc::new(MemoryStore::new());
        let stream = AnalysisStream::new();
        let mut recorder =
            SampleRecorder::new().with_autosave(store.clone(), Duration::from_secs(3600));

        recorder.start_collecting(&stream);
        publish(&stream, 1, -10.0);
        publish(&stream, 2, -11.0);
        recorder.stop_collecting();

        let restored = SampleRecorder::new();
        assert_eq!(restored.load(store.as_ref()).unwrap(), 2);
        assert_eq!(restored.data_points(), recorder.data_points());
    }

    #[test]
    fn test_autosave_failure_does_not_stop_recording() {
        let stream = AnalysisStream::new();
        let mut recorder =
            SampleRecorder::new().with_autosave(Arc::new(BrokenStore), Duration::ZERO);

        recorder.start_collecting(&stream);
        publish(&stream, 1, -10.0);
        publish(&stream, 2, -11.0);
        recorder.stop_collecting();

        assert_eq!(recorder.len(), 2);
    }
}
