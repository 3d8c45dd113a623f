//! Level log for Hark - recording, persistence, and configuration

mod config;
mod recorder;
mod store;

pub use config::Config;
pub use recorder::{
    DataPoint, RecorderError, RecorderState, SampleRecorder, DEFAULT_QUEUE_CAPACITY, LOG_KEY,
};
pub use store::{FileStore, MemoryStore, SampleStore, StoreError};
