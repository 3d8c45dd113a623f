use hark_analysis::AnalysisError;
use thiserror::Error;

/// Errors that can occur while opening or running microphone capture
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No audio input device found")]
    NoInputDevice,
    #[error("Failed to get input config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("Unsupported sample format {0}, expected f32")]
    UnsupportedFormat(String),
    #[error("Failed to create input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] AnalysisError),
}
