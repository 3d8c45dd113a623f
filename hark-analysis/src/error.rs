use thiserror::Error;

/// Errors raised while configuring analysis components
///
/// Per-block analysis never fails; everything here is reported at
/// construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("FFT size must be a non-zero power of two, got {0}")]
    InvalidFftSize(usize),
    #[error("Bar count must be at least 1")]
    ZeroBarCount,
    #[error("Block size must be at least 1")]
    ZeroBlockSize,
    #[error("Sample rate must be at least 1 Hz")]
    ZeroSampleRate,
    #[error("Could not allocate transform buffers for FFT size {0}")]
    TransformSetup(usize),
}
