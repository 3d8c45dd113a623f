//! Capture pipeline for Hark
//!
//! This crate moves audio from the microphone to consumers:
//! - Pipeline: block assembly, level metering and spectrum analysis in the
//!   capture callback
//! - Stream: non-blocking publish/subscribe handoff to consumer threads
//! - Capture: cpal input session that drives the pipeline

mod capture;
mod error;
mod pipeline;
mod stream;

pub use capture::{CaptureConfig, CaptureSession};
pub use error::CaptureError;
pub use pipeline::{AnalysisPipeline, BlockAssembler, PipelineConfig};
pub use stream::{AnalysisFrame, AnalysisStream, SubscriberId, Subscription};
