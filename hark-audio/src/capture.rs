//! Microphone capture via cpal
//!
//! The analysis pipeline is moved into the input callback and lives there
//! until the platform stream is dropped, so its transform buffers can never
//! be freed while a callback is still using them.

use crate::error::CaptureError;
use crate::pipeline::{AnalysisPipeline, PipelineConfig};
use crate::stream::AnalysisStream;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Block and transform sizes requested for capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub block_size: usize,
    pub fft_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            block_size: defaults.block_size,
            fft_size: defaults.fft_size,
        }
    }
}

/// A running input stream feeding an [`AnalysisStream`]
pub struct CaptureSession {
    stream: cpal::Stream,
    running: Arc<AtomicBool>,
    config: PipelineConfig,
    channels: u16,
    device_name: String,
}

impl CaptureSession {
    /// Open the default input device and start publishing analysis frames
    pub fn start(config: CaptureConfig, analysis: AnalysisStream) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        let supported = device.default_input_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "{:?}",
                supported.sample_format()
            )));
        }

        let channels = supported.channels();
        let pipeline_config = PipelineConfig {
            sample_rate: supported.sample_rate().0,
            block_size: config.block_size,
            fft_size: config.fft_size,
        };

        // All expensive setup happens here, before the callback exists
        let mut pipeline = AnalysisPipeline::new(pipeline_config, analysis)?;
        let running = pipeline.running_flag();
        let interleave = channels as usize;

        let stream = device.build_input_stream(
            &supported.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                pipeline.push_samples(data, interleave);
            },
            |err| {
                tracing::error!(error = %err, "audio input stream error");
            },
            None,
        )?;
        stream.play()?;

        tracing::info!(
            device = %device_name,
            sample_rate = pipeline_config.sample_rate,
            channels,
            block_size = pipeline_config.block_size,
            fft_size = pipeline_config.fft_size,
            "capture started"
        );

        Ok(Self {
            stream,
            running,
            config: pipeline_config,
            channels,
            device_name,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop publishing, then tear down the platform stream
    ///
    /// The running flag takes effect at the next block boundary even if the
    /// platform delivers one more callback before the pause lands.
    pub fn stop(self) {
        self.running.store(false, Ordering::Release);
        if let Err(e) = self.stream.pause() {
            tracing::warn!(error = %e, "failed to pause input stream");
        }
        drop(self.stream);
        tracing::info!("capture stopped");
    }
}
