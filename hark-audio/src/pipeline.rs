//! Analysis pipeline - runs inside the capture callback
//!
//! Assembles callback buffers into fixed-size blocks, measures and
//! transforms each block, and publishes the result on the analysis stream.

use crate::stream::AnalysisStream;
use hark_analysis::{
    AnalysisError, AnalyzerState, LevelMeter, SampleBlock, SpectrumAnalyzer,
};
use jiff::{SignedDuration, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fixed parameters of a running pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    /// Samples per block
    pub block_size: usize,
    /// Spectrum transform size, a power of two
    pub fft_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 1024,
            fft_size: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.sample_rate == 0 {
            return Err(AnalysisError::ZeroSampleRate);
        }
        if self.block_size == 0 {
            return Err(AnalysisError::ZeroBlockSize);
        }
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return Err(AnalysisError::InvalidFftSize(self.fft_size));
        }
        Ok(())
    }

    /// Real-time budget for analyzing one block, in seconds
    pub fn block_duration_secs(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }
}

/// Collects interleaved callback buffers into fixed-size mono blocks
///
/// Only the first channel of interleaved input is kept. Timestamps are
/// derived from the sample count since `origin`, so they are monotonic and
/// spaced exactly one block apart.
pub struct BlockAssembler {
    buffer: Vec<f32>,
    filled: usize,
    sample_rate: u32,
    origin: Timestamp,
    samples_emitted: u64,
}

impl BlockAssembler {
    pub fn new(block_size: usize, sample_rate: u32, origin: Timestamp) -> Self {
        Self {
            buffer: vec![0.0; block_size],
            filled: 0,
            sample_rate,
            origin,
            samples_emitted: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.buffer.len()
    }

    /// Samples waiting for the current block to fill up
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Feed interleaved samples, calling `on_block` for every completed block
    pub fn push_interleaved<F>(&mut self, data: &[f32], channels: usize, mut on_block: F)
    where
        F: FnMut(SampleBlock<'_>),
    {
        if self.buffer.is_empty() {
            return;
        }
        for &sample in data.iter().step_by(channels.max(1)) {
            self.buffer[self.filled] = sample;
            self.filled += 1;

            if self.filled == self.buffer.len() {
                let timestamp = self.block_timestamp();
                on_block(SampleBlock::new(&self.buffer, self.sample_rate, timestamp));
                self.samples_emitted += self.buffer.len() as u64;
                self.filled = 0;
            }
        }
    }

    /// Drop any partial block
    pub fn reset(&mut self) {
        self.filled = 0;
    }

    fn block_timestamp(&self) -> Timestamp {
        if self.sample_rate == 0 {
            return self.origin;
        }
        let nanos = self.samples_emitted as u128 * 1_000_000_000 / self.sample_rate as u128;
        let offset = SignedDuration::from_nanos(i64::try_from(nanos).unwrap_or(i64::MAX));
        self.origin.checked_add(offset).unwrap_or(self.origin)
    }
}

/// Level meter + spectrum analyzer + stream, owned by the capture callback
pub struct AnalysisPipeline {
    config: PipelineConfig,
    meter: LevelMeter,
    analyzer: SpectrumAnalyzer,
    assembler: BlockAssembler,
    stream: AnalysisStream,
    running: Arc<AtomicBool>,
    blocks_processed: u64,
}

impl AnalysisPipeline {
    /// Build a pipeline whose block timestamps start now
    pub fn new(config: PipelineConfig, stream: AnalysisStream) -> Result<Self, AnalysisError> {
        Self::with_origin(config, stream, Timestamp::now())
    }

    /// Build a pipeline whose first block is stamped `origin`
    pub fn with_origin(
        config: PipelineConfig,
        stream: AnalysisStream,
        origin: Timestamp,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        let analyzer = SpectrumAnalyzer::new(config.fft_size)?;

        Ok(Self {
            config,
            meter: LevelMeter::new(),
            analyzer,
            assembler: BlockAssembler::new(config.block_size, config.sample_rate, origin),
            stream,
            running: Arc::new(AtomicBool::new(true)),
            blocks_processed: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyzer_state(&self) -> AnalyzerState {
        self.analyzer.state()
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    /// Flag checked at every block boundary; clearing it stops publication
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Analyze and publish one complete block
    ///
    /// Returns the published sequence number, or `None` once stopped.
    pub fn process_block(&mut self, block: &SampleBlock<'_>) -> Option<u64> {
        let sequence = analyze_and_publish(
            &self.meter,
            &mut self.analyzer,
            &self.stream,
            &self.running,
            block,
        )?;
        self.blocks_processed += 1;
        Some(sequence)
    }

    /// Feed a raw callback buffer; returns how many blocks were published
    pub fn push_samples(&mut self, data: &[f32], channels: usize) -> usize {
        if !self.running.load(Ordering::Acquire) {
            return 0;
        }

        let Self {
            meter,
            analyzer,
            assembler,
            stream,
            running,
            ..
        } = &mut *self;

        let mut published = 0;
        assembler.push_interleaved(data, channels, |block| {
            if analyze_and_publish(meter, &mut *analyzer, stream, running, &block).is_some() {
                published += 1;
            }
        });
        self.blocks_processed += published as u64;
        published
    }
}

#[inline]
fn analyze_and_publish(
    meter: &LevelMeter,
    analyzer: &mut SpectrumAnalyzer,
    stream: &AnalysisStream,
    running: &AtomicBool,
    block: &SampleBlock<'_>,
) -> Option<u64> {
    if !running.load(Ordering::Acquire) {
        return None;
    }
    let level = meter.compute_level(block);
    let spectrum = analyzer.analyze(block);
    Some(stream.publish(level, spectrum))
}
