//! FFT-based spectrum analyzer for real-time visualization
//!
//! All transform resources (FFT plan, window table, scratch buffers) are
//! built once when the analyzer is created and reused for every block, so the
//! per-block path only allocates the shared output frame.

use crate::block::SampleBlock;
use crate::error::AnalysisError;
use jiff::Timestamp;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Lowest value a spectrum bin can take
pub const SPECTRUM_FLOOR_DB: f32 = -100.0;
/// Highest value a spectrum bin can take
pub const SPECTRUM_CEILING_DB: f32 = 0.0;
/// Magnitudes at or below this are reported as the floor
const MAGNITUDE_EPSILON: f32 = 1e-6;

/// Magnitude spectrum of one block, in dB
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// Timestamp of the originating block
    pub timestamp: Timestamp,
    sample_rate: u32,
    fft_size: usize,
    bins: Arc<[f32]>,
}

/// Loudest bin of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    pub bin: usize,
    pub frequency_hz: f32,
    pub decibels: f32,
}

impl SpectrumFrame {
    /// Frame of `fft_size / 2` floor values
    pub fn silence(fft_size: usize, sample_rate: u32, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            sample_rate,
            fft_size,
            bins: vec![SPECTRUM_FLOOR_DB; fft_size / 2].into(),
        }
    }

    /// Per-bin magnitudes in ascending frequency order
    #[inline]
    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Width of one bin in Hz
    pub fn bin_width_hz(&self) -> f32 {
        if self.fft_size == 0 {
            return 0.0;
        }
        self.sample_rate as f32 / self.fft_size as f32
    }

    /// Center frequency of a bin in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width_hz()
    }

    /// Loudest bin, or `None` for an empty frame
    ///
    /// Ties resolve to the lowest frequency.
    pub fn peak(&self) -> Option<SpectralPeak> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &db) in self.bins.iter().enumerate() {
            match best {
                Some((_, best_db)) if db <= best_db => {}
                _ => best = Some((i, db)),
            }
        }
        best.map(|(bin, decibels)| SpectralPeak {
            bin,
            frequency_hz: self.bin_frequency(bin),
            decibels,
        })
    }
}

/// Whether the analyzer produces real spectra
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    /// Transform resources are set up
    Ready,
    /// Setup failed; every frame is silence
    Disabled,
}

/// Reusable FFT resources, owned by exactly one analyzer
pub(crate) struct TransformState {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    /// FFT input/output buffer, length `fft_size`
    buffer: Vec<Complex<f32>>,
    /// Scratch required by the in-place FFT
    scratch: Vec<Complex<f32>>,
    /// Hann table for the current block length, capacity `fft_size`
    window: Vec<f32>,
    /// Last computed spectrum, length `fft_size / 2`
    magnitudes: Vec<f32>,
}

impl TransformState {
    /// Plan the FFT and allocate every buffer the hot path will need
    pub(crate) fn new(fft_size: usize) -> Result<Self, AnalysisError> {
        validate_fft_size(fft_size)?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let buffer = try_filled(fft_size, Complex::new(0.0, 0.0))?;
        let scratch = try_filled(fft.get_inplace_scratch_len(), Complex::new(0.0, 0.0))?;
        let magnitudes = try_filled(fft_size / 2, SPECTRUM_FLOOR_DB)?;

        let mut window = Vec::new();
        window
            .try_reserve_exact(fft_size)
            .map_err(|_| AnalysisError::TransformSetup(fft_size))?;
        fill_hann(&mut window, fft_size);

        Ok(Self {
            fft_size,
            fft,
            buffer,
            scratch,
            window,
            magnitudes,
        })
    }

    /// Window, transform and convert one block into `self.magnitudes`
    fn transform(&mut self, samples: &[f32]) {
        let sample_count = samples.len().min(self.fft_size);

        // Capacity is fft_size, so rebuilding the table never reallocates
        if self.window.len() != sample_count {
            fill_hann(&mut self.window, sample_count);
        }

        for ((slot, &sample), &w) in self
            .buffer
            .iter_mut()
            .zip(samples.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        // Zero pad the rest
        for slot in self.buffer.iter_mut().skip(sample_count) {
            *slot = Complex::new(0.0, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let normalization = self.fft_size as f32 / 2.0;
        for (out, bin) in self.magnitudes.iter_mut().zip(self.buffer.iter()) {
            *out = magnitude_to_db(bin.norm(), normalization);
        }
    }
}

/// Real-time FFT spectrum analyzer
pub struct SpectrumAnalyzer {
    fft_size: usize,
    /// `None` once setup has failed
    transform: Option<TransformState>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for a fixed transform size
    ///
    /// An invalid size is rejected here. A failure to set up the transform
    /// itself does not fail construction: the analyzer comes up Disabled and
    /// produces silence frames.
    pub fn new(fft_size: usize) -> Result<Self, AnalysisError> {
        validate_fft_size(fft_size)?;
        Ok(Self::from_setup(fft_size, TransformState::new(fft_size)))
    }

    /// An analyzer with no transform resources, producing only silence frames
    pub fn disabled(fft_size: usize) -> Self {
        Self::from_setup(fft_size, Err(AnalysisError::TransformSetup(fft_size)))
    }

    fn from_setup(fft_size: usize, setup: Result<TransformState, AnalysisError>) -> Self {
        let transform = match setup {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(error = %e, fft_size, "spectrum analysis disabled");
                None
            }
        };
        Self {
            fft_size,
            transform,
        }
    }

    pub fn state(&self) -> AnalyzerState {
        if self.transform.is_some() {
            AnalyzerState::Ready
        } else {
            AnalyzerState::Disabled
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins in every frame this analyzer produces
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyze one block
    ///
    /// Blocks shorter than the FFT size are zero padded, longer ones are
    /// truncated.
    pub fn analyze(&mut self, block: &SampleBlock<'_>) -> SpectrumFrame {
        match self.transform.as_mut() {
            Some(state) => {
                state.transform(block.samples());
                SpectrumFrame {
                    timestamp: block.timestamp(),
                    sample_rate: block.sample_rate(),
                    fft_size: self.fft_size,
                    bins: Arc::from(state.magnitudes.as_slice()),
                }
            }
            None => SpectrumFrame::silence(self.fft_size, block.sample_rate(), block.timestamp()),
        }
    }
}

fn validate_fft_size(fft_size: usize) -> Result<(), AnalysisError> {
    if fft_size < 2 || !fft_size.is_power_of_two() {
        return Err(AnalysisError::InvalidFftSize(fft_size));
    }
    Ok(())
}

fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>, AnalysisError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| AnalysisError::TransformSetup(len))?;
    v.resize(len, value);
    Ok(v)
}

/// Replace `window` with a symmetric Hann table of `len` points
fn fill_hann(window: &mut Vec<f32>, len: usize) {
    window.clear();
    if len <= 1 {
        if len == 1 {
            window.push(1.0);
        }
        return;
    }
    let denom = (len - 1) as f32;
    window.extend((0..len).map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos())));
}

/// Convert an FFT magnitude to clamped dB
#[inline]
fn magnitude_to_db(magnitude: f32, normalization: f32) -> f32 {
    if magnitude.is_nan() || magnitude <= MAGNITUDE_EPSILON {
        return SPECTRUM_FLOOR_DB;
    }
    (20.0 * (magnitude / normalization).log10()).clamp(SPECTRUM_FLOOR_DB, SPECTRUM_CEILING_DB)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn analyze(analyzer: &mut SpectrumAnalyzer, samples: &[f32]) -> SpectrumFrame {
        analyzer.analyze(&SampleBlock::new(samples, SAMPLE_RATE, Timestamp::UNIX_EPOCH))
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        for size in [0usize, 1, 3, 1000, 1025] {
            assert_eq!(
                SpectrumAnalyzer::new(size).err(),
                Some(AnalysisError::InvalidFftSize(size)),
                "size {} should be rejected",
                size
            );
        }
        assert!(SpectrumAnalyzer::new(1024).is_ok());
    }

    #[test]
    fn test_silence_frame() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        let silence = vec![0.0f32; 1024];

        // Warm-up pass, then the frame under test
        analyze(&mut analyzer, &silence);
        let frame = analyze(&mut analyzer, &silence);

        assert_eq!(frame.len(), 512);
        assert!(frame.bins().iter().all(|&db| db == SPECTRUM_FLOOR_DB));
    }

    #[test]
    fn test_sine_peak_at_expected_bin() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        let bin_width = SAMPLE_RATE as f32 / 1024.0;

        for freq in [bin_width * 64.0, 1000.0, 5000.0] {
            let frame = analyze(&mut analyzer, &sine(freq, 0.8, 1024));
            let peak = frame.peak().unwrap();
            let expected = (freq / bin_width).round() as i64;
            assert!(
                (peak.bin as i64 - expected).abs() <= 1,
                "{} Hz should peak near bin {}, got {}",
                freq,
                expected,
                peak.bin
            );
            assert!((peak.frequency_hz - freq).abs() <= bin_width * 1.5);
        }
    }

    #[test]
    fn test_peak_level_tracks_amplitude() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        let freq = SAMPLE_RATE as f32 / 1024.0 * 64.0;

        let loud = analyze(&mut analyzer, &sine(freq, 1.0, 1024)).peak().unwrap();
        let quiet = analyze(&mut analyzer, &sine(freq, 0.1, 1024)).peak().unwrap();

        assert_eq!(loud.bin, quiet.bin);
        assert!(loud.decibels > quiet.decibels);
        // Hann coherent gain of 0.5 against a T/2 reference puts a
        // full-scale bin-centered sine near -6 dB
        assert!(
            (loud.decibels - (-6.0)).abs() < 1.0,
            "Full-scale sine peak should be near -6 dB, got {}",
            loud.decibels
        );
        assert!(
            (loud.decibels - quiet.decibels - 20.0).abs() < 0.5,
            "A 10x amplitude drop should cost about 20 dB, got {} vs {}",
            loud.decibels,
            quiet.decibels
        );
    }

    #[test]
    fn test_values_stay_in_range() {
        let mut analyzer = SpectrumAnalyzer::new(256).unwrap();
        // Heavy clipping square wave
        let samples: Vec<f32> = (0..256).map(|i| if i % 8 < 4 { 50.0 } else { -50.0 }).collect();
        let frame = analyze(&mut analyzer, &samples);
        assert!(frame
            .bins()
            .iter()
            .all(|&db| (SPECTRUM_FLOOR_DB..=SPECTRUM_CEILING_DB).contains(&db)));
    }

    #[test]
    fn test_nan_input_is_floor() {
        let mut analyzer = SpectrumAnalyzer::new(64).unwrap();
        let samples = vec![f32::NAN; 64];
        let frame = analyze(&mut analyzer, &samples);
        assert!(frame.bins().iter().all(|&db| db == SPECTRUM_FLOOR_DB));
    }

    #[test]
    fn test_short_and_long_blocks_keep_frame_length() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        let freq = 2000.0;

        let short = analyze(&mut analyzer, &sine(freq, 0.5, 512));
        let long = analyze(&mut analyzer, &sine(freq, 0.5, 4096));
        let empty = analyze(&mut analyzer, &[]);

        assert_eq!(short.len(), 512);
        assert_eq!(long.len(), 512);
        assert_eq!(empty.len(), 512);
        assert!(empty.bins().iter().all(|&db| db == SPECTRUM_FLOOR_DB));

        let bin_width = SAMPLE_RATE as f32 / 1024.0;
        let expected = (freq / bin_width).round() as i64;
        assert!((short.peak().unwrap().bin as i64 - expected).abs() <= 1);
        assert!((long.peak().unwrap().bin as i64 - expected).abs() <= 1);
    }

    #[test]
    fn test_window_rebuilt_after_length_change() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        let full = sine(3000.0, 0.5, 1024);

        let first = analyze(&mut analyzer, &full);
        analyze(&mut analyzer, &full[..300]);
        let again = analyze(&mut analyzer, &full);

        assert_eq!(first.bins(), again.bins());
    }

    #[test]
    fn test_hann_table_is_symmetric() {
        let mut window = Vec::with_capacity(16);
        fill_hann(&mut window, 9);
        assert_eq!(window.len(), 9);
        assert!(window[0].abs() < 1e-6);
        assert!(window[8].abs() < 1e-6);
        assert!((window[4] - 1.0).abs() < 1e-6);
        for i in 0..9 {
            assert!((window[i] - window[8 - i]).abs() < 1e-6);
        }

        fill_hann(&mut window, 1);
        assert_eq!(window, vec![1.0]);

        fill_hann(&mut window, 0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_empty_block_after_full_block_is_floor() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        let full = sine(1000.0, 0.5, 1024);

        analyze(&mut analyzer, &full);
        let empty = analyze(&mut analyzer, &[]);
        assert_eq!(empty.len(), 512);
        assert!(empty.bins().iter().all(|&db| db == SPECTRUM_FLOOR_DB));

        // The window comes back for the next real block
        let again = analyze(&mut analyzer, &full);
        assert!(again.peak().unwrap().decibels > -20.0);
    }

    #[test]
    fn test_disabled_analyzer_emits_silence() {
        let mut analyzer = SpectrumAnalyzer::disabled(1024);
        assert_eq!(analyzer.state(), AnalyzerState::Disabled);

        let frame = analyze(&mut analyzer, &sine(1000.0, 1.0, 1024));
        assert_eq!(frame.len(), 512);
        assert!(frame.bins().iter().all(|&db| db == SPECTRUM_FLOOR_DB));
    }

    #[test]
    fn test_frame_metadata() {
        let mut analyzer = SpectrumAnalyzer::new(2048).unwrap();
        assert_eq!(analyzer.state(), AnalyzerState::Ready);
        assert_eq!(analyzer.bin_count(), 1024);

        let ts = Timestamp::from_second(1_700_000_000).unwrap();
        let samples = vec![0.0f32; 2048];
        let frame = analyzer.analyze(&SampleBlock::new(&samples, 48000, ts));

        assert_eq!(frame.timestamp, ts);
        assert_eq!(frame.sample_rate(), 48000);
        assert_eq!(frame.fft_size(), 2048);
        assert!((frame.bin_width_hz() - 23.4375).abs() < 1e-4);
        assert!((frame.bin_frequency(10) - 234.375).abs() < 1e-3);
    }
}
