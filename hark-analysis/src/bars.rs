//! Display binning: fit a spectrum of any length into a fixed number of bars

use crate::error::AnalysisError;
use crate::spectrum::{SpectrumFrame, SPECTRUM_FLOOR_DB};

/// Bar count used when the display does not ask for one
pub const DEFAULT_BAR_COUNT: usize = 32;

/// Fixed-length bar values in dB, replaced wholesale on every frame
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayBars {
    values: Box<[f32]>,
}

impl DisplayBars {
    /// `count` bars at the spectrum floor
    pub fn silence(count: usize) -> Self {
        Self {
            values: vec![SPECTRUM_FLOOR_DB; count].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Averages contiguous spectrum bins into a fixed number of bars
#[derive(Debug, Clone, Copy)]
pub struct DisplayBinner {
    bar_count: usize,
}

impl Default for DisplayBinner {
    fn default() -> Self {
        Self {
            bar_count: DEFAULT_BAR_COUNT,
        }
    }
}

impl DisplayBinner {
    pub fn new(bar_count: usize) -> Result<Self, AnalysisError> {
        if bar_count == 0 {
            return Err(AnalysisError::ZeroBarCount);
        }
        Ok(Self { bar_count })
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    /// Bin a spectrum frame
    pub fn bin(&self, frame: &SpectrumFrame) -> DisplayBars {
        self.bin_values(frame.bins())
    }

    /// Bin raw dB values
    ///
    /// A spectrum no longer than the bar count is passed through and padded
    /// with silence. A longer one is split at `floor(i * len / bars)` and each
    /// range averaged.
    pub fn bin_values(&self, spectrum: &[f32]) -> DisplayBars {
        let bars = self.bar_count;
        let len = spectrum.len();

        if len == 0 {
            return DisplayBars::silence(bars);
        }

        let mut values = Vec::with_capacity(bars);
        if len <= bars {
            values.extend_from_slice(spectrum);
            values.resize(bars, SPECTRUM_FLOOR_DB);
        } else {
            for i in 0..bars {
                let (start, end) = Self::bar_range(i, len, bars);
                let value = if start < end {
                    let sum: f32 = spectrum[start..end].iter().sum();
                    sum / (end - start) as f32
                } else {
                    SPECTRUM_FLOOR_DB
                };
                values.push(value);
            }
        }

        DisplayBars {
            values: values.into_boxed_slice(),
        }
    }

    /// Source bin range `[start, end)` covered by bar `index`
    #[inline]
    fn bar_range(index: usize, len: usize, bars: usize) -> (usize, usize) {
        (index * len / bars, (index + 1) * len / bars)
    }
}

/// Attack/release ballistics for successive bar sets
///
/// Bars jump up quickly and fall back slowly, which reads better on screen
/// than raw per-block values. Kept apart from [`DisplayBinner`] so binning
/// itself stays a pure function.
#[derive(Debug, Clone)]
pub struct BarSmoother {
    attack: f32,
    release: f32,
    current: Vec<f32>,
}

impl BarSmoother {
    /// `attack` and `release` are the fraction of the previous value kept
    /// per update when rising and falling (0.0 = no smoothing)
    pub fn new(bar_count: usize, attack: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(0.0, 1.0),
            release: release.clamp(0.0, 1.0),
            current: vec![SPECTRUM_FLOOR_DB; bar_count],
        }
    }

    /// Fold in a new set of bars and return the smoothed result
    pub fn update(&mut self, bars: &DisplayBars) -> DisplayBars {
        if self.current.len() != bars.len() {
            self.current = bars.values().to_vec();
        } else {
            for (cur, &target) in self.current.iter_mut().zip(bars.values()) {
                let keep = if target > *cur { self.attack } else { self.release };
                *cur = *cur * keep + target * (1.0 - keep);
            }
        }
        DisplayBars {
            values: self.current.clone().into_boxed_slice(),
        }
    }

    pub fn reset(&mut self) {
        self.current.fill(SPECTRUM_FLOOR_DB);
    }
}
