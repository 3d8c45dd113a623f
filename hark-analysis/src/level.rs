//! Block loudness meter
//!
//! Reduces a block to a single power reading in dBFS. The meter is a pure
//! function of its input: no ballistics, no history.

use crate::block::SampleBlock;
use jiff::Timestamp;

/// Level reported for silence and for any degenerate power value
pub const LEVEL_FLOOR_DB: f32 = -160.0;

/// Decibel reading for one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSample {
    /// Power in dBFS, never below the meter floor
    pub decibels: f32,
    /// Timestamp of the originating block
    pub timestamp: Timestamp,
}

/// Mean-square level meter
#[derive(Debug, Clone, Copy)]
pub struct LevelMeter {
    floor_db: f32,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            floor_db: LEVEL_FLOOR_DB,
        }
    }

    /// Meter with a custom silence floor
    pub fn with_floor(floor_db: f32) -> Self {
        Self { floor_db }
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Compute the level of a block
    pub fn compute_level(&self, block: &SampleBlock<'_>) -> LevelSample {
        LevelSample {
            decibels: self.power_to_db(Self::mean_square(block.samples())),
            timestamp: block.timestamp(),
        }
    }

    /// Mean of the squared samples, accumulated in f64
    #[inline]
    pub fn mean_square(samples: &[f32]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        sum / samples.len() as f64
    }

    /// Convert a power value to dB, clamping degenerate results to the floor
    #[inline]
    fn power_to_db(&self, power: f64) -> f32 {
        if power.is_nan() || power <= 0.0 {
            return self.floor_db;
        }
        let db = (10.0 * power.log10()) as f32;
        if db.is_finite() {
            db.max(self.floor_db)
        } else {
            self.floor_db
        }
    }
}
