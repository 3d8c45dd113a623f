//! Signal analysis for Hark
//!
//! Turns sample blocks into a level reading and a dB spectrum, and fits
//! spectra into a fixed number of display bars.

mod bars;
mod block;
mod error;
mod level;
mod spectrum;

pub use bars::{BarSmoother, DisplayBars, DisplayBinner, DEFAULT_BAR_COUNT};
pub use block::SampleBlock;
pub use error::AnalysisError;
pub use level::{LevelMeter, LevelSample, LEVEL_FLOOR_DB};
pub use spectrum::{
    AnalyzerState, SpectralPeak, SpectrumAnalyzer, SpectrumFrame, SPECTRUM_CEILING_DB,
    SPECTRUM_FLOOR_DB,
};
