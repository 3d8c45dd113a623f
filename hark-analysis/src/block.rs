//! Sample blocks handed from the capture callback to the analyzers

use jiff::Timestamp;

/// One fixed-size chunk of mono samples
///
/// Borrows its samples from the buffer that assembled it, so building a
/// block in the audio callback never allocates.
#[derive(Debug, Clone, Copy)]
pub struct SampleBlock<'a> {
    samples: &'a [f32],
    sample_rate: u32,
    timestamp: Timestamp,
}

impl<'a> SampleBlock<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32, timestamp: Timestamp) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp,
        }
    }

    #[inline]
    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Capture time of the first sample in the block
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Real-time duration covered by the block, in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
