use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{MixerError, Result};

/// Largest bin count an analyzer accepts; the FFT window is twice this.
pub const MAX_BIN_COUNT: usize = 1 << 16;

/// Ordered magnitudes for one snapshot, nominally normalized to `[0, 1]`.
///
/// The length travels with the data; consumers decide whether it matches
/// what they expect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSample(Vec<f32>);

impl SpectrumSample {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// A sample with no data, returned when nothing has been analysed yet.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for SpectrumSample {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Windowed real FFT that turns a block of `2 * bin_count` samples into a
/// [`SpectrumSample`] of `bin_count` log-scaled magnitudes.
pub struct SpectrumAnalyzer {
    bin_count: usize,
    floor_db: f32,
    window: Vec<f32>,
    window_gain: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
}

impl SpectrumAnalyzer {
    pub fn new(bin_count: usize, floor_db: f32) -> Result<Self> {
        if bin_count == 0 {
            return Err(MixerError::InvalidInput("analyzer requires at least one bin"));
        }
        if bin_count > MAX_BIN_COUNT {
            return Err(MixerError::InvalidInput("analyzer bin count exceeds 65536"));
        }
        if !(floor_db.is_finite() && floor_db < 0.0) {
            return Err(MixerError::InvalidInput("analyzer floor must be a negative dB value"));
        }

        let size = bin_count * 2;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let window: Vec<f32> = (0..size).map(|i| hann_value(i, size)).collect();
        let window_gain = window.iter().sum::<f32>().max(f32::EPSILON);

        Ok(Self {
            bin_count,
            floor_db,
            window,
            window_gain,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Number of time-domain samples expected by [`SpectrumAnalyzer::analyze`].
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn analyze(&mut self, block: &[f32]) -> Result<SpectrumSample> {
        if block.len() != self.window.len() {
            return Err(MixerError::InvalidInput(
                "analysis block length must equal twice the bin count",
            ));
        }

        for ((slot, value), w) in self.input.iter_mut().zip(block).zip(&self.window) {
            *slot = *value * *w;
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        // The real FFT yields bin_count + 1 bins; the Nyquist bin is dropped
        // so the sample length equals the bar count.
        let floor = self.floor_db;
        let magnitudes = self.spectrum[..self.bin_count]
            .iter()
            .map(|bin| {
                let amplitude = 2.0 * bin.norm() / self.window_gain;
                normalize_db(amplitude, floor)
            })
            .collect();

        Ok(SpectrumSample(magnitudes))
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("bin_count", &self.bin_count)
            .field("floor_db", &self.floor_db)
            .finish()
    }
}

/// Maps a linear amplitude onto `[0, 1]` where 0 dBFS is full scale and
/// `floor_db` is empty.
fn normalize_db(amplitude: f32, floor_db: f32) -> f32 {
    if amplitude <= 0.0 || !amplitude.is_finite() {
        return 0.0;
    }
    let db = 20.0 * amplitude.log10();
    ((db - floor_db) / -floor_db).clamp(0.0, 1.0)
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
