use std::{f32::consts::PI, fmt};

use serde::{Deserialize, Serialize};

/// The two inputs blended by the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Drums,
    Guitar,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Drums => "Drums",
            Source::Guitar => "Guitar",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized volume multiplier in `[0.0, 1.0]`.
///
/// The constructors are the only way to build a level, so anything holding a
/// `GainLevel` can forward it without checking the range again.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct GainLevel(f32);

impl GainLevel {
    pub const SILENT: GainLevel = GainLevel(0.0);
    pub const UNITY: GainLevel = GainLevel(1.0);

    /// Returns `None` for values outside `[0, 1]` or NaN.
    pub fn new(value: f32) -> Option<Self> {
        (0.0..=1.0).contains(&value).then_some(Self(value))
    }

    /// Clamps into range; NaN becomes silence.
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            Self::SILENT
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for GainLevel {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Deterministic audio generator addressed by absolute frame index, so a
/// block can be rendered for any playhead position.
pub trait Signal: Send {
    fn render(&self, start_frame: u64, out: &mut [f32]);
}

/// Four-on-the-floor kick with an off-beat hat, 120 BPM.
#[derive(Debug, Clone)]
pub struct DrumLoop {
    sample_rate: f32,
    beat_frames: u64,
}

impl DrumLoop {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            beat_frames: (sample_rate as u64 / 2).max(1),
        }
    }

    fn sample(&self, frame: u64) -> f32 {
        let beat_pos = frame % self.beat_frames;
        let t = beat_pos as f32 / self.sample_rate;
        // Kick: pitch sweeps from 150 Hz down towards 50 Hz.
        let kick_freq = 50.0 + 100.0 * (-t * 30.0).exp();
        let kick = (2.0 * PI * kick_freq * t).sin() * (-t * 8.0).exp();

        let half = self.beat_frames / 2;
        let hat = if beat_pos >= half {
            let th = (beat_pos - half) as f32 / self.sample_rate;
            let metallic = (2.0 * PI * 6_250.0 * th).sin()
                + (2.0 * PI * 8_410.0 * th).sin()
                + (2.0 * PI * 10_150.0 * th).sin();
            metallic * 0.1 * (-th * 60.0).exp()
        } else {
            0.0
        };

        (kick * 0.8 + hat).clamp(-1.0, 1.0)
    }
}

impl Signal for DrumLoop {
    fn render(&self, start_frame: u64, out: &mut [f32]) {
        for (offset, value) in out.iter_mut().enumerate() {
            *value = self.sample(start_frame + offset as u64);
        }
    }
}

/// Plucked-string riff cycling through a short phrase of notes.
#[derive(Debug, Clone)]
pub struct GuitarRiff {
    sample_rate: f32,
    note_frames: u64,
    notes_hz: Vec<f32>,
}

impl GuitarRiff {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            note_frames: (sample_rate as u64 / 4).max(1),
            // G3 B3 D4 G4 D4 B3
            notes_hz: vec![196.0, 246.94, 293.66, 392.0, 293.66, 246.94],
        }
    }

    fn sample(&self, frame: u64) -> f32 {
        let note_index = (frame / self.note_frames) as usize % self.notes_hz.len();
        let fundamental = self.notes_hz[note_index];
        let t = (frame % self.note_frames) as f32 / self.sample_rate;

        let mut value = 0.0;
        for harmonic in 1..=6 {
            let h = harmonic as f32;
            let freq = fundamental * h;
            if freq >= self.sample_rate * 0.5 {
                break;
            }
            // Upper partials fade faster than the fundamental.
            value += (2.0 * PI * freq * t).sin() * (-t * 3.0 * h).exp() / h;
        }
        (value * 0.5).clamp(-1.0, 1.0)
    }
}

impl Signal for GuitarRiff {
    fn render(&self, start_frame: u64, out: &mut [f32]) {
        for (offset, value) in out.iter_mut().enumerate() {
            *value = self.sample(start_frame + offset as u64);
        }
    }
}

/// Sums both sources with their gains and hard-clips the result to ±1.
pub fn mix_into(
    out: &mut [f32],
    drums: &[f32],
    guitar: &[f32],
    drum_gain: GainLevel,
    guitar_gain: GainLevel,
) {
    for (i, value) in out.iter_mut().enumerate() {
        let d = drums.get(i).copied().unwrap_or(0.0) * drum_gain.value();
        let g = guitar.get(i).copied().unwrap_or(0.0) * guitar_gain.value();
        let sum = d + g;
        *value = sum.clamp(-1.0, 1.0);
    }
}

/// Multiplies a block in place.
pub fn apply_gain(block: &mut [f32], gain: GainLevel) {
    for value in block {
        *value *= gain.value();
    }
}
