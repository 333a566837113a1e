use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{analysis::MAX_BIN_COUNT, BackendKind, MixerError, Result, Source};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub spectrum: SpectrumConfig,
    pub mixer: MixerDefaults,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the polling pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(MixerError::InvalidConfig(
                "audio.sample_rate must be positive".to_string(),
            ));
        }
        if self.audio.block_size == 0 {
            return Err(MixerError::InvalidConfig(
                "audio.block_size must be positive".to_string(),
            ));
        }
        if !(2..=MAX_BIN_COUNT).contains(&self.spectrum.bin_count) {
            return Err(MixerError::InvalidConfig(format!(
                "spectrum.bin_count must be within [2, {MAX_BIN_COUNT}], got {}",
                self.spectrum.bin_count
            )));
        }
        if self.spectrum.tick_interval_ms == 0 {
            return Err(MixerError::InvalidConfig(
                "spectrum.tick_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.spectrum.floor_db.is_finite() && self.spectrum.floor_db < 0.0) {
            return Err(MixerError::InvalidConfig(format!(
                "spectrum.floor_db must be a negative number, got {}",
                self.spectrum.floor_db
            )));
        }
        for (name, gain) in [
            ("mixer.drum_gain", self.mixer.drum_gain),
            ("mixer.guitar_gain", self.mixer.guitar_gain),
        ] {
            if !(0.0..=1.0).contains(&gain) {
                return Err(MixerError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {gain}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration specific to the reference audio backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames rendered per block by the threaded engine.
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 512,
        }
    }
}

/// Spectrum polling and rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Number of bins in an accepted sample and bars in the graph.
    pub bin_count: usize,
    pub tick_interval_ms: u64,
    /// Magnitude (dBFS) mapped to an empty bar.
    pub floor_db: f32,
    /// Channel whose spectrum is visualized.
    pub source: Source,
}

impl SpectrumConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// FFT window length that yields `bin_count` bins below Nyquist.
    pub fn fft_size(&self) -> usize {
        self.bin_count.saturating_mul(2)
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bin_count: 256,
            tick_interval_ms: 10,
            floor_db: -80.0,
            source: Source::Guitar,
        }
    }
}

/// Initial mixer state and the per-backend visualization policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerDefaults {
    pub backend: BackendKind,
    pub drum_gain: f32,
    pub guitar_gain: f32,
    pub visualize_graph: bool,
    pub visualize_engine: bool,
}

impl MixerDefaults {
    /// Whether spectrum bars are shown while `kind` is the active backend.
    pub fn visualize(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Graph => self.visualize_graph,
            BackendKind::Engine => self.visualize_engine,
        }
    }
}

impl Default for MixerDefaults {
    fn default() -> Self {
        Self {
            backend: BackendKind::Graph,
            drum_gain: 1.0,
            guitar_gain: 1.0,
            visualize_graph: true,
            visualize_engine: false,
        }
    }
}
