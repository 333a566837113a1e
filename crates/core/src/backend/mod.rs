//! The capability contract every audio engine variant implements, plus the
//! two reference variants shipped with the crate.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AppConfig, GainLevel, MixerError, Result, Source, SpectrumSample};

mod engine;
mod graph;

pub use engine::EngineBackend;
pub use graph::GraphBackend;

/// Identifies one of the two backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pull-model engine that analyses on demand. Selector `0`.
    Graph,
    /// Threaded engine that renders blocks in the background. Selector `1`.
    Engine,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Graph, BackendKind::Engine];

    /// Maps the discrete selector value of the backend picker.
    pub fn from_selector(selector: u32) -> Result<Self> {
        match selector {
            0 => Ok(BackendKind::Graph),
            1 => Ok(BackendKind::Engine),
            other => Err(MixerError::InvalidSelector(other)),
        }
    }

    pub fn selector(self) -> u32 {
        match self {
            BackendKind::Graph => 0,
            BackendKind::Engine => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Graph => "graph",
            BackendKind::Engine => "engine",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = MixerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" | "0" => Ok(BackendKind::Graph),
            "engine" | "1" => Ok(BackendKind::Engine),
            _ => Err(MixerError::UnknownBackend(s.to_string())),
        }
    }
}

/// Binary playback state of one backend handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

impl PlaybackState {
    pub fn from_playing(playing: bool) -> Self {
        if playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn is_playing(self) -> bool {
        self == PlaybackState::Playing
    }
}

/// Operations the mixer needs from an audio engine.
///
/// Every call is synchronous from the caller's point of view and must return
/// well within one polling interval. Engines that do their work on other
/// threads keep that concurrency behind this interface.
pub trait AudioBackend {
    fn kind(&self) -> BackendKind;

    /// Prepares engine resources. Called at most once per handle; a second
    /// call returns [`MixerError::AlreadyLoaded`].
    fn load(&mut self) -> Result<()>;

    fn is_playing(&self) -> bool;

    /// Starts playback; a no-op while already playing.
    fn start_playing(&mut self) -> Result<()>;

    /// Stops playback; a no-op while stopped.
    fn stop_playing(&mut self);

    fn set_drum_input_volume(&mut self, level: GainLevel);

    fn set_guitar_input_volume(&mut self, level: GainLevel);

    /// Snapshot of the guitar channel's magnitudes. Returns an empty sample
    /// when no data is available instead of failing.
    fn guitar_spectrum(&mut self) -> Result<SpectrumSample>;

    /// Snapshot of the drum channel's magnitudes, same rules as
    /// [`AudioBackend::guitar_spectrum`].
    fn drum_spectrum(&mut self) -> Result<SpectrumSample>;

    fn playback_state(&self) -> PlaybackState {
        PlaybackState::from_playing(self.is_playing())
    }

    fn set_input_volume(&mut self, source: Source, level: GainLevel) {
        match source {
            Source::Drums => self.set_drum_input_volume(level),
            Source::Guitar => self.set_guitar_input_volume(level),
        }
    }

    fn spectrum(&mut self, source: Source) -> Result<SpectrumSample> {
        match source {
            Source::Drums => self.drum_spectrum(),
            Source::Guitar => self.guitar_spectrum(),
        }
    }
}

/// Builds a fresh, unloaded handle for a backend variant.
pub trait BackendFactory {
    fn create(&self, kind: BackendKind) -> Box<dyn AudioBackend>;
}

impl<F> BackendFactory for F
where
    F: Fn(BackendKind) -> Box<dyn AudioBackend>,
{
    fn create(&self, kind: BackendKind) -> Box<dyn AudioBackend> {
        self(kind)
    }
}

/// Factory for the two synthetic reference engines.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBackends {
    config: AppConfig,
}

impl ReferenceBackends {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for ReferenceBackends {
    fn create(&self, kind: BackendKind) -> Box<dyn AudioBackend> {
        match kind {
            BackendKind::Graph => Box::new(GraphBackend::new(&self.config)),
            BackendKind::Engine => Box::new(EngineBackend::new(&self.config)),
        }
    }
}
