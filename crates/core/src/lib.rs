//! Core library for the CAMixer two-source mixer.
//!
//! The crate blends a drum and a guitar source through one of two
//! interchangeable audio backends and turns periodic spectrum snapshots into
//! bar geometry for a presentation layer. Each module owns one piece of that
//! pipeline: the backend contract and its reference engines, FFT analysis,
//! the polling schedule, bar layout, derived labels, and the controller
//! that ties them together.

pub mod analysis;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod labels;
pub mod polling;
pub mod render;
pub mod source;

pub use analysis::{SpectrumAnalyzer, SpectrumSample};
pub use backend::{
    AudioBackend, BackendFactory, BackendKind, EngineBackend, GraphBackend, PlaybackState,
    ReferenceBackends,
};
pub use config::{AppConfig, AudioConfig, MixerDefaults, SpectrumConfig};
pub use controller::{MixerController, TickOutcome};
pub use error::{MixerError, Result};
pub use events::{EventLog, MixerEvent, MixerObserver, NullObserver};
pub use polling::{Poll, PollingScheduler, SkipReason};
pub use render::{BarGeometry, Region, SpectrumRenderer};
pub use source::{GainLevel, Source};
