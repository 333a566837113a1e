use std::time::Instant;

use crate::{
    source::{apply_gain, DrumLoop, GuitarRiff, Signal},
    AppConfig, AudioBackend, BackendKind, GainLevel, MixerError, Result, Source, SpectrumAnalyzer,
    SpectrumSample,
};

/// Pull-model engine. Nothing runs between calls: a spectrum request renders
/// the window that ends at the current playhead and analyses it.
///
/// Load failure policy: `load` validates the configuration and plans the FFT.
/// On failure the error is returned and the handle stays unloaded; starting
/// an unloaded handle returns [`MixerError::BackendNotLoaded`].
#[derive(Debug)]
pub struct GraphBackend {
    config: AppConfig,
    analyzer: Option<SpectrumAnalyzer>,
    drums: DrumLoop,
    guitar: GuitarRiff,
    drum_gain: GainLevel,
    guitar_gain: GainLevel,
    playhead: Option<Playhead>,
    block: Vec<f32>,
}

/// Wall-clock anchored position; frames are derived from elapsed time.
#[derive(Debug, Clone, Copy)]
struct Playhead {
    started_at: Instant,
}

impl Playhead {
    fn frame(&self, sample_rate: u32) -> u64 {
        (self.started_at.elapsed().as_secs_f64() * sample_rate as f64) as u64
    }
}

impl GraphBackend {
    pub fn new(config: &AppConfig) -> Self {
        let sample_rate = config.audio.sample_rate;
        Self {
            config: config.clone(),
            analyzer: None,
            drums: DrumLoop::new(sample_rate),
            guitar: GuitarRiff::new(sample_rate),
            drum_gain: GainLevel::UNITY,
            guitar_gain: GainLevel::UNITY,
            playhead: None,
            block: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.analyzer.is_some()
    }

    fn snapshot(&mut self, source: Source) -> Result<SpectrumSample> {
        let (Some(playhead), Some(analyzer)) = (self.playhead, self.analyzer.as_mut()) else {
            return Ok(SpectrumSample::empty());
        };

        let window = analyzer.window_len();
        let end = playhead.frame(self.config.audio.sample_rate);
        let start = end.saturating_sub(window as u64);
        self.block.resize(window, 0.0);

        let gain = match source {
            Source::Drums => {
                self.drums.render(start, &mut self.block);
                self.drum_gain
            }
            Source::Guitar => {
                self.guitar.render(start, &mut self.block);
                self.guitar_gain
            }
        };
        apply_gain(&mut self.block, gain);
        analyzer.analyze(&self.block)
    }
}

impl AudioBackend for GraphBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn load(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Err(MixerError::AlreadyLoaded(self.kind()));
        }

        let analyzer = self
            .config
            .validate()
            .and_then(|_| {
                SpectrumAnalyzer::new(self.config.spectrum.bin_count, self.config.spectrum.floor_db)
            })
            .map_err(|err| MixerError::BackendLoad {
                kind: BackendKind::Graph,
                reason: err.to_string(),
            })?;

        tracing::debug!(bins = analyzer.bin_count(), "graph backend loaded");
        self.analyzer = Some(analyzer);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playhead.is_some()
    }

    fn start_playing(&mut self) -> Result<()> {
        if !self.is_loaded() {
            return Err(MixerError::BackendNotLoaded(self.kind()));
        }
        if self.playhead.is_none() {
            self.playhead = Some(Playhead {
                started_at: Instant::now(),
            });
            tracing::debug!("graph backend started");
        }
        Ok(())
    }

    fn stop_playing(&mut self) {
        if self.playhead.take().is_some() {
            tracing::debug!("graph backend stopped");
        }
    }

    fn set_drum_input_volume(&mut self, level: GainLevel) {
        self.drum_gain = level;
    }

    fn set_guitar_input_volume(&mut self, level: GainLevel) {
        self.guitar_gain = level;
    }

    fn guitar_spectrum(&mut self) -> Result<SpectrumSample> {
        self.snapshot(Source::Guitar)
    }

    fn drum_spectrum(&mut self) -> Result<SpectrumSample> {
        self.snapshot(Source::Drums)
    }
}
