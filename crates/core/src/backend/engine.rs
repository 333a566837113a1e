use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    source::{apply_gain, mix_into, DrumLoop, GuitarRiff, Signal},
    AppConfig, AudioBackend, BackendKind, GainLevel, MixerError, Result, SpectrumAnalyzer,
    SpectrumSample,
};

/// Threaded engine. While playing, a render thread produces one block per
/// block period: it mixes both sources with the current gains and publishes
/// the latest per-source spectra for the polling side to pick up.
///
/// Load failure policy: identical to the graph engine. `load` validates and
/// plans the FFT; failures leave the handle unloaded and unable to start.
#[derive(Debug)]
pub struct EngineBackend {
    config: AppConfig,
    loaded: bool,
    /// Planned by `load`; lent to the render thread while playing.
    analyzer: Option<SpectrumAnalyzer>,
    shared: Arc<Mutex<EngineShared>>,
    render: Option<RenderThread>,
}

#[derive(Debug)]
struct RenderThread {
    running: Arc<AtomicBool>,
    handle: JoinHandle<SpectrumAnalyzer>,
}

/// State exchanged between the handle and its render thread.
#[derive(Debug, Default)]
struct EngineShared {
    drum_gain: GainLevel,
    guitar_gain: GainLevel,
    guitar_spectrum: SpectrumSample,
    drum_spectrum: SpectrumSample,
    output_peak: f32,
    blocks_rendered: u64,
}

impl EngineBackend {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            loaded: false,
            analyzer: None,
            shared: Arc::new(Mutex::new(EngineShared::default())),
            render: None,
        }
    }

    /// Peak absolute value of the most recent mixed block.
    pub fn output_peak(&self) -> Result<f32> {
        Ok(self.lock()?.output_peak)
    }

    pub fn blocks_rendered(&self) -> Result<u64> {
        Ok(self.lock()?.blocks_rendered)
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineShared>> {
        lock_shared(&self.shared)
    }

    fn spawn_render_thread(&mut self) -> Result<RenderThread> {
        // Only missing if a previous render thread panicked.
        let analyzer = match self.analyzer.take() {
            Some(analyzer) => analyzer,
            None => SpectrumAnalyzer::new(
                self.config.spectrum.bin_count,
                self.config.spectrum.floor_db,
            )?,
        };
        let sample_rate = self.config.audio.sample_rate;
        let block_size = self.config.audio.block_size;
        let period = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);

        let running = Arc::new(AtomicBool::new(true));
        let worker = RenderWorker {
            analyzer,
            drums: DrumLoop::new(sample_rate),
            guitar: GuitarRiff::new(sample_rate),
            block_size,
            frame: 0,
            shared: Arc::clone(&self.shared),
        };

        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("camixer-engine".to_string())
            .spawn(move || worker.run(&flag, period))?;

        Ok(RenderThread { running, handle })
    }

    /// Signals the render thread to stop, joins it and takes the analyzer back.
    fn join_render(&mut self) -> bool {
        let Some(render) = self.render.take() else {
            return false;
        };
        render.running.store(false, Ordering::Release);
        match render.handle.join() {
            Ok(analyzer) => self.analyzer = Some(analyzer),
            Err(_) => tracing::error!("engine render thread panicked"),
        }
        true
    }
}

impl AudioBackend for EngineBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Engine
    }

    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Err(MixerError::AlreadyLoaded(self.kind()));
        }

        let analyzer = self
            .config
            .validate()
            .and_then(|_| {
                SpectrumAnalyzer::new(self.config.spectrum.bin_count, self.config.spectrum.floor_db)
            })
            .map_err(|err| MixerError::BackendLoad {
                kind: BackendKind::Engine,
                reason: err.to_string(),
            })?;

        tracing::debug!(bins = analyzer.bin_count(), "engine backend loaded");
        self.analyzer = Some(analyzer);
        self.loaded = true;
        Ok(())
    }

    /// A render thread that exited on its own no longer counts as playing.
    fn is_playing(&self) -> bool {
        self.render
            .as_ref()
            .is_some_and(|render| !render.handle.is_finished())
    }

    fn start_playing(&mut self) -> Result<()> {
        if !self.loaded {
            return Err(MixerError::BackendNotLoaded(self.kind()));
        }
        if self.is_playing() {
            return Ok(());
        }
        if self.join_render() {
            tracing::warn!("engine render thread exited early, restarting");
        }

        {
            let mut shared = self.lock()?;
            shared.guitar_spectrum = SpectrumSample::empty();
            shared.drum_spectrum = SpectrumSample::empty();
        }
        self.render = Some(self.spawn_render_thread()?);
        tracing::debug!("engine backend started");
        Ok(())
    }

    fn stop_playing(&mut self) {
        if self.join_render() {
            tracing::debug!("engine backend stopped");
        }
    }

    fn set_drum_input_volume(&mut self, level: GainLevel) {
        match self.lock() {
            Ok(mut shared) => shared.drum_gain = level,
            Err(err) => tracing::warn!(%err, "dropping drum gain update"),
        }
    }

    fn set_guitar_input_volume(&mut self, level: GainLevel) {
        match self.lock() {
            Ok(mut shared) => shared.guitar_gain = level,
            Err(err) => tracing::warn!(%err, "dropping guitar gain update"),
        }
    }

    fn guitar_spectrum(&mut self) -> Result<SpectrumSample> {
        if !self.is_playing() {
            return Ok(SpectrumSample::empty());
        }
        Ok(self.lock()?.guitar_spectrum.clone())
    }

    fn drum_spectrum(&mut self) -> Result<SpectrumSample> {
        if !self.is_playing() {
            return Ok(SpectrumSample::empty());
        }
        Ok(self.lock()?.drum_spectrum.clone())
    }
}

impl Drop for EngineBackend {
    fn drop(&mut self) {
        self.stop_playing();
    }
}

/// Owned by the render thread for its whole lifetime.
struct RenderWorker {
    analyzer: SpectrumAnalyzer,
    drums: DrumLoop,
    guitar: GuitarRiff,
    block_size: usize,
    frame: u64,
    shared: Arc<Mutex<EngineShared>>,
}

impl RenderWorker {
    /// Renders until `running` clears or the shared state becomes unusable,
    /// then hands the analyzer back to the joining handle.
    fn run(mut self, running: &AtomicBool, period: Duration) -> SpectrumAnalyzer {
        let window = self.analyzer.window_len();
        let len = window.max(self.block_size);
        let mut drums = vec![0.0; len];
        let mut guitar = vec![0.0; len];
        let mut mixed = vec![0.0; self.block_size];

        while running.load(Ordering::Acquire) {
            let (drum_gain, guitar_gain) = match lock_shared(&self.shared) {
                Ok(shared) => (shared.drum_gain, shared.guitar_gain),
                Err(err) => {
                    tracing::error!(%err, "engine render thread exiting");
                    break;
                }
            };

            // Render enough history for one analysis window ending at the
            // end of this block.
            let end = self.frame + self.block_size as u64;
            let start = end.saturating_sub(len as u64);
            self.drums.render(start, &mut drums);
            self.guitar.render(start, &mut guitar);

            let tail = len - self.block_size;
            mix_into(&mut mixed, &drums[tail..], &guitar[tail..], drum_gain, guitar_gain);
            let peak = mixed.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));

            let analysis_start = len - window;
            apply_gain(&mut drums[analysis_start..], drum_gain);
            apply_gain(&mut guitar[analysis_start..], guitar_gain);
            let spectra = self
                .analyzer
                .analyze(&guitar[analysis_start..])
                .and_then(|g| Ok((g, self.analyzer.analyze(&drums[analysis_start..])?)));

            match (spectra, lock_shared(&self.shared)) {
                (Ok((guitar_spectrum, drum_spectrum)), Ok(mut shared)) => {
                    shared.guitar_spectrum = guitar_spectrum;
                    shared.drum_spectrum = drum_spectrum;
                    shared.output_peak = peak;
                    shared.blocks_rendered += 1;
                }
                (Err(err), _) | (_, Err(err)) => {
                    tracing::error!(%err, "engine render thread exiting");
                    break;
                }
            }

            self.frame = end;
            thread::sleep(period);
        }

        self.analyzer
    }
}

fn lock_shared(shared: &Mutex<EngineShared>) -> Result<MutexGuard<'_, EngineShared>> {
    shared
        .lock()
        .map_err(|_| MixerError::msg("engine shared state has been poisoned"))
}
