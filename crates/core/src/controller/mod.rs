use std::time::Instant;

use crate::{
    labels, AppConfig, AudioBackend, BackendFactory, BackendKind, BarGeometry, GainLevel,
    MixerError, MixerObserver, PlaybackState, Poll, PollingScheduler, Region, Result, SkipReason,
    Source, SpectrumRenderer, SpectrumSample,
};

/// What a controller tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A sample was accepted and new bars were emitted.
    Rendered,
    Skipped(SkipReason),
}

/// The exclusively owned, currently active backend.
struct ActiveBackend {
    kind: BackendKind,
    handle: Box<dyn AudioBackend>,
    loaded: bool,
}

/// Owns the active backend and everything derived from it: gains, the
/// polling schedule, the last rendered bars, and the observer that mirrors
/// state changes to the presentation layer.
///
/// The controller is single-threaded. Every transition runs to completion on
/// the caller's thread and notifies the observer before returning.
pub struct MixerController {
    config: AppConfig,
    factory: Box<dyn BackendFactory>,
    backend: ActiveBackend,
    visualization_enabled: bool,
    drum_gain: GainLevel,
    guitar_gain: GainLevel,
    scheduler: PollingScheduler,
    renderer: SpectrumRenderer,
    region: Region,
    last_sample: Option<SpectrumSample>,
    bars: Vec<BarGeometry>,
    observer: Box<dyn MixerObserver>,
}

impl MixerController {
    /// Builds and loads the configured initial backend.
    ///
    /// A failing initial load is reported but does not prevent construction;
    /// the controller then sits Stopped on an unloaded backend until another
    /// one is selected.
    pub fn new(
        config: AppConfig,
        factory: impl BackendFactory + 'static,
        observer: impl MixerObserver + 'static,
    ) -> Self {
        let kind = config.mixer.backend;
        let drum_gain = GainLevel::clamped(config.mixer.drum_gain);
        let guitar_gain = GainLevel::clamped(config.mixer.guitar_gain);
        let visualization_enabled = config.mixer.visualize(kind);
        let bin_count = config.spectrum.bin_count;

        let factory: Box<dyn BackendFactory> = Box::new(factory);
        let backend = load_backend(factory.as_ref(), kind, drum_gain, guitar_gain).unwrap_or_else(
            |(backend, err)| {
                tracing::error!(%err, backend = %kind, "initial backend failed to load");
                backend
            },
        );

        let mut scheduler = PollingScheduler::new(config.spectrum.tick_interval(), bin_count);
        if visualization_enabled {
            scheduler.start(Instant::now());
        }

        tracing::info!(
            backend = %kind,
            bins = bin_count,
            interval_ms = config.spectrum.tick_interval_ms,
            "mixer controller ready"
        );

        Self {
            config,
            factory,
            backend,
            visualization_enabled,
            drum_gain,
            guitar_gain,
            scheduler,
            renderer: SpectrumRenderer::new(bin_count),
            region: Region::default(),
            last_sample: None,
            bars: Vec::new(),
            observer: Box::new(observer),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind
    }

    pub fn is_backend_loaded(&self) -> bool {
        self.backend.loaded
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.backend.handle.playback_state()
    }

    pub fn is_playing(&self) -> bool {
        self.backend.handle.is_playing()
    }

    pub fn visualization_enabled(&self) -> bool {
        self.visualization_enabled
    }

    pub fn gain(&self, source: Source) -> GainLevel {
        match source {
            Source::Drums => self.drum_gain,
            Source::Guitar => self.guitar_gain,
        }
    }

    pub fn gain_label(&self, source: Source) -> String {
        labels::gain_label(source, self.gain(source))
    }

    pub fn play_button_title(&self) -> &'static str {
        labels::play_button_title(self.playback_state())
    }

    pub fn spectrum_caption(&self) -> String {
        labels::spectrum_caption(self.config.spectrum.source)
    }

    /// Bars from the last accepted sample or resize.
    pub fn bars(&self) -> &[BarGeometry] {
        &self.bars
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// When the host loop should call [`MixerController::tick`] next, or
    /// `None` while polling is off.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Handles a raw selector from the backend picker. Unknown values are
    /// reported and leave every piece of state untouched.
    pub fn select_backend(&mut self, selector: u32) -> Result<()> {
        let kind = match BackendKind::from_selector(selector) {
            Ok(kind) => kind,
            Err(err) => {
                tracing::error!(selector, "unrecognized backend selector");
                return Err(err);
            }
        };
        let visualize = self.config.mixer.visualize(kind);
        self.select_backend_with(kind, visualize)
    }

    /// Swaps to `kind`, with `visualize` deciding whether the spectrum view
    /// is driven while it is active. Selecting the active kind does nothing.
    ///
    /// The swap is a hard cut: polling is cancelled and the outgoing backend
    /// is stopped before the new one is created, and dropped when the new
    /// one takes its place.
    pub fn select_backend_with(&mut self, kind: BackendKind, visualize: bool) -> Result<()> {
        if kind == self.backend.kind {
            return Ok(());
        }

        self.scheduler.cancel();
        self.backend.handle.stop_playing();
        self.observer.on_play_state_changed(false);

        let outgoing = self.backend.kind;
        let result = match load_backend(self.factory.as_ref(), kind, self.drum_gain, self.guitar_gain)
        {
            Ok(backend) => {
                self.backend = backend;
                Ok(())
            }
            Err((backend, err)) => {
                tracing::error!(%err, backend = %kind, "backend failed to load");
                self.backend = backend;
                Err(err)
            }
        };

        self.visualization_enabled = visualize;
        self.observer.on_visualization_changed(visualize);
        if visualize {
            self.scheduler.start(Instant::now());
        }

        tracing::info!(from = %outgoing, to = %kind, visualize, "switched backend");
        result
    }

    /// Stops a playing backend or starts a stopped one, then reports the
    /// resulting state to the observer.
    pub fn toggle_play(&mut self) -> Result<PlaybackState> {
        let result = if self.backend.handle.is_playing() {
            self.backend.handle.stop_playing();
            Ok(())
        } else if !self.backend.loaded {
            Err(MixerError::BackendNotLoaded(self.backend.kind))
        } else {
            self.backend.handle.start_playing()
        };

        let state = self.playback_state();
        self.observer.on_play_state_changed(state.is_playing());

        match result {
            Ok(()) => {
                tracing::info!(backend = %self.backend.kind, ?state, "playback toggled");
                Ok(state)
            }
            Err(err) => {
                tracing::error!(%err, backend = %self.backend.kind, "failed to start playback");
                Err(err)
            }
        }
    }

    /// Stores and forwards a gain. Never changes the playback state.
    pub fn set_gain(&mut self, source: Source, level: GainLevel) {
        match source {
            Source::Drums => self.drum_gain = level,
            Source::Guitar => self.guitar_gain = level,
        }
        self.backend.handle.set_input_volume(source, level);

        let percent = labels::gain_percent(level);
        tracing::debug!(%source, percent, "gain changed");
        self.observer.on_gain_changed(source, percent);
    }

    /// Runs one polling tick. Accepted samples are laid out and emitted;
    /// anything else leaves the previous bars in place.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.visualization_enabled {
            return TickOutcome::Skipped(SkipReason::Unregistered);
        }

        let source = self.config.spectrum.source;
        match self
            .scheduler
            .tick(now, Some(self.backend.handle.as_mut()), source)
        {
            Poll::Sample(sample) => {
                self.bars = self.renderer.compute_bars(self.region, sample.as_slice());
                self.last_sample = Some(sample);
                self.observer.on_spectrum_updated(&self.bars);
                TickOutcome::Rendered
            }
            Poll::Skipped(reason) => TickOutcome::Skipped(reason),
        }
    }

    /// Records the new drawing area and re-lays out the last known sample.
    pub fn resize(&mut self, region: Region) {
        self.region = region;
        if !self.visualization_enabled {
            return;
        }

        let samples = self
            .last_sample
            .as_ref()
            .map(SpectrumSample::as_slice)
            .unwrap_or(&[]);
        self.bars = self.renderer.compute_bars(region, samples);
        self.observer.on_spectrum_updated(&self.bars);
    }

    /// Cancels polling, then stops the backend.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel();
        if self.backend.handle.is_playing() {
            self.backend.handle.stop_playing();
            self.observer.on_play_state_changed(false);
        }
    }
}

impl Drop for MixerController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for MixerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerController")
            .field("backend", &self.backend.kind)
            .field("loaded", &self.backend.loaded)
            .field("playing", &self.is_playing())
            .field("visualization_enabled", &self.visualization_enabled)
            .field("drum_gain", &self.drum_gain)
            .field("guitar_gain", &self.guitar_gain)
            .field("region", &self.region)
            .field("bars", &self.bars.len())
            .finish()
    }
}

/// Creates and loads a backend, then applies the current gains. On failure
/// the unloaded handle is handed back with the error so it can still become
/// the active, stopped backend.
fn load_backend(
    factory: &dyn BackendFactory,
    kind: BackendKind,
    drum_gain: GainLevel,
    guitar_gain: GainLevel,
) -> std::result::Result<ActiveBackend, (ActiveBackend, MixerError)> {
    let mut handle = factory.create(kind);
    match handle.load() {
        Ok(()) => {
            handle.set_drum_input_volume(drum_gain);
            handle.set_guitar_input_volume(guitar_gain);
            Ok(ActiveBackend {
                kind,
                handle,
                loaded: true,
            })
        }
        Err(err) => {
            let err = match err {
                err @ MixerError::BackendLoad { .. } => err,
                other => MixerError::BackendLoad {
                    kind,
                    reason: other.to_string(),
                },
            };
            Err((
                ActiveBackend {
                    kind,
                    handle,
                    loaded: false,
                },
                err,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::*;
    use crate::{EventLog, MixerEvent, NullObserver, ReferenceBackends};

    /// Records what the controller asked of each backend it created.
    #[derive(Debug, Default)]
    struct Recorder {
        created: Vec<BackendKind>,
        playing: Option<BackendKind>,
        drum_gain: Option<f32>,
        guitar_gain: Option<f32>,
        polls: usize,
        fail_load: Vec<BackendKind>,
        spectrum_len: usize,
        spectrum_offset: f32,
    }

    struct MockBackend {
        kind: BackendKind,
        recorder: Rc<RefCell<Recorder>>,
        playing: bool,
    }

    impl AudioBackend for MockBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn load(&mut self) -> Result<()> {
            if self.recorder.borrow().fail_load.contains(&self.kind) {
                return Err(MixerError::msg("no audio device"));
            }
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing
        }

        fn start_playing(&mut self) -> Result<()> {
            self.playing = true;
            self.recorder.borrow_mut().playing = Some(self.kind);
            Ok(())
        }

        fn stop_playing(&mut self) {
            if self.playing {
                self.playing = false;
                self.recorder.borrow_mut().playing = None;
            }
        }

        fn set_drum_input_volume(&mut self, level: GainLevel) {
            self.recorder.borrow_mut().drum_gain = Some(level.value());
        }

        fn set_guitar_input_volume(&mut self, level: GainLevel) {
            self.recorder.borrow_mut().guitar_gain = Some(level.value());
        }

        fn guitar_spectrum(&mut self) -> Result<SpectrumSample> {
            let mut recorder = self.recorder.borrow_mut();
            recorder.polls += 1;
            let len = recorder.spectrum_len;
            let offset = recorder.spectrum_offset;
            Ok(SpectrumSample::new(
                (0..len).map(|i| offset + i as f32 / len as f32 * 0.5).collect(),
            ))
        }

        fn drum_spectrum(&mut self) -> Result<SpectrumSample> {
            Ok(SpectrumSample::empty())
        }
    }

    struct Harness {
        controller: MixerController,
        recorder: Rc<RefCell<Recorder>>,
        log: EventLog,
        t0: Instant,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_recorder(Recorder {
                spectrum_len: 256,
                ..Recorder::default()
            })
        }

        fn with_recorder(recorder: Recorder) -> Self {
            let recorder = Rc::new(RefCell::new(recorder));
            let log = EventLog::new();
            let factory_recorder = Rc::clone(&recorder);
            let factory = move |kind: BackendKind| -> Box<dyn AudioBackend> {
                factory_recorder.borrow_mut().created.push(kind);
                Box::new(MockBackend {
                    kind,
                    recorder: Rc::clone(&factory_recorder),
                    playing: false,
                })
            };
            let mut controller = MixerController::new(AppConfig::default(), factory, log.clone());
            controller.resize(Region::new(512.0, 100.0));
            log.take();
            Self {
                controller,
                recorder,
                log,
                t0: Instant::now(),
            }
        }

        /// Tick `n` intervals after the harness was created.
        fn tick(&mut self, n: u32) -> TickOutcome {
            self.controller.tick(self.t0 + Duration::from_millis(10) * n)
        }
    }

    #[test]
    fn starts_stopped_on_graph_with_visualization() {
        let harness = Harness::new();
        let controller = &harness.controller;

        assert_eq!(controller.backend_kind(), BackendKind::Graph);
        assert_eq!(controller.playback_state(), PlaybackState::Stopped);
        assert!(controller.visualization_enabled());
        assert!(controller.is_backend_loaded());
        assert!(controller.next_deadline().is_some());
        assert_eq!(controller.play_button_title(), "Play");
        assert_eq!(controller.gain_label(Source::Guitar), "Guitar: 100%");
        assert_eq!(harness.recorder.borrow().created, vec![BackendKind::Graph]);
        assert_eq!(harness.recorder.borrow().drum_gain, Some(1.0));
    }

    #[test]
    fn toggle_twice_returns_to_stopped() {
        let mut harness = Harness::new();

        assert_eq!(harness.controller.toggle_play().unwrap(), PlaybackState::Playing);
        assert_eq!(harness.controller.play_button_title(), "Stop");
        assert_eq!(harness.controller.toggle_play().unwrap(), PlaybackState::Stopped);

        assert_eq!(harness.recorder.borrow().playing, None);
        assert_eq!(
            harness.log.events(),
            vec![
                MixerEvent::PlayStateChanged(true),
                MixerEvent::PlayStateChanged(false)
            ]
        );
    }

    #[test]
    fn gain_updates_forward_and_label_without_touching_playback() {
        let mut harness = Harness::new();
        harness.controller.toggle_play().unwrap();
        harness.log.take();

        harness
            .controller
            .set_gain(Source::Guitar, GainLevel::new(0.73).unwrap());
        harness
            .controller
            .set_gain(Source::Drums, GainLevel::clamped(1.7));

        assert_eq!(harness.controller.gain_label(Source::Guitar), "Guitar: 73%");
        assert_eq!(harness.controller.gain_label(Source::Drums), "Drums: 100%");
        assert_eq!(harness.recorder.borrow().guitar_gain, Some(0.73));
        assert!(harness.controller.is_playing());
        assert_eq!(
            harness.log.events(),
            vec![
                MixerEvent::GainChanged {
                    source: Source::Guitar,
                    percent: 73
                },
                MixerEvent::GainChanged {
                    source: Source::Drums,
                    percent: 100
                },
            ]
        );
    }

    #[test]
    fn swap_while_playing_leaves_new_backend_stopped() {
        let mut harness = Harness::new();
        harness.controller.toggle_play().unwrap();

        harness
            .controller
            .select_backend(BackendKind::Engine.selector())
            .unwrap();

        assert_eq!(harness.controller.backend_kind(), BackendKind::Engine);
        assert_eq!(harness.controller.playback_state(), PlaybackState::Stopped);
        assert_eq!(harness.recorder.borrow().playing, None);
        assert_eq!(
            harness.recorder.borrow().created,
            vec![BackendKind::Graph, BackendKind::Engine]
        );
    }

    #[test]
    fn swap_reapplies_current_gains() {
        let mut harness = Harness::new();
        harness
            .controller
            .set_gain(Source::Drums, GainLevel::new(0.25).unwrap());
        harness.recorder.borrow_mut().drum_gain = None;

        harness.controller.select_backend(1).unwrap();
        assert_eq!(harness.recorder.borrow().drum_gain, Some(0.25));
    }

    #[test]
    fn selecting_active_backend_is_a_no_op() {
        let mut harness = Harness::new();
        harness.controller.toggle_play().unwrap();
        harness.log.take();

        harness.controller.select_backend(0).unwrap();
        assert!(harness.controller.is_playing());
        assert!(harness.log.is_empty());
        assert_eq!(harness.recorder.borrow().created.len(), 1);
    }

    #[test]
    fn invalid_selector_is_reported_and_ignored() {
        let mut harness = Harness::new();
        harness.controller.toggle_play().unwrap();
        harness.log.take();

        let err = harness.controller.select_backend(2).unwrap_err();
        assert!(matches!(err, MixerError::InvalidSelector(2)));
        assert_eq!(harness.controller.backend_kind(), BackendKind::Graph);
        assert!(harness.controller.is_playing());
        assert!(harness.log.is_empty());
    }

    #[test]
    fn load_failure_leaves_new_backend_stopped_and_unloaded() {
        let mut harness = Harness::with_recorder(Recorder {
            spectrum_len: 256,
            fail_load: vec![BackendKind::Engine],
            ..Recorder::default()
        });
        harness.controller.toggle_play().unwrap();

        let err = harness.controller.select_backend(1).unwrap_err();
        assert!(matches!(
            err,
            MixerError::BackendLoad {
                kind: BackendKind::Engine,
                ..
            }
        ));
        assert_eq!(harness.controller.backend_kind(), BackendKind::Engine);
        assert!(!harness.controller.is_backend_loaded());

        let err = harness.controller.toggle_play().unwrap_err();
        assert!(matches!(err, MixerError::BackendNotLoaded(BackendKind::Engine)));
        assert_eq!(harness.controller.playback_state(), PlaybackState::Stopped);
        assert_eq!(
            harness.log.events().last(),
            Some(&MixerEvent::PlayStateChanged(false))
        );

        // Switching back recovers.
        harness.controller.select_backend(0).unwrap();
        assert!(harness.controller.is_backend_loaded());
        assert_eq!(harness.controller.toggle_play().unwrap(), PlaybackState::Playing);
    }

    #[test]
    fn ticks_only_render_while_playing() {
        let mut harness = Harness::new();
        assert_eq!(harness.tick(0), TickOutcome::Skipped(SkipReason::Idle));
        assert_eq!(harness.recorder.borrow().polls, 0);

        harness.controller.toggle_play().unwrap();
        assert_eq!(harness.tick(1), TickOutcome::Rendered);
        assert_eq!(harness.controller.bars().len(), 256);
    }

    #[test]
    fn mismatched_sample_keeps_previous_bars() {
        let mut harness = Harness::new();
        harness.controller.toggle_play().unwrap();
        assert_eq!(harness.tick(0), TickOutcome::Rendered);
        let before = harness.controller.bars().to_vec();
        let updates = harness.log.spectrum_updates();

        {
            let mut recorder = harness.recorder.borrow_mut();
            recorder.spectrum_len = 10;
            recorder.spectrum_offset = 0.3;
        }
        assert_eq!(
            harness.tick(1),
            TickOutcome::Skipped(SkipReason::LengthMismatch { len: 10 })
        );
        assert_eq!(harness.controller.bars(), before.as_slice());
        assert_eq!(harness.log.spectrum_updates(), updates);
    }

    #[test]
    fn resize_relays_out_last_sample() {
        let mut harness = Harness::new();
        harness.controller.toggle_play().unwrap();
        harness.tick(0);

        harness.controller.resize(Region::new(256.0, 50.0));
        let bars = harness.log.last_bars().unwrap();
        assert_eq!(bars.len(), 256);
        assert_eq!(bars[1].width, 1.0);
        assert!(bars.iter().all(|bar| (bar.y + bar.height - 50.0).abs() < 1e-4));
        assert_eq!(harness.controller.bars(), bars.as_slice());
    }

    #[test]
    fn shutdown_cancels_polling_and_stops_backend() {
        let mut harness = Harness::new();
        harness.controller.toggle_play().unwrap();
        harness.controller.shutdown();

        assert_eq!(harness.controller.next_deadline(), None);
        assert_eq!(harness.recorder.borrow().playing, None);
        assert_eq!(
            harness.tick(5),
            TickOutcome::Skipped(SkipReason::Unregistered)
        );
        assert_eq!(harness.recorder.borrow().polls, 0);
    }

    #[test]
    fn graph_playback_then_engine_swap_end_to_end() {
        let mut harness = Harness::new();
        assert_eq!(harness.controller.toggle_play().unwrap(), PlaybackState::Playing);

        assert_eq!(harness.tick(0), TickOutcome::Rendered);
        let bars = harness.log.last_bars().unwrap();
        assert_eq!(bars.len(), 256);
        for pair in bars.windows(2) {
            assert!(pair[1].height > pair[0].height);
        }
        assert!(bars.iter().all(|bar| (bar.y + bar.height - 100.0).abs() < 1e-4));

        harness.controller.select_backend(1).unwrap();
        assert!(!harness.controller.visualization_enabled());
        assert!(harness
            .log
            .events()
            .contains(&MixerEvent::VisualizationChanged(false)));
        assert_eq!(harness.controller.next_deadline(), None);

        let updates = harness.log.spectrum_updates();
        let polls = harness.recorder.borrow().polls;
        harness.controller.toggle_play().unwrap();
        assert!(harness.controller.is_playing());
        for n in 1..20 {
            assert_eq!(
                harness.tick(n),
                TickOutcome::Skipped(SkipReason::Unregistered)
            );
        }
        harness.controller.resize(Region::new(300.0, 80.0));

        assert_eq!(harness.log.spectrum_updates(), updates);
        assert_eq!(harness.recorder.borrow().polls, polls);
    }

    #[test]
    fn visualization_policy_can_be_overridden_per_swap() {
        let mut harness = Harness::new();
        harness
            .controller
            .select_backend_with(BackendKind::Engine, true)
            .unwrap();
        harness.controller.toggle_play().unwrap();

        assert!(harness.controller.visualization_enabled());
        // The swap restarts polling from its own clock reading.
        let due = harness.controller.next_deadline().unwrap();
        assert_eq!(harness.controller.tick(due), TickOutcome::Rendered);
    }

    #[test]
    fn drives_reference_backends() {
        let config = AppConfig::default();
        let mut controller =
            MixerController::new(config.clone(), ReferenceBackends::new(config), NullObserver);
        controller.resize(Region::new(256.0, 64.0));
        controller.toggle_play().unwrap();

        let t0 = Instant::now();
        assert_eq!(controller.tick(t0), TickOutcome::Rendered);
        assert_eq!(controller.bars().len(), 256);

        controller.select_backend(1).unwrap();
        assert_eq!(controller.toggle_play().unwrap(), PlaybackState::Playing);
        controller.shutdown();
        assert!(!controller.is_playing());
    }
}
