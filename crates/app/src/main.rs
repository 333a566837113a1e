use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use camixer_core::{
    AppConfig, BackendKind, BarGeometry, EventLog, GainLevel, MixerController, MixerError,
    MixerObserver, ReferenceBackends, Region, Source, TickOutcome,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> camixer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Play {
            session,
            seconds,
            switch_to,
            switch_after_ms,
        } => run_play(config, &session, seconds, switch_to, switch_after_ms),
        Commands::Snapshot {
            session,
            after_ms,
            output,
        } => run_snapshot(config, &session, after_ms, output.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> camixer_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_json_file(path),
        None => Ok(AppConfig::default()),
    }
}

fn run_play(
    config: AppConfig,
    session: &SessionArgs,
    seconds: f32,
    switch_to: Option<BackendKind>,
    switch_after_ms: u64,
) -> camixer_core::Result<()> {
    tracing::info!(backend = %session.backend, seconds, "starting playback session");

    let mut controller = session.controller(config, LoggingObserver::default())?;
    controller.toggle_play()?;

    let switch_at = switch_to.map(|kind| (kind, Duration::from_millis(switch_after_ms)));
    let stats = run_loop(&mut controller, session_length(seconds)?, switch_at)?;

    controller.shutdown();
    tracing::info!(
        rendered = stats.rendered,
        skipped = stats.skipped,
        backend = %controller.backend_kind(),
        "playback session finished"
    );
    Ok(())
}

fn run_snapshot(
    config: AppConfig,
    session: &SessionArgs,
    after_ms: u64,
    output: Option<&Path>,
) -> camixer_core::Result<()> {
    let log = EventLog::new();
    let mut controller = session.controller(config, log.clone())?;
    controller.toggle_play()?;
    run_loop(&mut controller, Duration::from_millis(after_ms), None)?;
    controller.shutdown();

    let bars = log.last_bars().unwrap_or_default();
    tracing::info!(bars = bars.len(), caption = %controller.spectrum_caption(), "captured snapshot");

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            serde_json::to_writer_pretty(file, &bars)?;
            tracing::info!(path = %path.display(), "wrote bar geometry");
        }
        None => println!("{}", serde_json::to_string_pretty(&bars)?),
    }
    Ok(())
}

/// Converts `--seconds` into a duration; negative and NaN values mean zero.
fn session_length(seconds: f32) -> camixer_core::Result<Duration> {
    Duration::try_from_secs_f32(seconds.max(0.0))
        .map_err(|_| MixerError::InvalidInput("session length is too large"))
}

#[derive(Debug, Default, Clone, Copy)]
struct LoopStats {
    rendered: u64,
    skipped: u64,
}

/// Cooperative host loop: sleep until the controller's next deadline, tick,
/// repeat until `duration` has elapsed.
fn run_loop(
    controller: &mut MixerController,
    duration: Duration,
    mut switch_at: Option<(BackendKind, Duration)>,
) -> camixer_core::Result<LoopStats> {
    let started = Instant::now();
    let end = started
        .checked_add(duration)
        .ok_or(MixerError::InvalidInput("session length is too large"))?;
    let idle = Duration::from_millis(10);
    let mut stats = LoopStats::default();

    loop {
        let now = Instant::now();
        if now >= end {
            break;
        }

        if let Some((kind, after)) = switch_at {
            if now.duration_since(started) >= after {
                switch_at = None;
                controller.select_backend(kind.selector())?;
                controller.toggle_play()?;
            }
        }

        match controller.tick(now) {
            TickOutcome::Rendered => stats.rendered += 1,
            TickOutcome::Skipped(reason) => {
                stats.skipped += 1;
                tracing::trace!(?reason, "tick skipped");
            }
        }

        let wake = controller.next_deadline().unwrap_or(now + idle).min(end);
        if let Some(wait) = wake.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    Ok(stats)
}

/// Logs every observer notification; bars are summarised rather than dumped.
#[derive(Debug, Default)]
struct LoggingObserver {
    frames: u64,
}

impl MixerObserver for LoggingObserver {
    fn on_spectrum_updated(&mut self, bars: &[BarGeometry]) {
        self.frames += 1;
        if self.frames % 50 == 1 {
            let (peak_bin, peak) = bars
                .iter()
                .enumerate()
                .fold((0, 0.0_f32), |best, (i, bar)| {
                    if bar.height > best.1 {
                        (i, bar.height)
                    } else {
                        best
                    }
                });
            tracing::info!(frame = self.frames, peak_bin, peak, "spectrum updated");
        }
    }

    fn on_play_state_changed(&mut self, playing: bool) {
        tracing::info!(playing, "play state changed");
    }

    fn on_gain_changed(&mut self, source: Source, percent: u32) {
        tracing::info!(%source, percent, "gain changed");
    }

    fn on_visualization_changed(&mut self, enabled: bool) {
        tracing::info!(enabled, "spectrum view toggled");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-source mixer with a live guitar spectrum", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play through a backend and log spectrum updates.
    Play {
        #[command(flatten)]
        session: SessionArgs,
        /// How long to play for.
        #[arg(long, default_value_t = 3.0)]
        seconds: f32,
        /// Backend to switch to part way through.
        #[arg(long)]
        switch_to: Option<BackendKind>,
        /// Delay before switching backends.
        #[arg(long, default_value_t = 1_000)]
        switch_after_ms: u64,
    },
    /// Play briefly and write the last rendered bars as JSON.
    Snapshot {
        #[command(flatten)]
        session: SessionArgs,
        /// How long to play before capturing.
        #[arg(long, default_value_t = 250)]
        after_ms: u64,
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Backend to start with: `graph` or `engine`.
    #[arg(short, long, default_value = "graph")]
    backend: BackendKind,
    /// Drum gain in [0, 1]; out-of-range values are clamped.
    #[arg(long, default_value_t = 1.0)]
    drums: f32,
    /// Guitar gain in [0, 1]; out-of-range values are clamped.
    #[arg(long, default_value_t = 1.0)]
    guitar: f32,
    #[arg(long, default_value_t = 512.0)]
    width: f32,
    #[arg(long, default_value_t = 128.0)]
    height: f32,
}

impl SessionArgs {
    fn controller(
        &self,
        config: AppConfig,
        observer: impl MixerObserver + 'static,
    ) -> camixer_core::Result<MixerController> {
        let mut config = config;
        config.mixer.backend = self.backend;
        config.validate()?;

        let factory = ReferenceBackends::new(config.clone());
        let mut controller = MixerController::new(config, factory, observer);
        controller.resize(Region::new(self.width, self.height));
        controller.set_gain(Source::Drums, GainLevel::clamped(self.drums));
        controller.set_gain(Source::Guitar, GainLevel::clamped(self.guitar));
        Ok(controller)
    }
}
