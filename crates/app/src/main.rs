mod autoplay;
mod decode;

use std::{
    path::PathBuf,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use beatmap_core::{
    AppConfig, ChainSpec, Controls, EngineError, FrameCoordinator, FrameView, ManualClock,
    PlayField, PlaybackController, PlaybackState, Rect, RenderList, Renderer, ScoreStats,
    SoftwareBackend, Song, SystemClock, TimeSource, TrackDecoder,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{
    autoplay::Autoplayer,
    decode::{SynthDecoder, WavDecoder},
};

/// Width of the control panel pinned to the top-right corner.
const OVERLAY_WIDTH: f32 = 245.0;
const OVERLAY_HEIGHT: f32 = 320.0;
const DECODE_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> beatmap_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Songs => {
            for song in Song::ALL {
                println!("{song}");
            }
            Ok(())
        }
        Commands::Play(args) => {
            let report = run_session(&args)?;
            tracing::info!(
                score = report.score,
                hits = report.stats.hits,
                misses = report.stats.misses,
                ignored = report.stats.ignored,
                seconds = report.seconds,
                state = ?report.state,
                "session finished"
            );
            println!("{}: {} points", report.song, report.score);
            Ok(())
        }
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
#[command(author, version, about = "Audio-reactive rhythm game", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the selectable songs.
    Songs,
    /// Play a song headlessly with a simulated player.
    Play(PlayArgs),
}

#[derive(Args, Debug, Clone)]
struct PlayArgs {
    /// Song title, e.g. "City Escape".
    #[arg(short, long)]
    song: Option<Song>,
    /// Difficulty from 1 (sparse) to 10 (dense).
    #[arg(short, long)]
    difficulty: Option<u8>,
    /// Volume from 0 to 100.
    #[arg(long)]
    volume: Option<u8>,
    /// Hit window in seconds, 0.01 to 0.5.
    #[arg(long)]
    buffer_time: Option<f64>,
    /// JSON file with `controls` and `tuning` sections.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding `<Song>.wav` files. Without it a practice track is
    /// synthesised for the chosen song.
    #[arg(long)]
    audio_dir: Option<PathBuf>,
    /// Seconds of play before the session stops.
    #[arg(long, default_value_t = 20.0)]
    seconds: f64,
    /// Length of synthesised tracks in seconds.
    #[arg(long, default_value_t = 45.0)]
    track_seconds: f64,
    #[arg(long, default_value_t = 60)]
    fps: u32,
    #[arg(long, default_value_t = 1280.0)]
    width: f32,
    #[arg(long, default_value_t = 720.0)]
    height: f32,
    /// Seed for the synthesised track and the simulated player.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Fraction of beats the simulated player lets through.
    #[arg(long, default_value_t = 0.1)]
    miss_rate: f64,
    /// Pace frames against the wall clock instead of running flat out.
    #[arg(long)]
    realtime: bool,
}

#[derive(Debug, Clone)]
struct SessionReport {
    song: Song,
    score: u32,
    stats: ScoreStats,
    seconds: f64,
    state: PlaybackState,
}

enum SessionClock {
    Manual(ManualClock),
    System(SystemClock),
}

impl SessionClock {
    fn source(&self) -> Rc<dyn TimeSource> {
        match self {
            SessionClock::Manual(clock) => Rc::new(clock.clone()),
            SessionClock::System(clock) => Rc::new(clock.clone()),
        }
    }

    fn now(&self) -> f64 {
        match self {
            SessionClock::Manual(clock) => clock.now(),
            SessionClock::System(clock) => clock.now(),
        }
    }

    fn wait(&self, frame: f64) {
        match self {
            SessionClock::Manual(clock) => clock.advance(frame),
            SessionClock::System(_) => thread::sleep(Duration::from_secs_f64(frame)),
        }
    }
}

/// Logs a summary of what would be drawn.
#[derive(Debug, Default)]
struct TraceRenderer {
    list: RenderList,
    frames: u64,
}

impl Renderer for TraceRenderer {
    fn draw(&mut self, frame: &FrameView<'_>) -> beatmap_core::Result<()> {
        let beats = self.list.rebuild(frame).len();
        self.frames += 1;
        if self.frames % 60 == 0 {
            tracing::debug!(
                frame = self.frames,
                beats,
                score = frame.score,
                state = ?frame.state,
                time = frame.time,
                "frame"
            );
        }
        Ok(())
    }
}

fn session_controls(args: &PlayArgs, config: &AppConfig) -> Controls {
    let mut controls = config.controls.clone();
    if let Some(song) = args.song {
        controls.song = song;
    }
    if let Some(difficulty) = args.difficulty {
        controls.difficulty = difficulty;
    }
    if let Some(volume) = args.volume {
        controls.volume = volume;
    }
    if let Some(buffer_time) = args.buffer_time {
        controls.buffer_time = buffer_time;
    }
    controls.sanitized()
}

fn run_session(args: &PlayArgs) -> beatmap_core::Result<SessionReport> {
    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.tuning.validate()?;
    let mut controls = session_controls(args, &config);

    if args.fps == 0 {
        return Err(EngineError::InvalidConfig("fps must be positive".to_string()));
    }
    let frame = 1.0 / f64::from(args.fps);

    let clock = if args.realtime {
        SessionClock::System(SystemClock::new())
    } else {
        SessionClock::Manual(ManualClock::new())
    };

    let decoder: Box<dyn TrackDecoder> = match &args.audio_dir {
        Some(dir) => Box::new(WavDecoder::new(dir)),
        None => Box::new(SynthDecoder::new(args.seed, args.track_seconds)),
    };
    let playback = PlaybackController::new(
        Box::new(SoftwareBackend::new(clock.source())),
        decoder,
        ChainSpec::from_tuning(&config.tuning),
    )?;

    let field = PlayField::new(
        Rect::new(0.0, 0.0, args.width, args.height),
        Rect::new(args.width - OVERLAY_WIDTH, 0.0, OVERLAY_WIDTH, OVERLAY_HEIGHT),
    );
    let mut coordinator = FrameCoordinator::new(playback, &config.tuning, field, &controls);
    let mut renderer = TraceRenderer::default();
    let mut player = Autoplayer::new(args.seed, 0.08, 6.0, args.miss_rate);

    tracing::info!(
        song = %controls.song,
        difficulty = controls.difficulty,
        buffer_time = controls.buffer_time,
        "starting session"
    );
    coordinator.load(&mut controls)?;
    coordinator.play_pause();

    let decode_started = Instant::now();
    loop {
        let now = clock.now();
        let view = coordinator.tick(now, &mut controls);
        renderer.draw(&view)?;
        let clicks = player.plan(&view, now);
        for click in clicks {
            coordinator.pointer_down(click);
        }

        match coordinator.state() {
            PlaybackState::Ended => break,
            PlaybackState::Unloaded => {
                let failed = coordinator
                    .playback()
                    .context()
                    .map(|context| context.has_failed())
                    .unwrap_or(true);
                if failed {
                    return Err(EngineError::decode(controls.song, "track could not be loaded"));
                }
                if decode_started.elapsed() > DECODE_TIMEOUT {
                    return Err(EngineError::decode(controls.song, "timed out waiting for decode"));
                }
                // Give the decode thread a chance before spinning another frame.
                thread::sleep(Duration::from_millis(1));
            }
            _ => {}
        }

        if coordinator.engine_time() >= args.seconds {
            break;
        }
        clock.wait(frame);
    }

    Ok(SessionReport {
        song: controls.song,
        score: coordinator.score(),
        stats: coordinator.stats(),
        seconds: coordinator.engine_time(),
        state: coordinator.state(),
    })
}
