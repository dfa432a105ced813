use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use flipbook::audio::NullAudio;
use flipbook::cli::Args;
use flipbook::config::PlaybackConfig;
use flipbook::core::player::PlaybackController;
use flipbook::source::{SourceKind, TranscodeCommand};
use flipbook::store::FsStore;
use flipbook::surface::LogSurface;

fn main() -> Result<()> {
    let args = Args::parse();

    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    info!("Flipbook playback engine starting...");
    debug!("Command-line args: {:?}", args);

    let mut config = match &args.config {
        Some(path) => PlaybackConfig::load(path)?,
        None => PlaybackConfig::default(),
    };
    if let Some(lookahead) = args.lookahead_seconds {
        config.lookahead_seconds = lookahead;
    }
    if let Some(timeout) = args.decode_timeout_ms {
        config.decode_timeout_ms = timeout;
    }
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }

    let kind = match &args.pipe {
        Some(words) => {
            let (program, rest) = words
                .split_first()
                .context("--pipe requires a command")?;
            SourceKind::Piped(TranscodeCommand {
                program: program.clone(),
                args: rest.to_vec(),
            })
        }
        None => SourceKind::Rasterized,
    };

    let mut controller = PlaybackController::open(
        Arc::new(FsStore),
        &args.unit,
        kind,
        config,
        Box::new(LogSurface::default()),
        Box::new(NullAudio),
    )
    .with_context(|| format!("opening unit {}", args.unit.display()))?;

    let total = controller.total_frames();
    info!("Unit {}: {} frames", controller.id(), total);

    controller.play();

    if let Some(pause_at) = args.pause_at {
        std::thread::sleep(Duration::from_secs_f32(pause_at.max(0.0)));
        controller.pause();
        info!("Paused at frame {}", controller.current_frame());
        std::thread::sleep(Duration::from_secs(1));
        controller.play();
    }

    // Whole unit at nominal speed plus generous slack for slow decodes.
    let budget = Duration::from_secs_f64((total as f64 / 2.0).max(30.0));
    if !controller.wait_finished(budget) {
        anyhow::bail!("playback did not finish within {:?}", budget);
    }

    let stats = controller.stats();
    println!(
        "Finished: {} presented, {} placeholders, {} skipped, {} decode failures, last window {:.2} fps",
        stats.presented.load(Ordering::Relaxed),
        stats.placeholders.load(Ordering::Relaxed),
        stats.skipped.load(Ordering::Relaxed),
        stats.decode_failures.load(Ordering::Relaxed),
        stats.window_fps(),
    );

    Ok(())
}
