//! plate_replay - run a source through the pipeline offline
//!
//! Frames are processed back to back without pacing. The event clock
//! advances by one frame period per frame, so dedup timing matches a live
//! run at `--fps`. Accepted events are printed as JSON lines.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

use plate_reader::{
    build_registry, file_opener, scripted_registry, DetectionScript, Pipeline, ReaderConfig,
    Scanner, StepOutcome,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file or `stub://name`.
    #[arg(long, default_value = "stub://replay")]
    source: String,
    /// Number of frames to process.
    #[arg(long, default_value_t = 300)]
    frames: u64,
    /// Frame rate used to advance the event clock.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// JSON detection script replayed instead of the configured models.
    #[arg(long)]
    script: Option<PathBuf>,
    /// Config file (same format as PLATE_READER_CONFIG).
    #[arg(long, env = "PLATE_READER_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let cfg = match &args.config {
        Some(path) => ReaderConfig::load_from(path)?,
        None => ReaderConfig::default(),
    };
    let registry = match &args.script {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read script {}", path.display()))?;
            scripted_registry(DetectionScript::from_json(&raw)?)
        }
        None => build_registry(&cfg.detector)?,
    };

    let mut pipeline = Pipeline::new(&cfg, Scanner::new(registry, &cfg.detector), file_opener());
    pipeline
        .handle()
        .load_source(&args.source)
        .map_err(|err| anyhow!("{}", err))?;

    let start = Local::now().naive_local();
    let frame_ms = 1000 / i64::from(args.fps);
    for index in 0..args.frames {
        let now = start + chrono::Duration::milliseconds(index as i64 * frame_ms);
        if let StepOutcome::Frame {
            report: Some(report),
        } = pipeline.step_at(now)?
        {
            for event in report.events() {
                println!("{}", serde_json::to_string(event)?);
            }
        }
    }

    let stats = pipeline.stats();
    log::info!(
        "replayed {} frames: {} scans, {} skipped, {} events",
        stats.frames_read,
        stats.scan_cycles,
        stats.skipped_cycles,
        stats.events_logged
    );
    if let Some(source) = pipeline.source_stats() {
        log::info!("source wrapped {} times", source.rewinds);
    }
    Ok(())
}
