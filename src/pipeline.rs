//! The processing loop and its control handle.
//!
//! `Pipeline` is the single owner of the `Session`. Every iteration it reads
//! one frame, runs a scan cycle on every `scan_interval`-th frame, draws the
//! current overlay and publishes the JPEG to the `FrameFeed`. Everything else
//! talks to it through a cloneable `PipelineHandle`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use crate::config::ReaderConfig;
use crate::events::PlateEvent;
use crate::frame::placeholder_frame;
use crate::ingest::{FrameSource, SourceOpener, SourceStats};
use crate::overlay::{BoxOverlay, OverlayRenderer};
use crate::scan::Scanner;
use crate::session::{CycleReport, Session};
use crate::stream::{encode_jpeg, FrameFeed, FrameSubscriber};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a `load_source` request was refused.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no source path given")]
    NoFile,
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("failed to open source: {0:#}")]
    Open(anyhow::Error),
    #[error("processing loop has stopped")]
    Stopped,
}

/// What one loop iteration did.
#[derive(Debug)]
pub enum StepOutcome {
    /// A frame was read and published; `report` is set on scan frames.
    Frame { report: Option<CycleReport> },
    Paused,
    /// No source loaded; the placeholder was published.
    Idle,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_read: u64,
    pub scan_cycles: u64,
    pub skipped_cycles: u64,
    pub events_logged: u64,
}

pub struct Pipeline {
    session: Session,
    scanner: Scanner,
    renderer: Box<dyn OverlayRenderer>,
    source: Option<Box<dyn FrameSource>>,
    incoming: Receiver<Box<dyn FrameSource>>,
    handle: PipelineHandle,
    scan_interval: u64,
    jpeg_quality: u8,
    frame_interval: Duration,
    frame_count: u64,
    placeholder_jpeg: Option<Vec<u8>>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: &ReaderConfig, scanner: Scanner, opener: SourceOpener) -> Self {
        let (sources, incoming) = mpsc::channel();
        let handle = PipelineHandle {
            sources,
            opener,
            log: Arc::new(Mutex::new(Vec::new())),
            paused: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            feed: FrameFeed::new(),
        };
        Self {
            session: Session::new(&config.stabilizer),
            scanner,
            renderer: Box::new(BoxOverlay::default()),
            source: None,
            incoming,
            handle,
            scan_interval: config.stabilizer.scan_interval.max(1),
            jpeg_quality: config.stream.jpeg_quality,
            frame_interval: Duration::from_secs(1) / config.source.target_fps.max(1),
            frame_count: 0,
            placeholder_jpeg: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Read counters of the current source, if one is loaded.
    pub fn source_stats(&self) -> Option<SourceStats> {
        self.source.as_ref().map(|source| source.stats())
    }

    /// Run one iteration with `now` as the wall-clock time of any event.
    pub fn step_at(&mut self, now: NaiveDateTime) -> Result<StepOutcome> {
        self.accept_new_source();

        if self.handle.is_paused() {
            return Ok(StepOutcome::Paused);
        }

        let Some(source) = self.source.as_mut() else {
            self.publish_placeholder()?;
            return Ok(StepOutcome::Idle);
        };

        let mut frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("source {} failed, idling: {:#}", source.describe(), err);
                self.source = None;
                self.session.reset();
                self.publish_placeholder()?;
                return Ok(StepOutcome::Idle);
            }
        };
        self.frame_count += 1;
        self.stats.frames_read += 1;

        let report = if self.frame_count % self.scan_interval == 0 {
            Some(self.scan_cycle(&frame, now))
        } else {
            None
        };

        self.renderer.render(&mut frame, self.session.overlay());
        self.handle.feed.publish(encode_jpeg(&frame, self.jpeg_quality)?);
        Ok(StepOutcome::Frame { report })
    }

    /// Loop until the handle requests shutdown, pacing frames to the target fps.
    pub fn run(mut self) {
        let mut last_health_log = Instant::now();
        log::info!("processing loop running");

        while !self.handle.shutdown.load(Ordering::SeqCst) {
            let started = Instant::now();
            let now = Local::now().naive_local();
            let pause = match self.step_at(now) {
                Ok(StepOutcome::Frame { .. }) => self.frame_interval,
                Ok(StepOutcome::Paused) | Ok(StepOutcome::Idle) => IDLE_POLL_INTERVAL,
                Err(err) => {
                    log::warn!("loop iteration failed: {:#}", err);
                    IDLE_POLL_INTERVAL
                }
            };

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let source = self
                    .source
                    .as_ref()
                    .map(|source| source.describe())
                    .unwrap_or_else(|| "none".to_string());
                let source_stats = self.source_stats().unwrap_or_default();
                log::info!(
                    "health source={} source_frames={} rewinds={} paused={} frames={} scans={} skipped={} events={}",
                    source,
                    source_stats.frames_read,
                    source_stats.rewinds,
                    self.handle.is_paused(),
                    self.stats.frames_read,
                    self.stats.scan_cycles,
                    self.stats.skipped_cycles,
                    self.stats.events_logged
                );
                last_health_log = Instant::now();
            }

            if let Some(rest) = pause.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }

        self.handle.feed.close();
        log::info!("processing loop stopped");
    }

    fn accept_new_source(&mut self) {
        while let Ok(source) = self.incoming.try_recv() {
            log::info!("source switched to {}", source.describe());
            self.session.reset();
            self.frame_count = 0;
            self.source = Some(source);
        }
    }

    fn scan_cycle(&mut self, frame: &image::RgbImage, now: NaiveDateTime) -> CycleReport {
        self.stats.scan_cycles += 1;
        let report = self.session.apply_cycle(self.scanner.scan(frame), now);
        match &report {
            CycleReport::Skipped { error } => {
                self.stats.skipped_cycles += 1;
                log::warn!("scan cycle skipped: {}", error);
            }
            CycleReport::Completed(summary) => {
                if summary.cleared_history && self.session.absent_cycles() == self.clear_edge() {
                    log::info!("no plate in view, readings cleared");
                }
                if !summary.events.is_empty() {
                    self.stats.events_logged += summary.events.len() as u64;
                    self.handle.publish_log(self.session.log().snapshot());
                }
            }
        }
        report
    }

    /// Absent-cycle count at which the clear first fires.
    fn clear_edge(&self) -> u32 {
        self.session.settings().clear_after_cycles.saturating_add(1)
    }

    fn publish_placeholder(&mut self) -> Result<()> {
        let jpeg = match &self.placeholder_jpeg {
            Some(jpeg) => jpeg.clone(),
            None => {
                let jpeg = encode_jpeg(&placeholder_frame(), self.jpeg_quality)?;
                self.placeholder_jpeg = Some(jpeg.clone());
                jpeg
            }
        };
        self.handle.feed.publish(jpeg);
        Ok(())
    }
}

/// Cloneable control surface of a running `Pipeline`.
#[derive(Clone)]
pub struct PipelineHandle {
    sources: Sender<Box<dyn FrameSource>>,
    opener: SourceOpener,
    log: Arc<Mutex<Vec<PlateEvent>>>,
    paused: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    feed: FrameFeed,
}

impl PipelineHandle {
    /// Logged plate events, newest first.
    pub fn current_log(&self) -> Vec<PlateEvent> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Open `path` and hand it to the loop; the session restarts and playback
    /// resumes. Validation errors leave the running source untouched.
    pub fn load_source(&self, path: &str) -> Result<(), LoadError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(LoadError::NoFile);
        }
        if !path.contains("://") && !Path::new(path).exists() {
            return Err(LoadError::NotFound(path.to_string()));
        }
        let source = (self.opener)(path).map_err(LoadError::Open)?;
        self.sources.send(source).map_err(|_| LoadError::Stopped)?;
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Flip the pause flag and return the new state.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> FrameSubscriber {
        self.feed.subscribe()
    }

    pub fn feed(&self) -> &FrameFeed {
        &self.feed
    }

    /// Ask the loop to stop; stream subscribers see the feed close.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn publish_log(&self, snapshot: Vec<PlateEvent>) {
        if let Ok(mut log) = self.log.lock() {
            *log = snapshot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{scripted_registry, Detection, DetectionScript, ScriptStep};
    use crate::ingest::MemorySource;
    use crate::stream::FeedEvent;
    use chrono::NaiveDate;
    use image::RgbImage;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap()
    }

    fn plate_script() -> DetectionScript {
        let labels = ["1", "A01", "A01", "1", "2", "3", "4"];
        let mut chars: Vec<Detection> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let x = 5.0 + 12.0 * i as f32;
                Detection::new(x, 5.0, x + 10.0, 25.0, 0.9).with_label(i, *label)
            })
            .collect();
        chars.push(Detection::new(20.0, 50.0, 70.0, 70.0, 0.9).with_label(99, "BKK"));
        DetectionScript {
            plates: vec![ScriptStep::Detections(vec![Detection::new(
                100.0, 100.0, 220.0, 160.0, 0.9,
            )])],
            characters: vec![ScriptStep::Detections(chars)],
        }
    }

    fn memory_opener() -> SourceOpener {
        Arc::new(|path: &str| {
            let frames = vec![RgbImage::new(320, 240); 4];
            Ok(Box::new(MemorySource::new(path, frames)?) as Box<dyn FrameSource>)
        })
    }

    fn pipeline(script: DetectionScript) -> Pipeline {
        let config = ReaderConfig::default();
        let scanner = Scanner::new(scripted_registry(script), &config.detector);
        Pipeline::new(&config, scanner, memory_opener())
    }

    #[test]
    fn idle_pipeline_publishes_placeholder() {
        let mut pipeline = pipeline(DetectionScript::default());
        assert!(matches!(pipeline.step_at(t0()).unwrap(), StepOutcome::Idle));
        let FeedEvent::Frame(jpeg) = pipeline.handle().subscribe().next_timeout(Duration::ZERO)
        else {
            panic!("no placeholder published");
        };
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 480));
    }

    #[test]
    fn scans_every_third_frame_and_logs_stable_reading() {
        let mut pipeline = pipeline(plate_script());
        let handle = pipeline.handle();
        handle.load_source("memory://gate").unwrap();

        let mut scans = 0;
        for _ in 0..21 {
            if let StepOutcome::Frame { report: Some(_) } = pipeline.step_at(t0()).unwrap() {
                scans += 1;
            }
        }
        assert_eq!(scans, 7);
        let log = handle.current_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "1กก1234 กรุงเทพมหานคร");
        assert_eq!(log[0].time, "09:15:00");
        assert_eq!(pipeline.stats().events_logged, 1);
    }

    #[test]
    fn paused_pipeline_reads_no_frames() {
        let mut pipeline = pipeline(DetectionScript::default());
        let handle = pipeline.handle();
        handle.load_source("memory://gate").unwrap();
        assert!(handle.toggle_pause());
        assert!(matches!(pipeline.step_at(t0()).unwrap(), StepOutcome::Paused));
        assert_eq!(pipeline.stats().frames_read, 0);
        assert!(!handle.toggle_pause());
        assert!(matches!(
            pipeline.step_at(t0()).unwrap(),
            StepOutcome::Frame { report: None }
        ));
    }

    #[test]
    fn loading_a_source_resets_session_and_resumes() {
        let mut pipeline = pipeline(plate_script());
        let handle = pipeline.handle();
        handle.load_source("memory://a").unwrap();
        for _ in 0..9 {
            pipeline.step_at(t0()).unwrap();
        }
        assert_eq!(pipeline.session().top_history().len(), 3);

        handle.toggle_pause();
        handle.load_source("memory://b").unwrap();
        assert!(!handle.is_paused());
        pipeline.step_at(t0()).unwrap();
        assert!(pipeline.session().top_history().is_empty());
    }

    #[test]
    fn source_stats_follow_the_loaded_source() {
        let mut pipeline = pipeline(DetectionScript::default());
        assert_eq!(pipeline.source_stats(), None);

        pipeline.handle().load_source("memory://loop").unwrap();
        for _ in 0..9 {
            pipeline.step_at(t0()).unwrap();
        }
        assert_eq!(
            pipeline.source_stats(),
            Some(SourceStats {
                frames_read: 9,
                rewinds: 2
            })
        );
    }

    #[test]
    fn load_source_validates_before_touching_the_loop() {
        let pipeline = pipeline(DetectionScript::default());
        let handle = pipeline.handle();
        assert!(matches!(handle.load_source("  "), Err(LoadError::NoFile)));
        assert!(matches!(
            handle.load_source("/no/such/clip.mp4"),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn plate_detector_failure_skips_cycle_but_streams() {
        let script = DetectionScript {
            plates: vec![ScriptStep::Failure {
                error: "device lost".into(),
            }],
            characters: Vec::new(),
        };
        let mut pipeline = pipeline(script);
        let handle = pipeline.handle();
        handle.load_source("memory://gate").unwrap();
        for _ in 0..6 {
            pipeline.step_at(t0()).unwrap();
        }
        assert_eq!(pipeline.stats().skipped_cycles, 2);
        assert_eq!(handle.feed().published(), 6);
    }
}
