//! Plate Reader
//!
//! Live license-plate recognition with temporal stabilization.
//!
//! # Architecture
//!
//! A single processing loop reads frames from a source and, on every scan
//! cycle, runs two detectors: one that localizes plates and one that finds
//! characters inside each plate crop. Raw detections are noisy from frame to
//! frame, so the crate stabilizes them before anything is reported:
//!
//! 1. **Line splitting**: character boxes become a top row (registration) and
//!    a bottom row (province), each read left to right.
//! 2. **Voting**: each row keeps a short history and only a reading that
//!    dominates it is trusted.
//! 3. **Presence hysteresis**: a plate must be missing for several cycles
//!    before its overlay is hidden and longer still before history is dropped.
//! 4. **Log deduplication**: a steady plate produces one event, not one per
//!    frame.
//!
//! # Module Structure
//!
//! - `labels`, `lines`, `vote`, `presence`, `events`: the stabilization core
//! - `session`, `scan`: per-cycle state and the two-stage detector driver
//! - `detect`: detector backends (scripted, ONNX via tract)
//! - `ingest`, `frame`, `overlay`, `stream`: frames in and JPEG frames out
//! - `pipeline`, `api`: the processing loop and its HTTP control surface
//! - `config`: layered configuration

pub mod api;
pub mod config;
pub mod detect;
pub mod events;
pub mod frame;
pub mod ingest;
pub mod labels;
pub mod lines;
pub mod overlay;
pub mod pipeline;
pub mod presence;
pub mod scan;
pub mod session;
pub mod stream;
pub mod vote;

pub use config::{DetectorSettings, ReaderConfig, StabilizerSettings};
pub use detect::{
    build_registry, scripted_registry, BackendRegistry, Detection, DetectionCapability,
    DetectionResult, DetectionScript, DetectorBackend, PixelBox, ScriptStep, ScriptedBackend,
};
pub use events::{LogDeduplicator, PlateEvent, PlateLog};
pub use ingest::{
    file_opener, FileConfig, FileSource, FrameSource, MemorySource, SourceOpener, SourceStats,
};
pub use labels::decode_label;
pub use lines::{split_lines, CharacterDetection, LineReadings};
pub use overlay::{BoxOverlay, OverlayItem, OverlayRenderer};
pub use pipeline::{LoadError, Pipeline, PipelineHandle, PipelineStats, StepOutcome};
pub use presence::{PresenceActions, PresenceTracker};
pub use scan::{PlateScan, ScanError, Scanner};
pub use session::{CycleReport, CycleSummary, Session};
pub use stream::{FeedEvent, FrameFeed, FrameSubscriber};
pub use vote::VoteBuffer;
