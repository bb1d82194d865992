use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::events::{DEFAULT_LOG_CAPACITY, DEFAULT_MIN_PLATE_CHARS, DEFAULT_RELOG_AFTER_SECS};
use crate::lines::DEFAULT_LINE_GAP_PX;
use crate::presence::{DEFAULT_CLEAR_AFTER_CYCLES, DEFAULT_HIDE_AFTER_CYCLES};
use crate::vote::{DEFAULT_HISTORY_CAPACITY, DEFAULT_VOTE_THRESHOLD};

const DEFAULT_API_ADDR: &str = "127.0.0.1:5001";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_PLATE_CONFIDENCE: f32 = 0.5;
const DEFAULT_CHAR_CONFIDENCE: f32 = 0.4;
const DEFAULT_CROP_PADDING: u32 = 15;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CHAR_INPUT_SIZE: u32 = 320;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_SCAN_INTERVAL: u64 = 3;
const DEFAULT_MIN_TOP_CHARS: usize = 2;

#[derive(Debug, Deserialize, Default)]
struct ReaderConfigFile {
    api: Option<ApiConfigFile>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorSettings>,
    stabilizer: Option<StabilizerSettings>,
    stream: Option<StreamConfigFile>,
    upload_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    path: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub api_addr: String,
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub stabilizer: StabilizerSettings,
    pub stream: StreamSettings,
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Source to open at startup. `None` idles until one is loaded.
    pub path: Option<String>,
    /// Playback pacing for file-backed sources.
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
}

/// Detector collaborators and the thresholds applied to their output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub plate_model: Option<PathBuf>,
    pub char_model: Option<PathBuf>,
    pub plate_confidence: f32,
    pub char_confidence: f32,
    /// Margin added around each plate box before character detection.
    pub crop_padding: u32,
    pub input_size: u32,
    pub char_input_size: u32,
    pub iou_threshold: f32,
    /// Class names of the plate model, by class id.
    pub plate_labels: Vec<String>,
    /// Class names of the character model, by class id.
    pub char_labels: Vec<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            plate_model: None,
            char_model: None,
            plate_confidence: DEFAULT_PLATE_CONFIDENCE,
            char_confidence: DEFAULT_CHAR_CONFIDENCE,
            crop_padding: DEFAULT_CROP_PADDING,
            input_size: DEFAULT_INPUT_SIZE,
            char_input_size: DEFAULT_CHAR_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            plate_labels: vec!["plate".to_string()],
            char_labels: crate::labels::known_labels().map(str::to_string).collect(),
        }
    }
}

/// Knobs of the stabilization layer. Defaults match the tuned deployment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StabilizerSettings {
    /// Readings remembered per plate row.
    pub history_capacity: usize,
    /// Agreeing readings needed for a row to be trusted.
    pub vote_threshold: usize,
    /// Vertical spread (px) separating one-row from two-row plates.
    pub line_gap_px: f32,
    /// Minimum stabilized top-row length before a plate is shown or logged.
    pub min_top_chars: usize,
    /// A logged reading must be longer than this, spaces excluded.
    pub min_plate_chars: usize,
    pub clear_after_cycles: u32,
    pub hide_after_cycles: u32,
    pub relog_after_secs: u64,
    pub log_capacity: usize,
    /// Run detection on every n-th frame.
    pub scan_interval: u64,
}

impl Default for StabilizerSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            vote_threshold: DEFAULT_VOTE_THRESHOLD,
            line_gap_px: DEFAULT_LINE_GAP_PX,
            min_top_chars: DEFAULT_MIN_TOP_CHARS,
            min_plate_chars: DEFAULT_MIN_PLATE_CHARS,
            clear_after_cycles: DEFAULT_CLEAR_AFTER_CYCLES,
            hide_after_cycles: DEFAULT_HIDE_AFTER_CYCLES,
            relog_after_secs: DEFAULT_RELOG_AFTER_SECS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl StabilizerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(anyhow!("stabilizer.history_capacity must be greater than zero"));
        }
        if self.vote_threshold == 0 || self.vote_threshold > self.history_capacity {
            return Err(anyhow!(
                "stabilizer.vote_threshold must be between 1 and history_capacity ({})",
                self.history_capacity
            ));
        }
        if !(self.line_gap_px.is_finite() && self.line_gap_px >= 0.0) {
            return Err(anyhow!("stabilizer.line_gap_px must be a non-negative number"));
        }
        if self.hide_after_cycles > self.clear_after_cycles {
            return Err(anyhow!(
                "stabilizer.hide_after_cycles must not exceed clear_after_cycles"
            ));
        }
        if self.log_capacity == 0 {
            return Err(anyhow!("stabilizer.log_capacity must be greater than zero"));
        }
        if self.scan_interval == 0 {
            return Err(anyhow!("stabilizer.scan_interval must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::from_file(ReaderConfigFile::default())
    }
}

impl ReaderConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PLATE_READER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ReaderConfigFile) -> Self {
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let source = SourceSettings {
            path: file.source.as_ref().and_then(|source| source.path.clone()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
        };
        let stream = StreamSettings {
            jpeg_quality: file
                .stream
                .and_then(|stream| stream.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        };
        Self {
            api_addr,
            source,
            detector: file.detector.unwrap_or_default(),
            stabilizer: file.stabilizer.unwrap_or_default(),
            stream,
            upload_dir: file
                .upload_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("PLATE_READER_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(path) = non_empty_env("PLATE_READER_SOURCE") {
            self.source.path = Some(path);
        }
        if let Some(path) = non_empty_env("PLATE_READER_PLATE_MODEL") {
            self.detector.plate_model = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("PLATE_READER_CHAR_MODEL") {
            self.detector.char_model = Some(PathBuf::from(path));
        }
        if let Some(dir) = non_empty_env("PLATE_READER_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(conf) = non_empty_env("PLATE_READER_PLATE_CONF") {
            self.detector.plate_confidence = conf
                .parse()
                .map_err(|_| anyhow!("PLATE_READER_PLATE_CONF must be a number"))?;
        }
        if let Some(conf) = non_empty_env("PLATE_READER_CHAR_CONF") {
            self.detector.char_confidence = conf
                .parse()
                .map_err(|_| anyhow!("PLATE_READER_CHAR_CONF must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("detector.plate_confidence", self.detector.plate_confidence),
            ("detector.char_confidence", self.detector.char_confidence),
            ("detector.iou_threshold", self.detector.iou_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(anyhow!("{} must be in (0, 1], got {}", name, value));
            }
        }
        if self.detector.input_size == 0 || self.detector.char_input_size == 0 {
            return Err(anyhow!("detector input sizes must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source.target_fps must be >= 1"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!("stream.jpeg_quality must be in 1..=100"));
        }
        self.stabilizer.validate()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<ReaderConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ReaderConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.api_addr, DEFAULT_API_ADDR);
        assert_eq!(cfg.stabilizer.vote_threshold, 7);
        assert_eq!(cfg.stabilizer.history_capacity, 10);
        assert_eq!(cfg.detector.crop_padding, 15);
        assert_eq!(cfg.detector.char_labels.len(), 130);
    }

    #[test]
    fn rejects_vote_threshold_above_capacity() {
        let settings = StabilizerSettings {
            vote_threshold: 11,
            ..StabilizerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_hide_after_clear() {
        let settings = StabilizerSettings {
            hide_after_cycles: 12,
            ..StabilizerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_stabilizer_section_keeps_other_defaults() {
        let file: ReaderConfigFile =
            serde_json::from_str(r#"{"stabilizer": {"scan_interval": 2}}"#).unwrap();
        let cfg = ReaderConfig::from_file(file);
        assert_eq!(cfg.stabilizer.scan_interval, 2);
        assert_eq!(cfg.stabilizer.log_capacity, 15);
    }
}
