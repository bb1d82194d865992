//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file and loops it: the end of
//! the file rewinds to the first frame. `stub://` paths produce synthetic
//! frames without touching the filesystem.
//!
//! The file source MUST NOT fetch remote URLs.

use std::path::Path;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::{PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};

/// Frames a synthetic source yields before it rewinds.
const DEFAULT_SYNTHETIC_FRAMES: u64 = 300;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "uploads/upload.mp4") or `stub://name`.
    pub path: String,
    /// Length of a synthetic clip, in frames.
    pub synthetic_frames: u64,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            synthetic_frames: DEFAULT_SYNTHETIC_FRAMES,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            log::info!("FileSource: opened {} (synthetic)", config.path);
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            });
        }
        if !Path::new(&config.path).is_file() {
            return Err(anyhow!("video file not found: {}", config.path));
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let source = FfmpegFileSource::new(config)?;
            Ok(Self {
                backend: FileBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "file ingestion requires the ingest-file-ffmpeg feature"
            ))
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => source.config.path.clone(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.path().to_string(),
        }
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => Ok(source.next_frame()),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats.clone(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    position: u64,
    stats: SourceStats,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            position: 0,
            stats: SourceStats::default(),
        }
    }

    fn next_frame(&mut self) -> RgbImage {
        if self.position >= self.config.synthetic_frames.max(1) {
            self.position = 0;
            self.stats.rewinds += 1;
            log::debug!("FileSource: {} rewound", self.config.path);
        }
        let shade = (self.position % 256) as u8;
        self.position += 1;
        self.stats.frames_read += 1;
        RgbImage::from_fn(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, |x, y| {
            Rgb([shade, (x % 256) as u8, (y % 256) as u8])
        })
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_urls_and_empty_paths() {
        assert!(FileSource::open(FileConfig::new("rtsp://cam/1")).is_err());
        assert!(FileSource::open(FileConfig::new("  ")).is_err());
    }

    #[test]
    fn rejects_missing_files() {
        let err = FileSource::open(FileConfig::new("/nonexistent/clip.mp4"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn synthetic_source_loops() {
        let mut source = FileSource::open(FileConfig {
            path: "stub://gate".to_string(),
            synthetic_frames: 3,
        })
        .unwrap();
        let shades: Vec<u8> = (0..7)
            .map(|_| source.next_frame().unwrap().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(shades, vec![0, 1, 2, 0, 1, 2, 0]);
        let stats = source.stats();
        assert_eq!(stats.frames_read, 7);
        assert_eq!(stats.rewinds, 2);
    }
}
