//! Frame ingestion sources.
//!
//! Sources hand decoded `RgbImage` frames to the processing loop one at a
//! time. File-backed sources loop: reaching the end of the file rewinds to
//! the first frame instead of ending the stream.
//!
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources and in-memory frame lists (testing)

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::RgbImage;

pub use file::{FileConfig, FileSource};

/// Sequential producer of frames.
pub trait FrameSource: Send {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    fn next_frame(&mut self) -> Result<RgbImage>;

    fn stats(&self) -> SourceStats;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    /// Times the source wrapped back to its first frame.
    pub rewinds: u64,
}

/// Opens a source for a path handed to the pipeline at runtime.
pub type SourceOpener = Arc<dyn Fn(&str) -> Result<Box<dyn FrameSource>> + Send + Sync>;

/// Opener backed by `FileSource`.
pub fn file_opener() -> SourceOpener {
    Arc::new(|path: &str| {
        let source = FileSource::open(FileConfig::new(path))?;
        Ok(Box::new(source) as Box<dyn FrameSource>)
    })
}

/// Replays a fixed list of frames, wrapping around at the end.
pub struct MemorySource {
    name: String,
    frames: Vec<RgbImage>,
    cursor: usize,
    stats: SourceStats,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, frames: Vec<RgbImage>) -> Result<Self> {
        if frames.is_empty() {
            return Err(anyhow!("memory source needs at least one frame"));
        }
        Ok(Self {
            name: name.into(),
            frames,
            cursor: 0,
            stats: SourceStats::default(),
        })
    }
}

impl FrameSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        if self.cursor == self.frames.len() {
            self.cursor = 0;
            self.stats.rewinds += 1;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        self.stats.frames_read += 1;
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn memory_source_rewinds() {
        let frames = vec![
            RgbImage::from_pixel(2, 2, Rgb([1, 1, 1])),
            RgbImage::from_pixel(2, 2, Rgb([2, 2, 2])),
        ];
        let mut source = MemorySource::new("clip", frames).unwrap();
        let firsts: Vec<u8> = (0..5)
            .map(|_| source.next_frame().unwrap().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(firsts, vec![1, 2, 1, 2, 1]);
        assert_eq!(
            source.stats(),
            SourceStats {
                frames_read: 5,
                rewinds: 2
            }
        );
    }

    #[test]
    fn memory_source_rejects_empty_list() {
        assert!(MemorySource::new("empty", Vec::new()).is_err());
    }

    #[test]
    fn file_opener_builds_stub_sources() {
        let opener = file_opener();
        let mut source = opener("stub://lobby").unwrap();
        assert_eq!(source.describe(), "stub://lobby");
        assert_eq!(source.next_frame().unwrap().width(), 640);
    }
}
