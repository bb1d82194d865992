//! Detection stage of a scan cycle.
//!
//! Runs the plate detector on a frame, crops each plate with padding, and
//! runs the character detector on every crop. Failures are typed by stage so
//! the caller can tell a lost cycle from a lost plate.

use image::RgbImage;
use thiserror::Error;

use crate::config::DetectorSettings;
use crate::detect::{BackendRegistry, DetectionCapability, PixelBox};
use crate::frame::crop_padded;
use crate::lines::CharacterDetection;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    /// The whole cycle is lost.
    #[error("plate detection failed: {0}")]
    PlateDetection(String),
    /// One plate is lost; other plates in the cycle are unaffected.
    #[error("character detection failed for plate {plate_index}: {reason}")]
    CharacterDetection { plate_index: usize, reason: String },
    #[error("plate {plate_index} has an empty crop")]
    EmptyCrop { plate_index: usize },
}

/// One plate found in a frame, with the outcome of its character stage.
#[derive(Clone, Debug)]
pub struct PlateScan {
    pub bbox: PixelBox,
    pub characters: Result<Vec<CharacterDetection>, ScanError>,
}

impl PlateScan {
    pub fn read(bbox: PixelBox, characters: Vec<CharacterDetection>) -> Self {
        Self {
            bbox,
            characters: Ok(characters),
        }
    }
}

/// Two-stage detector driver.
pub struct Scanner {
    registry: BackendRegistry,
    plate_confidence: f32,
    char_confidence: f32,
    crop_padding: u32,
}

impl Scanner {
    pub fn new(registry: BackendRegistry, settings: &DetectorSettings) -> Self {
        Self {
            registry,
            plate_confidence: settings.plate_confidence,
            char_confidence: settings.char_confidence,
            crop_padding: settings.crop_padding,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Run both detector stages on `frame`.
    pub fn scan(&self, frame: &RgbImage) -> Result<Vec<PlateScan>, ScanError> {
        let plates = self
            .registry
            .detect_with_capability(DetectionCapability::PlateLocalization, frame)
            .map_err(|e| ScanError::PlateDetection(format!("{:#}", e)))?
            .above(self.plate_confidence);

        Ok(plates
            .detections
            .iter()
            .enumerate()
            .map(|(plate_index, plate)| {
                let bbox = plate.pixel_box();
                PlateScan {
                    bbox,
                    characters: self.read_characters(frame, bbox, plate_index),
                }
            })
            .collect())
    }

    fn read_characters(
        &self,
        frame: &RgbImage,
        bbox: PixelBox,
        plate_index: usize,
    ) -> Result<Vec<CharacterDetection>, ScanError> {
        let crop = crop_padded(frame, &bbox, self.crop_padding)
            .ok_or(ScanError::EmptyCrop { plate_index })?;
        let chars = self
            .registry
            .detect_with_capability(DetectionCapability::CharacterRecognition, &crop)
            .map_err(|e| ScanError::CharacterDetection {
                plate_index,
                reason: format!("{:#}", e),
            })?
            .above(self.char_confidence);
        Ok(chars.detections.iter().map(|d| d.to_character()).collect())
    }
}
