use anyhow::Result;
use image::RgbImage;

use crate::detect::result::DetectionResult;

/// What a backend can be asked to find.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionCapability {
    /// Whole-plate boxes in a full frame.
    PlateLocalization,
    /// Labelled character boxes in a plate crop.
    CharacterRecognition,
}

/// Detector backend trait.
///
/// Backends are black boxes to the stabilization layer: they receive an RGB
/// image and return boxes in that image's pixel coordinates. Confidence
/// filtering is applied again by the caller, so backends may return
/// low-confidence boxes.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on an image.
    fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
