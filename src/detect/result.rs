use serde::{Deserialize, Serialize};

use crate::lines::CharacterDetection;

/// Output of one detector call on one image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Keep only detections at or above `threshold`.
    pub fn above(mut self, threshold: f32) -> Self {
        self.detections.retain(|d| d.confidence >= threshold);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }
}

/// One box in pixel coordinates of the image that was passed to the detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub class_id: usize,
    /// Raw class name as the model knows it (e.g. `A01`, `BKK`).
    #[serde(default)]
    pub label: String,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id: 0,
            label: String::new(),
        }
    }

    pub fn with_label(mut self, class_id: usize, label: impl Into<String>) -> Self {
        self.class_id = class_id;
        self.label = label.into();
        self
    }

    pub fn y_center(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    /// Character-line view of this box.
    pub fn to_character(&self) -> CharacterDetection {
        CharacterDetection::new(self.label.clone(), self.x1, self.y_center())
    }

    /// Integer box, truncated the way pixel indices are.
    pub fn pixel_box(&self) -> PixelBox {
        PixelBox {
            x1: self.x1.max(0.0) as u32,
            y1: self.y1.max(0.0) as u32,
            x2: self.x2.max(0.0) as u32,
            y2: self.y2.max(0.0) as u32,
        }
    }
}

/// Axis-aligned box in integer frame pixels, `x2`/`y2` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Grow by `padding` on every side, clamped to a `width` x `height` frame.
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> PixelBox {
        PixelBox {
            x1: self.x1.saturating_sub(padding),
            y1: self.y1.saturating_sub(padding),
            x2: self.x2.saturating_add(padding).min(width),
            y2: self.y2.saturating_add(padding).min(height),
        }
    }
}
