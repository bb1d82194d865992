use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::Deserialize;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};

/// One scripted detector response.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Detections(Vec<Detection>),
    Failure { error: String },
}

/// Responses for both detector stages, as read from a JSON script file.
///
/// ```json
/// {
///   "plates": [[{"x1": 100, "y1": 200, "x2": 300, "y2": 280, "confidence": 0.9}], []],
///   "characters": [[{"x1": 10, "y1": 5, "x2": 20, "y2": 25, "label": "A01"}]]
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DetectionScript {
    #[serde(default)]
    pub plates: Vec<ScriptStep>,
    #[serde(default)]
    pub characters: Vec<ScriptStep>,
}

impl DetectionScript {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| anyhow!("invalid detection script: {}", e))
    }
}

/// Backend that replays a fixed sequence of responses, cycling at the end.
///
/// An empty script never detects anything.
pub struct ScriptedBackend {
    name: String,
    capability: DetectionCapability,
    steps: Vec<ScriptStep>,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(name: &str, capability: DetectionCapability, steps: Vec<ScriptStep>) -> Self {
        Self {
            name: name.to_string(),
            capability,
            steps,
            cursor: 0,
        }
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        capability == self.capability
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<DetectionResult> {
        if self.steps.is_empty() {
            return Ok(DetectionResult::default());
        }
        let step = &self.steps[self.cursor];
        self.cursor = (self.cursor + 1) % self.steps.len();
        match step {
            ScriptStep::Detections(detections) => Ok(DetectionResult::new(detections.clone())),
            ScriptStep::Failure { error } => Err(anyhow!("{}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_steps_in_a_cycle() {
        let mut backend = ScriptedBackend::new(
            "plates",
            DetectionCapability::PlateLocalization,
            vec![
                ScriptStep::Detections(vec![Detection::new(0.0, 0.0, 5.0, 5.0, 0.9)]),
                ScriptStep::Detections(vec![]),
                ScriptStep::Failure {
                    error: "model crashed".into(),
                },
            ],
        );
        let image = RgbImage::new(8, 8);

        assert_eq!(backend.detect(&image).unwrap().len(), 1);
        assert!(backend.detect(&image).unwrap().is_empty());
        let err = backend.detect(&image).unwrap_err();
        assert_eq!(err.to_string(), "model crashed");
        assert_eq!(backend.detect(&image).unwrap().len(), 1);
    }

    #[test]
    fn empty_script_detects_nothing() {
        let mut backend =
            ScriptedBackend::new("idle", DetectionCapability::PlateLocalization, Vec::new());
        assert!(backend.detect(&RgbImage::new(2, 2)).unwrap().is_empty());
        assert!(backend.supports(DetectionCapability::PlateLocalization));
        assert!(!backend.supports(DetectionCapability::CharacterRecognition));
    }

    #[test]
    fn parses_script_json() {
        let script = DetectionScript::from_json(
            r#"{
                "plates": [[{"x1": 1, "y1": 2, "x2": 3, "y2": 4, "confidence": 0.7}], [], {"error": "boom"}],
                "characters": [[{"x1": 1, "y1": 2, "x2": 3, "y2": 4, "label": "A01"}]]
            }"#,
        )
        .unwrap();
        assert_eq!(script.plates.len(), 3);
        assert!(matches!(&script.plates[1], ScriptStep::Detections(d) if d.is_empty()));
        assert!(matches!(&script.plates[2], ScriptStep::Failure { error } if error == "boom"));
        match &script.characters[0] {
            ScriptStep::Detections(d) => assert_eq!(d[0].label, "A01"),
            other => panic!("unexpected step {other:?}"),
        }
    }
}
