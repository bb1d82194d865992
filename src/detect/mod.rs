mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::{DetectionScript, ScriptStep, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{Detection, DetectionResult, PixelBox};

use anyhow::Result;

use crate::config::DetectorSettings;

/// Build the registry the daemon runs with.
///
/// With `backend-tract` enabled and both model paths configured, the ONNX
/// models are loaded. Otherwise scripted backends that never detect anything
/// are registered so the loop still streams frames.
pub fn build_registry(settings: &DetectorSettings) -> Result<BackendRegistry> {
    if let Some(registry) = load_onnx_models(settings)? {
        return Ok(registry);
    }

    if settings.plate_model.is_some() || settings.char_model.is_some() {
        log::warn!(
            "detector models configured but not loaded (needs backend-tract and both model paths)"
        );
    }
    log::warn!("no detector models loaded; plates will never be detected");
    let mut registry = BackendRegistry::new();
    registry.register(ScriptedBackend::new(
        "idle-plates",
        DetectionCapability::PlateLocalization,
        Vec::new(),
    ));
    registry.register(ScriptedBackend::new(
        "idle-chars",
        DetectionCapability::CharacterRecognition,
        Vec::new(),
    ));
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn load_onnx_models(settings: &DetectorSettings) -> Result<Option<BackendRegistry>> {
    let (Some(plate_model), Some(char_model)) = (&settings.plate_model, &settings.char_model)
    else {
        return Ok(None);
    };
    let plates = TractBackend::load(
        "tract-plates",
        DetectionCapability::PlateLocalization,
        plate_model,
        settings.input_size,
        settings.plate_labels.clone(),
    )?
    .with_thresholds(settings.plate_confidence, settings.iou_threshold);
    let chars = TractBackend::load(
        "tract-chars",
        DetectionCapability::CharacterRecognition,
        char_model,
        settings.char_input_size,
        settings.char_labels.clone(),
    )?
    .with_thresholds(settings.char_confidence, settings.iou_threshold);

    let mut registry = BackendRegistry::new();
    registry.register(plates);
    registry.register(chars);
    Ok(Some(registry))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx_models(_settings: &DetectorSettings) -> Result<Option<BackendRegistry>> {
    Ok(None)
}

/// Registry of scripted backends replaying `script`.
pub fn scripted_registry(script: DetectionScript) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(ScriptedBackend::new(
        "scripted-plates",
        DetectionCapability::PlateLocalization,
        script.plates,
    ));
    registry.register(ScriptedBackend::new(
        "scripted-chars",
        DetectionCapability::CharacterRecognition,
        script.characters,
    ));
    registry
}
