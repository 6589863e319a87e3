use serde::Serialize;

/// Confidence used when the model omits one or emits something unusable.
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Explanation substituted when the backend gives none.
pub const PLACEHOLDER_EXPLANATION: &str =
    "The visual system processes this image through multiple stages of neural processing.";

/// One labelled object. Fields are private so confidence is always clamped.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectedObject {
    name: String,
    confidence: f32,
}

impl DetectedObject {
    /// Returns `None` for blank names. Confidence is clamped to `[0, 1]`;
    /// NaN becomes `DEFAULT_CONFIDENCE`.
    pub fn new(name: impl Into<String>, confidence: f32) -> Option<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            confidence: clamp_confidence(confidence),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Confidence as a whole percentage for display.
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}

/// Objects in model emission order plus a non-empty explanation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    objects: Vec<DetectedObject>,
    explanation: String,
}

impl DetectionResult {
    pub fn new(objects: Vec<DetectedObject>, explanation: impl Into<String>) -> Self {
        let explanation = explanation.into();
        let explanation = if explanation.trim().is_empty() {
            PLACEHOLDER_EXPLANATION.to_string()
        } else {
            explanation
        };
        Self {
            objects,
            explanation,
        }
    }

    /// Single placeholder object with the raw text as explanation.
    pub(crate) fn placeholder(label: &str, confidence: f32, raw: &str) -> Self {
        let objects = DetectedObject::new(label, confidence).into_iter().collect();
        Self::new(objects, raw)
    }

    pub fn objects(&self) -> &[DetectedObject] {
        &self.objects
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

pub(crate) fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}
