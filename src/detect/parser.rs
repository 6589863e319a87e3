//! Tolerant conversion of model text into a `DetectionResult`.
//!
//! The backend is a language model; its reply usually contains a JSON object
//! with `objects` and `explanation`, often wrapped in prose or a code fence,
//! and sometimes no JSON at all. Parsing never fails: anything that cannot be
//! decoded becomes a placeholder result carrying the raw text.

use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use super::result::{DetectedObject, DetectionResult, DEFAULT_CONFIDENCE};

/// Placeholder when the reply contains no JSON object.
pub const NO_JSON_LABEL: &str = "Multiple objects detected";
pub const NO_JSON_CONFIDENCE: f32 = 0.9;

/// Placeholder when a JSON-looking substring fails to decode.
pub const DECODE_FAILURE_LABEL: &str = "Objects detected";
pub const DECODE_FAILURE_CONFIDENCE: f32 = 0.85;

/// Turns raw backend text into a result. Implementations must not fail.
pub trait ResultParser: Send + Sync {
    fn parse(&self, raw: &str) -> DetectionResult;
}

/// Greedy `{ ... }` extraction followed by a lenient structural decode.
#[derive(Clone, Copy, Debug, Default)]
pub struct LenientParser;

impl ResultParser for LenientParser {
    fn parse(&self, raw: &str) -> DetectionResult {
        let Some(candidate) = extract_json_object(raw) else {
            log::warn!("model reply contained no JSON object; using text fallback");
            return DetectionResult::placeholder(NO_JSON_LABEL, NO_JSON_CONFIDENCE, raw);
        };
        match decode(candidate) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("model reply JSON did not decode ({}); using fallback", err);
                DetectionResult::placeholder(DECODE_FAILURE_LABEL, DECODE_FAILURE_CONFIDENCE, raw)
            }
        }
    }
}

/// Parse with the default lenient parser.
pub fn parse(raw: &str) -> DetectionResult {
    LenientParser.parse(raw)
}

/// First `{` through last `}`, spanning newlines.
fn extract_json_object(raw: &str) -> Option<&str> {
    static OBJECT_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = OBJECT_RE.get_or_init(|| regex::Regex::new(r"\{[\s\S]*\}").unwrap());
    re.find(raw).map(|m| m.as_str())
}

#[derive(Debug, Deserialize)]
struct WireResult {
    objects: Vec<WireObject>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireObject {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
}

/// An `objects` list whose entries are all unusable counts as a failure; only
/// an explicit `[]` yields an empty result.
fn decode(candidate: &str) -> anyhow::Result<DetectionResult> {
    let wire: WireResult = serde_json::from_str(candidate)?;
    let listed = wire.objects.len();
    let objects: Vec<DetectedObject> = wire
        .objects
        .into_iter()
        .filter_map(|obj| {
            let confidence = confidence_value(obj.confidence.as_ref());
            DetectedObject::new(obj.name.unwrap_or_default(), confidence)
        })
        .collect();
    if listed > 0 && objects.is_empty() {
        return Err(anyhow::anyhow!("none of {} listed objects has a name", listed));
    }
    Ok(DetectionResult::new(
        objects,
        wire.explanation.unwrap_or_default(),
    ))
}

/// Numbers pass through; strings like `"0.8"` or `"80%"` are read leniently;
/// anything else gets the default. Clamping happens in f64 so values beyond
/// the f32 range still saturate at the bounds.
fn confidence_value(value: Option<&Value>) -> f32 {
    let wide = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    };
    match wide {
        Some(v) if !v.is_nan() => v.clamp(0.0, 1.0) as f32,
        _ => DEFAULT_CONFIDENCE,
    }
}
