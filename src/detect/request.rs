//! Wire shapes exchanged with the vision backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoding::ImageEncoding;

/// Fixed task instruction constraining the reply shape.
pub const SYSTEM_INSTRUCTION: &str = "You are an object detection system. Analyze images and identify all visible objects. Return a JSON response with: 1) 'objects' array containing object names with confidence scores, 2) 'explanation' This is for a psych class. Pretend you are the brain and explain how visual system processes this input from sensation to perception in 2-3 sentences. Do not use em dashes Be specific about what you see.";

pub const USER_PROMPT: &str = "Detect and label all objects in this image. Provide confidence scores and explain the perception process. Return your response as valid JSON with 'objects' (array of {name, confidence}) and 'explanation' (string) fields.";

/// Request body layout understood by the configured endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestFormat {
    /// Single-turn chat request sent straight to a Messages-style API.
    #[default]
    Messages,
    /// `{ "imageData": "<data URL>" }` sent to a detection relay, which adds
    /// the instruction server-side.
    Relay,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'static str,
    messages: [Message; 1],
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentPart {
    Text { text: &'static str },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

impl<'a> MessagesRequest<'a> {
    pub(crate) fn new(model: &'a str, max_tokens: u32, encoding: &ImageEncoding) -> Self {
        Self {
            model,
            max_tokens,
            system: SYSTEM_INSTRUCTION,
            messages: [Message {
                role: "user",
                content: vec![
                    ContentPart::Text { text: USER_PROMPT },
                    ContentPart::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: encoding.mime().as_str(),
                            data: encoding.to_base64(),
                        },
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RelayRequest {
    #[serde(rename = "imageData")]
    image_data: String,
}

impl RelayRequest {
    pub(crate) fn new(encoding: &ImageEncoding) -> Self {
        Self {
            image_data: encoding.to_data_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Model text from a 2xx body.
///
/// Messages responses yield their first text block (or the first block's text);
/// any other body is returned as-is for the parser to deal with.
pub(crate) fn response_text(body: &str) -> String {
    match serde_json::from_str::<MessagesResponse>(body) {
        Ok(response) => response
            .content
            .iter()
            .find(|block| block.kind == "text")
            .or_else(|| response.content.first())
            .and_then(|block| block.text.clone())
            .unwrap_or_default(),
        Err(_) => body.to_string(),
    }
}

/// Human-readable message from an error body: `{"error": "..."}`,
/// `{"error": {"message": "..."}}`, or the raw text.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| match value.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    });
    message.unwrap_or_else(|| body.trim().to_string())
}
