mod client;
mod parser;
mod request;
mod result;

pub use client::{
    ApiCredential, AuthScheme, BackendResponse, BackendTransport, DetectionClient, UreqTransport,
};
pub use parser::{
    parse, LenientParser, ResultParser, DECODE_FAILURE_CONFIDENCE, DECODE_FAILURE_LABEL,
    NO_JSON_CONFIDENCE, NO_JSON_LABEL,
};
pub use request::{RequestFormat, SYSTEM_INSTRUCTION, USER_PROMPT};
pub use result::{DetectedObject, DetectionResult, DEFAULT_CONFIDENCE, PLACEHOLDER_EXPLANATION};
