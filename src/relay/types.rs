use serde::{Deserialize, Serialize};

/// Inference task selected by the endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Transcribe,
    Translate,
    TranslateToLanguage,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Transcribe => "transcribe",
            Task::Translate => "translate",
            Task::TranslateToLanguage => "translate_to_language",
        }
    }
}

/// Options affecting the output of one audio request. Every recognized field
/// is explicit and defaulted by the handler that builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskParams {
    pub source_language: Option<String>,
    pub target_language: String,
    pub task: Task,
    pub return_segments: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: usize,
    /// Start of the segment in seconds.
    pub start: f64,
    /// End of the segment in seconds.
    pub end: f64,
    pub text: String,
}

/// Response shape shared by the three audio endpoints; also the payload
/// cached under the audio key space.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SpeechResponse {
    pub text: String,
    pub detected_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    pub processing_time: f64,
    pub task: Task,
}

#[derive(Deserialize, Debug)]
pub struct TextTranslationRequest {
    pub text: String,
    pub source_language: String,
    pub target_language: String,
}

/// Payload cached under the text key space. /translate_text returns it
/// verbatim; the two-step audio flow reads only `translated_text` from it,
/// so both flows share one key space without clashing shapes.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TranslationRecord {
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    #[serde(default)]
    pub processing_time: f64,
}

#[derive(Serialize, Debug, Clone)]
pub struct DetectionResponse {
    pub detected_language: Option<String>,
    /// The model does not expose a confidence score; this is a constant
    /// placeholder, not a computed value.
    pub confidence: &'static str,
    pub text_preview: String,
}
