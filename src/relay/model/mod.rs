use std::path::Path;

use anyhow::Result;

use crate::relay::types::Segment;

pub mod whisper;

/// What the model is asked to do with one audio file. Native translation
/// only targets English; anything else is composed on top of `Transcribe`
/// by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferTask {
    Transcribe,
    Translate,
}

/// Raw model output before any response shaping.
#[derive(Debug, Clone)]
pub struct RawTranscript {
    pub text: String,
    pub language: Option<String>,
    pub segments: Vec<Segment>,
}

/// Black-box speech model contract. One call occupies one pool worker for
/// its full duration; implementations are only ever invoked from inside the
/// inference pool.
pub trait SpeechModel: Send + Sync {
    fn infer(
        &self,
        audio: &Path,
        task: InferTask,
        source_language: Option<&str>,
    ) -> Result<RawTranscript>;
}
