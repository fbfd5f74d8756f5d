use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::PipelineError;
use crate::relay::cache::key;
use crate::relay::model::InferTask;
use crate::relay::scratch::ScratchAudio;
use crate::relay::types::{
    DetectionResponse, SpeechResponse, Task, TaskParams, TranslationRecord,
};
use crate::relay::AppState;

pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// Fixed accounting constant added for the translation stage of the two-step
/// flow. The measured stage-2 latency is deliberately not used; existing
/// callers rely on this number.
pub const TRANSLATE_STAGE_OVERHEAD_SECS: f64 = 0.1;

fn validate_audio(audio: &[u8]) -> Result<(), PipelineError> {
    if audio.is_empty() {
        return Err(PipelineError::Validation(
            "No audio file provided".to_string(),
        ));
    }
    if audio.len() > MAX_AUDIO_BYTES {
        return Err(PipelineError::Validation(
            "File too large (max 25MB)".to_string(),
        ));
    }
    Ok(())
}

/// Single-step flow: transcribe, or the model's native translate-to-English.
/// The cache key is built before any scratch file or worker is touched, so a
/// hit short-circuits everything downstream.
pub async fn process_audio(
    state: &AppState,
    audio: Vec<u8>,
    params: TaskParams,
) -> Result<SpeechResponse, PipelineError> {
    validate_audio(&audio)?;
    if params.task == Task::Translate && params.target_language != "en" {
        return Err(PipelineError::Unsupported(
            "Whisper can only translate TO English. For other languages, use transcribe then \
             external translation."
                .to_string(),
        ));
    }

    let cache_key = key::audio_key(&audio, &params);
    state
        .cache
        .get_or_compute(&cache_key, state.settings.cache_ttl, || {
            run_inference(state, audio, params)
        })
        .await
}

async fn run_inference(
    state: &AppState,
    audio: Vec<u8>,
    params: TaskParams,
) -> Result<SpeechResponse, PipelineError> {
    let model = Arc::clone(&state.model);
    let task = match params.task {
        Task::Translate => InferTask::Translate,
        Task::Transcribe | Task::TranslateToLanguage => InferTask::Transcribe,
    };
    let source = params.source_language.clone();

    let started = Instant::now();
    let raw = state
        .pool
        .submit(move || {
            let scratch = ScratchAudio::write(&audio)?;
            model.infer(scratch.path(), task, source.as_deref())
        })
        .await
        .map_err(PipelineError::Inference)?
        .map_err(PipelineError::Inference)?;
    let processing_time = started.elapsed().as_secs_f64();

    Ok(SpeechResponse {
        text: raw.text.trim().to_string(),
        detected_language: raw.language,
        segments: params.return_segments.then_some(raw.segments),
        processing_time,
        task: params.task,
    })
}

/// Language detection: same offload machinery as the single-step flow but
/// without the result cache, and only a truncated text preview is returned.
pub async fn detect_language(
    state: &AppState,
    audio: Vec<u8>,
) -> Result<DetectionResponse, PipelineError> {
    validate_audio(&audio)?;

    let model = Arc::clone(&state.model);
    let raw = state
        .pool
        .submit(move || {
            let scratch = ScratchAudio::write(&audio)?;
            model.infer(scratch.path(), InferTask::Transcribe, None)
        })
        .await
        .map_err(PipelineError::Inference)?
        .map_err(PipelineError::Inference)?;

    Ok(DetectionResponse {
        detected_language: raw.language,
        confidence: "high",
        text_preview: preview(raw.text.trim()),
    })
}

const PREVIEW_CHARS: usize = 100;

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Two-step flow: transcribe with the full cache machinery, then translate
/// the text to the target language under an independent cache key. When the
/// target matches the detected source the translation stage is skipped
/// entirely and the transcription is returned verbatim.
pub async fn translate_to_language(
    state: &AppState,
    audio: Vec<u8>,
    source_language: Option<String>,
    target_language: String,
    return_segments: bool,
) -> Result<SpeechResponse, PipelineError> {
    let params = TaskParams {
        source_language,
        target_language: "en".to_string(),
        task: Task::Transcribe,
        return_segments,
    };
    let transcription = process_audio(state, audio, params).await?;

    let text = if transcription.detected_language.as_deref() == Some(target_language.as_str()) {
        transcription.text.clone()
    } else {
        let source = transcription
            .detected_language
            .clone()
            .unwrap_or_else(|| "auto".to_string());
        let record = translate_text(state, &transcription.text, &source, &target_language).await?;
        record.translated_text
    };

    // Segments stay untranslated; they are not re-aligned to the output text.
    Ok(SpeechResponse {
        text,
        detected_language: transcription.detected_language,
        segments: transcription.segments,
        processing_time: transcription.processing_time + TRANSLATE_STAGE_OVERHEAD_SECS,
        task: Task::TranslateToLanguage,
    })
}

/// Text translation with its own key space, shared by /translate_text and
/// the second stage of the two-step flow.
pub async fn translate_text(
    state: &AppState,
    text: &str,
    source: &str,
    target: &str,
) -> Result<TranslationRecord, PipelineError> {
    let cache_key = key::text_key(text, source, target);
    state
        .cache
        .get_or_compute(&cache_key, state.settings.cache_ttl, || async {
            let started = Instant::now();
            let raw = state
                .translator
                .translate(text, source, target)
                .await
                .map_err(PipelineError::Translation)?;
            let elapsed = started.elapsed().as_secs_f64();
            debug!(elapsed, source, target, "translation backend call finished");

            Ok(TranslationRecord {
                translated_text: raw.text,
                source_language: source.to_string(),
                target_language: target.to_string(),
                detected_language: raw.detected_source.or_else(|| Some(source.to_string())),
                processing_time: elapsed,
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::*;
    use crate::relay::cache::store::MemoryStore;
    use crate::relay::cache::ResultCache;
    use crate::relay::model::{InferTask, RawTranscript, SpeechModel};
    use crate::relay::pool::InferencePool;
    use crate::relay::translate::{RawTranslation, TextTranslator};
    use crate::relay::types::Segment;
    use crate::relay::{AppState, RuntimeSettings};

    pub(crate) struct StubModel {
        pub calls: AtomicUsize,
        pub language: &'static str,
        pub text: String,
    }

    impl StubModel {
        fn new(language: &'static str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                language,
                text: text.to_string(),
            })
        }
    }

    impl SpeechModel for StubModel {
        fn infer(
            &self,
            audio: &Path,
            _task: InferTask,
            _source_language: Option<&str>,
        ) -> Result<RawTranscript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(audio.exists(), "scratch file must exist during inference");
            Ok(RawTranscript {
                text: self.text.clone(),
                language: Some(self.language.to_string()),
                segments: vec![Segment {
                    id: 0,
                    start: 0.0,
                    end: 1.0,
                    text: self.text.trim().to_string(),
                }],
            })
        }
    }

    pub(crate) struct StubTranslator {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl StubTranslator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl TextTranslator for StubTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: &str,
            target: &str,
        ) -> Result<RawTranslation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("backend down"));
            }
            Ok(RawTranslation {
                text: format!("[{target}] {text}"),
                detected_source: Some("es".to_string()),
            })
        }
    }

    fn state(model: Arc<StubModel>, translator: Arc<StubTranslator>) -> AppState {
        AppState {
            model,
            pool: Arc::new(InferencePool::new(4)),
            cache: ResultCache::new(Arc::new(MemoryStore::default())),
            translator,
            settings: Arc::new(RuntimeSettings {
                model_name: "stub".to_string(),
                device: "cpu".to_string(),
                gpu_available: false,
                cache_ttl: 60,
            }),
        }
    }

    fn transcribe_params() -> TaskParams {
        TaskParams {
            source_language: None,
            target_language: "en".to_string(),
            task: Task::Transcribe,
            return_segments: false,
        }
    }

    #[tokio::test]
    async fn transcribe_hits_cache_on_repeat() {
        let model = StubModel::new("en", " hello world ");
        let state = state(Arc::clone(&model), StubTranslator::new());

        let first = process_audio(&state, b"wav".to_vec(), transcribe_params())
            .await
            .unwrap();
        assert_eq!(first.text, "hello world");
        assert_eq!(first.detected_language.as_deref(), Some("en"));
        assert_eq!(first.task, Task::Transcribe);
        assert!(first.segments.is_none());

        let second = process_audio(&state, b"wav".to_vec(), transcribe_params())
            .await
            .unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn return_segments_changes_key_and_payload() {
        let model = StubModel::new("en", "hello");
        let state = state(Arc::clone(&model), StubTranslator::new());

        let mut params = transcribe_params();
        params.return_segments = true;
        let with_segments = process_audio(&state, b"wav".to_vec(), params)
            .await
            .unwrap();
        assert_eq!(with_segments.segments.unwrap().len(), 1);

        let without = process_audio(&state, b"wav".to_vec(), transcribe_params())
            .await
            .unwrap();
        assert!(without.segments.is_none());
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_audio_is_rejected_before_any_work() {
        let model = StubModel::new("en", "hello");
        let state = state(Arc::clone(&model), StubTranslator::new());

        let err = process_audio(&state, Vec::new(), transcribe_params())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_audio_is_rejected() {
        let model = StubModel::new("en", "hello");
        let state = state(Arc::clone(&model), StubTranslator::new());

        let err = process_audio(&state, vec![0; MAX_AUDIO_BYTES + 1], transcribe_params())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn native_translate_rejects_non_english_target() {
        let model = StubModel::new("en", "hello");
        let state = state(Arc::clone(&model), StubTranslator::new());

        let params = TaskParams {
            source_language: None,
            target_language: "fr".to_string(),
            task: Task::Translate,
            return_segments: false,
        };
        let err = process_audio(&state, b"wav".to_vec(), params)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unsupported(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inference_failure_leaves_cache_empty() {
        struct FailingModel;
        impl SpeechModel for FailingModel {
            fn infer(
                &self,
                _audio: &Path,
                _task: InferTask,
                _source_language: Option<&str>,
            ) -> Result<RawTranscript> {
                Err(anyhow!("decoder exploded"))
            }
        }

        let state = AppState {
            model: Arc::new(FailingModel),
            pool: Arc::new(InferencePool::new(1)),
            cache: ResultCache::new(Arc::new(MemoryStore::default())),
            translator: StubTranslator::new(),
            settings: Arc::new(RuntimeSettings {
                model_name: "stub".to_string(),
                device: "cpu".to_string(),
                gpu_available: false,
                cache_ttl: 60,
            }),
        };

        let err = process_audio(&state, b"wav".to_vec(), transcribe_params())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
        let err = process_audio(&state, b"wav".to_vec(), transcribe_params())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[tokio::test]
    async fn matching_target_language_skips_translation() {
        let model = StubModel::new("en", "already english");
        let translator = StubTranslator::new();
        let state = state(Arc::clone(&model), Arc::clone(&translator));

        let response = translate_to_language(&state, b"wav".to_vec(), None, "en".to_string(), true)
            .await
            .unwrap();

        assert_eq!(response.text, "already english");
        assert_eq!(response.task, Task::TranslateToLanguage);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
        assert!(response.processing_time >= TRANSLATE_STAGE_OVERHEAD_SECS);
    }

    #[tokio::test]
    async fn mismatched_target_language_translates_and_caches() {
        let model = StubModel::new("es", "hola mundo");
        let translator = StubTranslator::new();
        let state = state(Arc::clone(&model), Arc::clone(&translator));

        let response = translate_to_language(&state, b"wav".to_vec(), None, "en".to_string(), true)
            .await
            .unwrap();

        assert_eq!(response.text, "[en] hola mundo");
        assert_eq!(response.detected_language.as_deref(), Some("es"));
        // Segments keep the original language.
        assert_eq!(response.segments.unwrap()[0].text, "hola mundo");

        let again = translate_to_language(&state, b"wav".to_vec(), None, "en".to_string(), true)
            .await
            .unwrap();
        assert_eq!(again.text, "[en] hola mundo");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stage_two_failure_keeps_stage_one_cached() {
        let model = StubModel::new("es", "hola");
        let translator = StubTranslator::failing();
        let state = state(Arc::clone(&model), Arc::clone(&translator));

        let err = translate_to_language(&state, b"wav".to_vec(), None, "en".to_string(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Translation(_)));

        let err = translate_to_language(&state, b"wav".to_vec(), None, "en".to_string(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Translation(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn detection_is_uncached_and_truncates_preview() {
        let long_text = "x".repeat(150);
        let model = StubModel::new("de", &long_text);
        let state = state(Arc::clone(&model), StubTranslator::new());

        let detection = detect_language(&state, b"wav".to_vec()).await.unwrap();
        assert_eq!(detection.detected_language.as_deref(), Some("de"));
        assert_eq!(detection.confidence, "high");
        assert_eq!(detection.text_preview, format!("{}...", "x".repeat(100)));

        detect_language(&state, b"wav".to_vec()).await.unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_text_preview_is_untouched() {
        let model = StubModel::new("en", "short");
        let state = state(model, StubTranslator::new());

        let detection = detect_language(&state, b"wav".to_vec()).await.unwrap();
        assert_eq!(detection.text_preview, "short");
    }

    #[tokio::test]
    async fn concurrent_identical_requests_compute_at_most_once_each() {
        let model = StubModel::new("en", "contended");
        let state = state(Arc::clone(&model), StubTranslator::new());

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move {
                    process_audio(&state, b"same wav".to_vec(), transcribe_params()).await
                })
            })
            .collect();

        let mut texts = Vec::new();
        for task in tasks {
            let response = task.await.unwrap().unwrap();
            texts.push((response.text, response.detected_language));
        }

        assert!(texts.iter().all(|t| t == &texts[0]));
        let calls = model.calls.load(Ordering::SeqCst);
        assert!((1..=50).contains(&calls), "unexpected call count {calls}");
    }

    #[tokio::test]
    async fn translate_text_is_cached_per_language_pair() {
        let model = StubModel::new("en", "unused");
        let translator = StubTranslator::new();
        let state = state(model, Arc::clone(&translator));

        let first = translate_text(&state, "hola", "es", "en").await.unwrap();
        assert_eq!(first.translated_text, "[en] hola");
        assert_eq!(first.detected_language.as_deref(), Some("es"));

        let second = translate_text(&state, "hola", "es", "en").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);

        translate_text(&state, "hola", "es", "fr").await.unwrap();
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }
}
