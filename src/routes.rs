use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bail_relay;
use crate::error::RelayResult;
use crate::relay::pipeline::{self, MAX_AUDIO_BYTES};
use crate::relay::types::{
    DetectionResponse, SpeechResponse, Task, TaskParams, TextTranslationRequest,
    TranslationRecord,
};
use crate::relay::{languages, AppState};

// Allow headroom above the validation cap so oversize uploads reach the
// explicit 400 check instead of a bare 413.
const BODY_LIMIT_BYTES: usize = MAX_AUDIO_BYTES + 2 * 1024 * 1024;

// As per https://developer.mozilla.org/en-US/docs/Web/Media/Formats/Containers#wave_wav
static VALID_WAV_MIME_TYPES: [&str; 4] =
    ["audio/wave", "audio/wav", "audio/x-wav", "audio/x-pn-wav"];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transcribe", post(handle_transcribe))
        .route("/translate", post(handle_translate))
        .route(
            "/translate_audio_to_language",
            post(handle_translate_audio_to_language),
        )
        .route("/detect_language", post(handle_detect_language))
        .route("/translate_text", post(handle_translate_text))
        .route("/health", get(handle_health))
        .route("/languages", get(handle_languages))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Recognized fields of the multipart audio form. Absent fields keep their
/// defaults; the pipeline rejects an absent file as empty audio.
#[derive(Debug, Default)]
struct AudioForm {
    audio: Vec<u8>,
    source_language: Option<String>,
    target_language: Option<String>,
    return_segments: bool,
}

async fn read_audio_form(mut multipart: Multipart) -> RelayResult<AudioForm> {
    let mut form = AudioForm::default();

    while let Some(field) = multipart.next_field().await? {
        if let Some(name) = field.name() {
            match name {
                "audio_file" => {
                    if field
                        .content_type()
                        .map_or(false, |content| !VALID_WAV_MIME_TYPES.contains(&content))
                    {
                        bail_relay!(
                            StatusCode::BAD_REQUEST,
                            "Invalid mime type in content-type header for audio_file field"
                        );
                    }
                    form.audio = field.bytes().await?.to_vec();
                }
                "source_language" => {
                    let value = field.text().await?;
                    if !value.is_empty() && value != "auto" {
                        form.source_language = Some(value);
                    }
                }
                "target_language" => {
                    let value = field.text().await?;
                    if !value.is_empty() {
                        form.target_language = Some(value);
                    }
                }
                "return_segments" => {
                    form.return_segments = parse_form_bool(&field.text().await?);
                }
                "return_language" => {
                    // Accepted for compatibility; the detected language is
                    // always part of the response.
                    let _ = field.text().await?;
                }
                _ => bail_relay!(StatusCode::BAD_REQUEST, "Unknown field {}", name),
            }
        }
    }

    Ok(form)
}

fn parse_form_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[axum_macros::debug_handler]
async fn handle_transcribe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> RelayResult<(StatusCode, Json<SpeechResponse>)> {
    let form = read_audio_form(multipart).await?;
    let params = TaskParams {
        source_language: form.source_language,
        target_language: form.target_language.unwrap_or_else(|| "en".to_string()),
        task: Task::Transcribe,
        return_segments: form.return_segments,
    };
    let response = pipeline::process_audio(&state, form.audio, params)
        .await
        .map_err(|err| err.into_http())?;
    Ok((StatusCode::OK, Json(response)))
}

#[axum_macros::debug_handler]
async fn handle_translate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> RelayResult<(StatusCode, Json<SpeechResponse>)> {
    let form = read_audio_form(multipart).await?;
    let params = TaskParams {
        source_language: form.source_language,
        target_language: form.target_language.unwrap_or_else(|| "en".to_string()),
        task: Task::Translate,
        return_segments: form.return_segments,
    };
    let response = pipeline::process_audio(&state, form.audio, params)
        .await
        .map_err(|err| err.into_http())?;
    Ok((StatusCode::OK, Json(response)))
}

#[axum_macros::debug_handler]
async fn handle_translate_audio_to_language(
    State(state): State<AppState>,
    multipart: Multipart,
) -> RelayResult<(StatusCode, Json<SpeechResponse>)> {
    let form = read_audio_form(multipart).await?;
    let target = form.target_language.unwrap_or_else(|| "en".to_string());
    let response = pipeline::translate_to_language(
        &state,
        form.audio,
        form.source_language,
        target,
        form.return_segments,
    )
    .await
    .map_err(|err| err.into_http())?;
    Ok((StatusCode::OK, Json(response)))
}

#[axum_macros::debug_handler]
async fn handle_detect_language(
    State(state): State<AppState>,
    multipart: Multipart,
) -> RelayResult<(StatusCode, Json<DetectionResponse>)> {
    let form = read_audio_form(multipart).await?;
    let response = pipeline::detect_language(&state, form.audio)
        .await
        .map_err(|err| err.into_http())?;
    Ok((StatusCode::OK, Json(response)))
}

#[axum_macros::debug_handler]
async fn handle_translate_text(
    State(state): State<AppState>,
    Json(req): Json<TextTranslationRequest>,
) -> RelayResult<(StatusCode, Json<TranslationRecord>)> {
    if req.text.trim().is_empty() {
        bail_relay!(StatusCode::BAD_REQUEST, "No text provided");
    }
    let record = pipeline::translate_text(
        &state,
        &req.text,
        &req.source_language,
        &req.target_language,
    )
    .await
    .map_err(|err| err.into_http())?;
    Ok((StatusCode::OK, Json(record)))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    device: String,
    gpu_available: bool,
    supported_tasks: [&'static str; 4],
}

#[axum_macros::debug_handler]
async fn handle_health(
    State(state): State<AppState>,
) -> RelayResult<(StatusCode, Json<HealthResponse>)> {
    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            model: state.settings.model_name.clone(),
            device: state.settings.device.clone(),
            gpu_available: state.settings.gpu_available,
            supported_tasks: [
                "transcribe",
                "translate",
                "translate_to_language",
                "detect_language",
            ],
        }),
    ))
}

#[derive(Serialize)]
struct LanguagesResponse {
    input_languages: &'static [&'static str],
    output_languages: [&'static str; 13],
    note: &'static str,
}

#[axum_macros::debug_handler]
async fn handle_languages() -> RelayResult<(StatusCode, Json<LanguagesResponse>)> {
    Ok((
        StatusCode::OK,
        Json(LanguagesResponse {
            input_languages: &languages::INPUT_LANGUAGES,
            output_languages: languages::OUTPUT_LANGUAGES,
            note: languages::LANGUAGES_NOTE,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::parse_form_bool;

    #[test]
    fn form_bool_accepts_common_spellings() {
        assert!(parse_form_bool("true"));
        assert!(parse_form_bool("True"));
        assert!(parse_form_bool("1"));
        assert!(!parse_form_bool("false"));
        assert!(!parse_form_bool(""));
        assert!(!parse_form_bool("0"));
    }
}
