use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Output of the external text translation backend.
#[derive(Debug, Clone)]
pub struct RawTranslation {
    pub text: String,
    pub detected_source: Option<String>,
}

/// Black-box text translation contract.
#[async_trait]
pub trait TextTranslator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<RawTranslation>;
}

/// Client for a LibreTranslate-compatible HTTP backend.
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranslator {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct TranslateCall<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize)]
struct TranslateReply {
    #[serde(rename = "translatedText")]
    translated_text: String,
    #[serde(rename = "detectedLanguage", default)]
    detected_language: Option<DetectedLanguage>,
}

#[derive(Deserialize)]
struct DetectedLanguage {
    language: String,
}

#[async_trait]
impl TextTranslator for HttpTranslator {
    #[tracing::instrument(level = "info", skip(self, text))]
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<RawTranslation> {
        let reply: TranslateReply = self
            .client
            .post(&self.endpoint)
            .json(&TranslateCall {
                q: text,
                source,
                target,
                format: "text",
            })
            .send()
            .await
            .context("translation backend unreachable")?
            .error_for_status()
            .context("translation backend rejected the request")?
            .json()
            .await
            .context("malformed translation backend response")?;

        Ok(RawTranslation {
            text: reply.translated_text,
            detected_source: reply.detected_language.map(|d| d.language),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TranslateReply;

    #[test]
    fn parses_reply_with_detection() {
        let reply: TranslateReply = serde_json::from_str(
            r#"{"translatedText":"Hello","detectedLanguage":{"confidence":92.0,"language":"es"}}"#,
        )
        .unwrap();
        assert_eq!(reply.translated_text, "Hello");
        assert_eq!(reply.detected_language.unwrap().language, "es");
    }

    #[test]
    fn parses_reply_without_detection() {
        let reply: TranslateReply =
            serde_json::from_str(r#"{"translatedText":"Hallo"}"#).unwrap();
        assert_eq!(reply.translated_text, "Hallo");
        assert!(reply.detected_language.is_none());
    }
}
