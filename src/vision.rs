use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::app::{Frame, InferenceClient};
use crate::error::{BoxError, SessionError, INFERENCE_MESSAGE};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini request types
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Image { inline_data: InlineData },
    Text { text: String },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

/// Gemini response types
#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

fn build_request(frame: &Frame, instruction: &str) -> GeminiRequest {
    let data = base64::engine::general_purpose::STANDARD.encode(frame.bytes());
    GeminiRequest {
        contents: vec![Content {
            parts: vec![
                Part::Image {
                    inline_data: InlineData {
                        mime_type: frame.mime_type().to_string(),
                        data,
                    },
                },
                Part::Text {
                    text: instruction.to_string(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: 0.4,
            max_output_tokens: 2048,
        },
    }
}

/// Joined text of the first candidate, if any.
fn extract_text(response: GeminiResponse) -> Option<String> {
    let text = response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Gemini `generateContent` client for image + instruction queries.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    /// Shared with the settings UI so key changes apply to the next query.
    api_key: Arc<Mutex<String>>,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>, api_key: Arc<Mutex<String>>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.into(),
            api_key,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    fn current_key(&self) -> String {
        self.api_key
            .lock()
            .map(|key| key.clone())
            .unwrap_or_default()
    }

    async fn generate(&self, frame: &Frame, instruction: &str) -> Result<String, BoxError> {
        let api_key = self.current_key();
        if api_key.is_empty() {
            return Err("No Gemini API key configured".into());
        }

        // The key travels in a header so it never shows up in error URLs.
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let body = build_request(frame, instruction);

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("Gemini API error {status}: {text}").into());
        }

        let gemini_resp: GeminiResponse = resp.json().await?;
        extract_text(gemini_resp).ok_or_else(|| "Gemini returned no text".into())
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn query(&self, frame: Frame, instruction: String) -> Result<String, SessionError> {
        self.generate(&frame, &instruction).await.map_err(|e| {
            log::error!("Error generating content from Gemini: {e}");
            SessionError::InferenceFailed(Some(INFERENCE_MESSAGE.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_has_image_then_instruction() {
        let frame = Frame::jpeg(vec![1, 2, 3]);
        let json = serde_json::to_value(build_request(&frame, "Describe")).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[0]["inline_data"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "Describe");
        assert_eq!(json["generation_config"]["max_output_tokens"], 2048);
    }

    #[test]
    fn extracts_joined_trimmed_text() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":" Hay una silla"},{"text":" y una mesa. "}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).as_deref(), Some("Hay una silla y una mesa."));
    }

    #[test]
    fn empty_or_missing_candidates_yield_none() {
        let none: GeminiResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(extract_text(none).is_none());

        let blocked: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(extract_text(blocked).is_none());

        let blank: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)
                .unwrap();
        assert!(extract_text(blank).is_none());
    }

    #[tokio::test]
    async fn missing_key_maps_to_inference_failure() {
        let client = GeminiClient::new("gemini-2.5-flash", Arc::new(Mutex::new(String::new())));
        let err = client
            .query(Frame::jpeg(vec![0]), "hola".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), INFERENCE_MESSAGE);
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_key() {
        let key = "SECRET123";
        let client = GeminiClient::new("m", Arc::new(Mutex::new(key.to_string())))
            .with_base_url("http://127.0.0.1:1/v1beta/models");
        let err = client
            .generate(&Frame::jpeg(vec![0]), "hola")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("127.0.0.1"), "{message}");
        assert!(!message.contains(key), "{message}");
    }
}
