use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::StoryError;
use crate::story::audio::AudioClip;
use crate::story::types::{CharacterReply, ContextMessage, SessionData};
use crate::utils::truncate_for_log;

const REQUEST_TIMEOUT_MS: u64 = 120_000;
const USER_AGENT: &str = concat!("storychat/", env!("CARGO_PKG_VERSION"));

/// The backend services the orchestrator talks to. Production code uses
/// [`HttpStoryBackend`]; tests inject scripted implementations.
#[async_trait]
pub trait StoryBackend: Send + Sync {
    /// Requests the seated characters' replies to a triggering message,
    /// given the full conversation context.
    async fn get_character_responses(
        &self,
        session_id: &str,
        message: &str,
        context: &[ContextMessage],
        temperature: Option<f32>,
    ) -> Result<Vec<CharacterReply>, StoryError>;

    /// Synthesizes one line of speech; the returned clip is playable audio.
    async fn synthesize_speech(
        &self,
        text: &str,
        voice: Option<&str>,
        model: &str,
        rate: i32,
        pitch: i32,
    ) -> Result<AudioClip, StoryError>;

    /// Asks the backend what the user would plausibly say next. Drives
    /// endless mode.
    async fn generate_auto_user_message(
        &self,
        session_id: &str,
        context: &[ContextMessage],
        temperature: Option<f32>,
    ) -> Result<String, StoryError>;

    /// Loads the session's seating and metadata. Consumed once at startup.
    async fn load_session(&self, session_id: &str) -> Result<SessionData, StoryError>;
}

/// JSON-over-HTTP implementation against the platform endpoints.
pub struct HttpStoryBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CompletionsResponse {
    responses: Vec<CharacterReply>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct TtsResponse {
    audio_url: String,
}

#[derive(Deserialize)]
struct AutoMessageResponse {
    message: String,
}

impl HttpStoryBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl StoryBackend for HttpStoryBackend {
    async fn get_character_responses(
        &self,
        session_id: &str,
        message: &str,
        context: &[ContextMessage],
        temperature: Option<f32>,
    ) -> Result<Vec<CharacterReply>, StoryError> {
        let mut body = json!({
            "session_id": session_id,
            "message": message,
            "messages": context,
        });
        if let Some(temp) = temperature {
            body["temperature"] = json!(temp);
        }

        debug!(session_id, context_len = context.len(), "requesting character responses");
        let response = self
            .client
            .post(self.endpoint("/v1/story/completions"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 402 {
            return Err(StoryError::InsufficientCredits);
        }
        if !status.is_success() {
            let data: Value = response.json().await.unwrap_or(Value::Null);
            return Err(StoryError::RequestFailed {
                status: status.as_u16(),
                message: extract_error_message(&data)
                    .unwrap_or_else(|| "failed to get character responses".to_string()),
            });
        }

        let data: Value = response.json().await?;
        let parsed: CompletionsResponse = serde_json::from_value(data.clone()).map_err(|_| {
            StoryError::MalformedResponse(truncate_for_log(&data.to_string(), 256))
        })?;
        Ok(parsed.responses)
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        voice: Option<&str>,
        model: &str,
        rate: i32,
        pitch: i32,
    ) -> Result<AudioClip, StoryError> {
        let body = json!({
            "text": text,
            "edge_voice": voice,
            "rvc_model": model,
            "tts_rate": rate,
            "rvc_pitch": pitch,
        });

        let response = self
            .client
            .post(self.endpoint("/v1/tts"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoryError::TtsFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoryError::TtsFailed(format!("status {}", status.as_u16())));
        }

        let parsed: TtsResponse = response
            .json()
            .await
            .map_err(|e| StoryError::TtsFailed(e.to_string()))?;
        if parsed.audio_url.is_empty() {
            return Err(StoryError::TtsFailed("no audio URL received".to_string()));
        }
        Ok(AudioClip { url: parsed.audio_url })
    }

    async fn generate_auto_user_message(
        &self,
        session_id: &str,
        context: &[ContextMessage],
        temperature: Option<f32>,
    ) -> Result<String, StoryError> {
        let mut body = json!({
            "session_id": session_id,
            "messages": context,
        });
        if let Some(temp) = temperature {
            body["temperature"] = json!(temp);
        }

        let response = self
            .client
            .post(self.endpoint("/v1/story/user-message"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoryError::GenerationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoryError::GenerationFailed(format!(
                "status {}",
                status.as_u16()
            )));
        }

        let parsed: AutoMessageResponse = response
            .json()
            .await
            .map_err(|e| StoryError::GenerationFailed(e.to_string()))?;
        Ok(parsed.message)
    }

    async fn load_session(&self, session_id: &str) -> Result<SessionData, StoryError> {
        let url = self.endpoint(&format!(
            "/story/sessions/{}",
            urlencoding::encode(session_id)
        ));
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let data: Value = response.json().await.unwrap_or(Value::Null);
            return Err(StoryError::RequestFailed {
                status: status.as_u16(),
                message: extract_error_message(&data)
                    .unwrap_or_else(|| "failed to load session".to_string()),
            });
        }

        let session: SessionData = response.json().await?;
        Ok(session)
    }
}

/// Pulls a human-readable message out of a JSON error body, if any.
fn extract_error_message(data: &Value) -> Option<String> {
    match data {
        Value::Object(map) => {
            for key in ["error", "message", "detail"] {
                match map.get(key) {
                    Some(Value::String(s)) if !s.trim().is_empty() => {
                        return Some(s.trim().to_string());
                    }
                    Some(Value::Object(inner)) => {
                        if let Some(Value::String(s)) = inner.get("message") {
                            if !s.trim().is_empty() {
                                return Some(s.trim().to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_error_messages_from_common_shapes() {
        let flat = json!({ "error": "bad request" });
        assert_eq!(extract_error_message(&flat).as_deref(), Some("bad request"));

        let nested = json!({ "error": { "message": "model offline" } });
        assert_eq!(extract_error_message(&nested).as_deref(), Some("model offline"));

        let detail = json!({ "detail": "session not found" });
        assert_eq!(extract_error_message(&detail).as_deref(), Some("session not found"));

        assert!(extract_error_message(&Value::Null).is_none());
        assert!(extract_error_message(&json!({ "error": "  " })).is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let backend = HttpStoryBackend::new("https://example.test/").unwrap();
        assert_eq!(
            backend.endpoint("/v1/tts"),
            "https://example.test/v1/tts"
        );
    }
}
