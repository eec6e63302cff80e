use serde::{Deserialize, Serialize};

use crate::utils::{new_id, now_millis};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiParameters {
    pub temperature: Option<f32>,
    #[serde(alias = "top_p")]
    pub top_p: Option<f32>,
    #[serde(alias = "presence_penalty")]
    pub presence_penalty: Option<f32>,
    #[serde(alias = "frequency_penalty")]
    pub frequency_penalty: Option<f32>,
    #[serde(alias = "max_tokens")]
    pub max_tokens: Option<u32>,
}

impl AiParameters {
    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(0.7)
    }

    pub fn top_p_or_default(&self) -> f32 {
        self.top_p.unwrap_or(0.9)
    }

    pub fn presence_penalty_or_default(&self) -> f32 {
        self.presence_penalty.unwrap_or(0.6)
    }

    pub fn frequency_penalty_or_default(&self) -> f32 {
        self.frequency_penalty.unwrap_or(0.6)
    }

    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(150)
    }
}

/// A configured persona occupying one of up to four fixed seats for the
/// duration of a story session. Loaded once at session start; read-mostly.
/// The session endpoint emits snake_case for most fields but camelCase for
/// the voice id, hence the aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "system_prompt")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tts_voice: Option<String>,
    #[serde(default, alias = "rvc_model")]
    pub rvc_model: Option<String>,
    #[serde(default, alias = "tts_rate")]
    pub tts_rate: i32,
    #[serde(default, alias = "rvc_pitch")]
    pub rvc_pitch: i32,
    #[serde(default, alias = "ai_parameters")]
    pub ai_parameters: AiParameters,
    pub position: u8,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub greetings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Character,
    System,
}

/// Voice parameters copied off the speaking character when its message is
/// appended, so later character edits don't retroactively change history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParams {
    pub tts_voice: Option<String>,
    pub rvc_model: String,
    pub tts_rate: i32,
    pub rvc_pitch: i32,
}

/// One entry in the conversation; immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub created_at: u64,
    #[serde(default)]
    pub character_id: Option<String>,
    #[serde(default)]
    pub position: Option<u8>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub voice: Option<VoiceParams>,
    #[serde(default)]
    pub error: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind: MessageKind::User,
            content: content.into(),
            created_at: now_millis(),
            character_id: None,
            position: None,
            name: None,
            voice: None,
            error: false,
        }
    }

    pub fn system_error(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind: MessageKind::System,
            content: content.into(),
            created_at: now_millis(),
            character_id: None,
            position: None,
            name: None,
            voice: None,
            error: true,
        }
    }

    /// Builds a character message from a sanitized reply, denormalizing the
    /// speaker's voice parameters at append time. The voice-conversion model
    /// falls back to the character id when no model is configured.
    pub fn character(reply: &CharacterReply, character: &Character, clean_content: String) -> Self {
        let rvc_model = reply
            .rvc_model
            .clone()
            .or_else(|| character.rvc_model.clone())
            .unwrap_or_else(|| character.id.clone());

        Self {
            id: new_id(),
            kind: MessageKind::Character,
            content: clean_content,
            created_at: now_millis(),
            character_id: Some(reply.character_id.clone()),
            position: Some(reply.position),
            name: Some(reply.name.clone()),
            voice: Some(VoiceParams {
                tts_voice: reply.tts_voice.clone().or_else(|| character.tts_voice.clone()),
                rvc_model,
                tts_rate: reply.tts_rate.unwrap_or(character.tts_rate),
                rvc_pitch: reply.rvc_pitch.unwrap_or(character.rvc_pitch),
            }),
            error: false,
        }
    }

    /// A greeting spoken by a seated character outside any backend round.
    pub fn greeting(character: &Character, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind: MessageKind::Character,
            content: content.into(),
            created_at: now_millis(),
            character_id: Some(character.id.clone()),
            position: Some(character.position),
            name: Some(character.name.clone()),
            voice: Some(VoiceParams {
                tts_voice: character.tts_voice.clone(),
                rvc_model: character
                    .rvc_model
                    .clone()
                    .unwrap_or_else(|| character.id.clone()),
                tts_rate: character.tts_rate,
                rvc_pitch: character.rvc_pitch,
            }),
            error: false,
        }
    }
}

/// One character's raw reply as returned by the completions collaborator.
/// The wire shape is snake_case except for `ttsVoice`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterReply {
    #[serde(alias = "character_id")]
    pub character_id: String,
    pub position: u8,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub tts_voice: Option<String>,
    #[serde(default, alias = "rvc_model")]
    pub rvc_model: Option<String>,
    #[serde(default, alias = "tts_rate")]
    pub tts_rate: Option<i32>,
    #[serde(default, alias = "rvc_pitch")]
    pub rvc_pitch: Option<i32>,
    #[serde(default, alias = "is_placeholder")]
    pub is_placeholder: bool,
}

/// The `{role, content}` shape the backend expects as conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub characters: Vec<Character>,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndlessSettings {
    pub delay_seconds: u64,
    pub max_turns: u32,
    pub temperature: Option<f32>,
}

impl Default for EndlessSettings {
    fn default() -> Self {
        Self {
            delay_seconds: 15,
            max_turns: 20,
            temperature: None,
        }
    }
}
