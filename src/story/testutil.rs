//! Scripted collaborators shared by the story-mode tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::StoryBackend;
use crate::error::StoryError;
use crate::story::audio::{AudioClip, AudioSink, PlaybackError};
use crate::story::types::{Character, CharacterReply, ContextMessage, SessionData};

/// Backend double with queued, per-call results. Speech synthesis echoes
/// the input text as the clip URL so sinks can assert on it directly.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<Vec<CharacterReply>, StoryError>>>,
    auto_messages: Mutex<VecDeque<Result<String, StoryError>>>,
    completion_delay: Mutex<Option<Duration>>,
    failing_tts: Mutex<HashSet<String>>,
    triggers: Mutex<Vec<String>>,
    tts_texts: Mutex<Vec<String>>,
    session: Mutex<Option<SessionData>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            auto_messages: Mutex::new(VecDeque::new()),
            completion_delay: Mutex::new(None),
            failing_tts: Mutex::new(HashSet::new()),
            triggers: Mutex::new(Vec::new()),
            tts_texts: Mutex::new(Vec::new()),
            session: Mutex::new(None),
        }
    }

    pub fn push_replies(&self, replies: Vec<CharacterReply>) {
        self.replies.lock().unwrap().push_back(Ok(replies));
    }

    pub fn push_completion_error(&self, err: StoryError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn push_auto_message(&self, message: &str) {
        self.auto_messages
            .lock()
            .unwrap()
            .push_back(Ok(message.to_string()));
    }

    pub fn push_auto_error(&self, err: StoryError) {
        self.auto_messages.lock().unwrap().push_back(Err(err));
    }

    pub fn set_completion_delay(&self, delay: Duration) {
        *self.completion_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_tts_for(&self, text: &str) {
        self.failing_tts.lock().unwrap().insert(text.to_string());
    }

    pub fn set_session(&self, session: SessionData) {
        *self.session.lock().unwrap() = Some(session);
    }

    /// Every trigger message `get_character_responses` was called with.
    pub fn triggers(&self) -> Vec<String> {
        self.triggers.lock().unwrap().clone()
    }

    /// Every text that reached `synthesize_speech`.
    pub fn tts_texts(&self) -> Vec<String> {
        self.tts_texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoryBackend for ScriptedBackend {
    async fn get_character_responses(
        &self,
        _session_id: &str,
        message: &str,
        _context: &[ContextMessage],
        _temperature: Option<f32>,
    ) -> Result<Vec<CharacterReply>, StoryError> {
        self.triggers.lock().unwrap().push(message.to_string());
        let delay = *self.completion_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        _voice: Option<&str>,
        _model: &str,
        _rate: i32,
        _pitch: i32,
    ) -> Result<AudioClip, StoryError> {
        self.tts_texts.lock().unwrap().push(text.to_string());
        if self.failing_tts.lock().unwrap().contains(text) {
            return Err(StoryError::TtsFailed(format!("scripted failure: {text}")));
        }
        Ok(AudioClip {
            url: text.to_string(),
        })
    }

    async fn generate_auto_user_message(
        &self,
        _session_id: &str,
        _context: &[ContextMessage],
        _temperature: Option<f32>,
    ) -> Result<String, StoryError> {
        self.auto_messages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StoryError::GenerationFailed("script exhausted".to_string())))
    }

    async fn load_session(&self, _session_id: &str) -> Result<SessionData, StoryError> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or(StoryError::SessionNotLoaded)
    }
}

/// Sink double. `open` completes every clip immediately; `blocking_on`
/// makes the named clip play forever, so tests can interrupt mid-clip.
pub struct GatedSink {
    block_url: Option<String>,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
}

impl GatedSink {
    pub fn open() -> Self {
        Self {
            block_url: None,
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn blocking_on(url: &str) -> Self {
        Self {
            block_url: Some(url.to_string()),
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for GatedSink {
    async fn play(&self, clip: AudioClip) -> Result<(), PlaybackError> {
        self.started.lock().unwrap().push(clip.url.clone());
        if self.block_url.as_deref() == Some(clip.url.as_str()) {
            std::future::pending::<()>().await;
        }
        self.completed.lock().unwrap().push(clip.url);
        Ok(())
    }
}

/// Luna (with greetings) and Zeke (without), seated in the first two slots.
pub fn two_character_session() -> SessionData {
    SessionData {
        characters: vec![
            Character {
                id: "c1".to_string(),
                name: "Luna".to_string(),
                description: Some("A sharp-eyed archivist".to_string()),
                system_prompt: None,
                tts_voice: Some("en-US-AriaNeural".to_string()),
                rvc_model: None,
                tts_rate: 0,
                rvc_pitch: 0,
                ai_parameters: Default::default(),
                position: 0,
                avatar: None,
                background: None,
                greetings: vec!["Welcome to the archive.".to_string()],
            },
            Character {
                id: "c2".to_string(),
                name: "Zeke".to_string(),
                description: None,
                system_prompt: None,
                tts_voice: None,
                rvc_model: Some("zeke-v2".to_string()),
                tts_rate: 0,
                rvc_pitch: 0,
                ai_parameters: Default::default(),
                position: 1,
                avatar: None,
                background: None,
                greetings: Vec::new(),
            },
        ],
        scenario: Some("A dusty archive at midnight".to_string()),
        title: Some("The Archive".to_string()),
    }
}
