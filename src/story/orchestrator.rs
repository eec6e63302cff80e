use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::api::StoryBackend;
use crate::error::StoryError;
use crate::storage::MessageStore;
use crate::story::audio::{AudioSequencer, AudioSink, VoiceLine};
use crate::story::log::{ConversationLog, Surface};
use crate::story::sanitize::sanitize_reply;
use crate::story::selection::choose_follow_up_speakers;
use crate::story::types::{Character, Message, SessionData};

/// How many follow-up rounds a single turn may fan out into, on top of the
/// initial round. The available-speakers set shrinks every round, so the
/// turn terminates regardless of how the selector's randomization behaves.
pub const MAX_FOLLOW_UP_ROUNDS: usize = 2;

const INSUFFICIENT_CREDITS_NOTICE: &str =
    "Insufficient credits. Please purchase more credits to continue chatting.";
const TURN_FAILED_NOTICE: &str = "Failed to get character responses. Please try again.";

/// What one completed turn produced, in speaking order.
#[derive(Debug)]
pub struct TurnOutcome {
    pub accepted: Vec<Message>,
    pub rounds: usize,
}

struct SessionState {
    characters: Vec<Character>,
    scenario: Option<String>,
    title: Option<String>,
    log: ConversationLog,
}

/// Drives one full turn: append the triggering message, collect and
/// sanitize the characters' replies, fan out bounded follow-up rounds, and
/// voice the accepted replies in order.
///
/// The session state sits behind an async mutex that doubles as the
/// single-flight guard: a second `process_turn` while one is in flight
/// waits its turn, so the log never sees interleaved appends and the
/// backend is never double-charged for a half-built context.
pub struct StoryOrchestrator {
    session_id: String,
    backend: Arc<dyn StoryBackend>,
    audio: AudioSequencer,
    audio_enabled: AtomicBool,
    state: tokio::sync::Mutex<SessionState>,
}

impl StoryOrchestrator {
    pub fn new(
        backend: Arc<dyn StoryBackend>,
        sink: Arc<dyn AudioSink>,
        session_id: impl Into<String>,
        session: SessionData,
        store: Option<MessageStore>,
    ) -> Self {
        let session_id = session_id.into();
        let mut log = ConversationLog::new(session_id.clone(), store);
        let restored = log.restore();
        if restored > 0 {
            info!(session_id = %session_id, restored, "restored persisted story history");
        }

        Self {
            session_id,
            backend,
            audio: AudioSequencer::new(sink),
            audio_enabled: AtomicBool::new(true),
            state: tokio::sync::Mutex::new(SessionState {
                characters: session.characters,
                scenario: session.scenario,
                title: session.title,
                log,
            }),
        }
    }

    /// Fetches the session from the backend and builds the orchestrator.
    /// A load failure is fatal to the whole page; there is no retry here.
    pub async fn load(
        backend: Arc<dyn StoryBackend>,
        sink: Arc<dyn AudioSink>,
        session_id: impl Into<String>,
        store: Option<MessageStore>,
    ) -> Result<Self, StoryError> {
        let session_id = session_id.into();
        let session = backend.load_session(&session_id).await?;
        Ok(Self::new(backend, sink, session_id, session, store))
    }

    /// Runs one full turn triggered by `text` (a manual send or an
    /// endless-mode auto message).
    ///
    /// The driving message stays in the log even when the turn fails;
    /// retries want that context. Failures of the shared completions call
    /// abort the turn and surface as a system notice; failures inside a
    /// single character's pipeline only drop that character's reply.
    pub async fn process_turn(
        &self,
        text: &str,
        temperature: Option<f32>,
    ) -> Result<TurnOutcome, StoryError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        // A fresh message takes the audio slot away from any straggler.
        self.audio.interrupt();

        state.log.append(Message::user(text));

        let names: Vec<String> = state.characters.iter().map(|c| c.name.clone()).collect();
        let mut spoken: HashSet<String> = HashSet::new();
        let mut accepted: Vec<Message> = Vec::new();
        let mut scoped: Option<HashSet<String>> = None;
        let mut trigger = text.to_string();
        let mut rounds = 0usize;

        loop {
            let context = state.log.backend_context();
            let replies = match self
                .backend
                .get_character_responses(&self.session_id, &trigger, &context, temperature)
                .await
            {
                Ok(replies) => replies,
                Err(err) => {
                    let notice = match &err {
                        StoryError::InsufficientCredits => INSUFFICIENT_CREDITS_NOTICE,
                        _ => TURN_FAILED_NOTICE,
                    };
                    warn!(session_id = %self.session_id, %err, "turn aborted");
                    state.log.append(Message::system_error(notice));
                    return Err(err);
                }
            };

            let mut round_accepted: Vec<Message> = Vec::new();
            for reply in &replies {
                if reply.is_placeholder {
                    continue;
                }
                if spoken.contains(&reply.character_id) {
                    continue;
                }
                if let Some(ids) = &scoped {
                    if !ids.contains(&reply.character_id) {
                        continue;
                    }
                }
                let Some(character) = state
                    .characters
                    .iter()
                    .find(|c| c.id == reply.character_id)
                else {
                    warn!(character_id = %reply.character_id, "dropping reply from unseated character");
                    continue;
                };

                let clean = sanitize_reply(&reply.content, &names, &reply.name);
                if clean.is_empty() {
                    debug!(character = %reply.name, "reply emptied out by sanitizing, dropped");
                    continue;
                }

                let message = Message::character(reply, character, clean);
                let appended = state.log.append(message).clone();
                spoken.insert(reply.character_id.clone());
                round_accepted.push(appended);
            }

            if round_accepted.is_empty() {
                break;
            }
            accepted.extend(round_accepted.iter().cloned());
            rounds += 1;
            if rounds > MAX_FOLLOW_UP_ROUNDS {
                break;
            }

            let available: Vec<&Character> = state
                .characters
                .iter()
                .filter(|c| !spoken.contains(&c.id))
                .collect();
            let chosen = choose_follow_up_speakers(&round_accepted, &available);
            if chosen.is_empty() {
                break;
            }
            debug!(
                round = rounds,
                speakers = chosen.len(),
                "fanning out follow-up round"
            );
            let Some(last) = round_accepted.last() else {
                break;
            };
            trigger = last.content.clone();
            scoped = Some(chosen.iter().map(|c| c.id.clone()).collect());
        }

        if self.audio_enabled.load(Ordering::SeqCst) && !accepted.is_empty() {
            let lines: Vec<VoiceLine> = accepted.iter().filter_map(voice_line).collect();
            self.audio.play_all(self.backend.as_ref(), lines).await;
        }

        Ok(TurnOutcome { accepted, rounds })
    }

    /// Appends and voices one randomly chosen greeting per seated character
    /// that has any, in seat order. No-op when history already exists, so a
    /// restored session doesn't greet twice.
    pub async fn send_initial_greetings(&self) -> Vec<Message> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.log.is_empty() {
            return Vec::new();
        }

        let mut greeted: Vec<Message> = Vec::new();
        let mut seated: Vec<&Character> = state.characters.iter().collect();
        seated.sort_by_key(|c| c.position);
        for character in seated {
            let Some(greeting) = character.greetings.choose(&mut rand::thread_rng()) else {
                continue;
            };
            let message = Message::greeting(character, greeting.clone());
            greeted.push(state.log.append(message).clone());
        }

        if self.audio_enabled.load(Ordering::SeqCst) && !greeted.is_empty() {
            let lines: Vec<VoiceLine> = greeted.iter().filter_map(voice_line).collect();
            self.audio.play_all(self.backend.as_ref(), lines).await;
        }
        greeted
    }

    /// Toggling audio off tears down the current clip immediately and
    /// clears anything queued; toggling back on does not resume.
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.audio.interrupt();
        }
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn backend(&self) -> Arc<dyn StoryBackend> {
        self.backend.clone()
    }

    pub async fn character_count(&self) -> usize {
        self.state.lock().await.characters.len()
    }

    pub async fn character_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .characters
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub async fn scenario(&self) -> Option<String> {
        self.state.lock().await.scenario.clone()
    }

    pub async fn title(&self) -> Option<String> {
        self.state.lock().await.title.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.log.messages().to_vec()
    }

    pub async fn rendered(&self, surface: Surface) -> Vec<Message> {
        self.state
            .lock()
            .await
            .log
            .rendered(surface)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn backend_context(&self) -> Vec<crate::story::types::ContextMessage> {
        self.state.lock().await.log.backend_context()
    }
}

fn voice_line(message: &Message) -> Option<VoiceLine> {
    let voice = message.voice.as_ref()?;
    Some(VoiceLine {
        text: message.content.clone(),
        voice: voice.tts_voice.clone(),
        model: voice.rvc_model.clone(),
        rate: voice.tts_rate,
        pitch: voice.rvc_pitch,
    })
}
