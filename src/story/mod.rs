//! Multi-character story mode.
//!
//! The pieces, in the order a turn flows through them:
//! - [`log`]: the conversation history, bounded for rendering and unbounded
//!   for backend context
//! - [`orchestrator`]: the single-flight turn pipeline with follow-up rounds
//! - [`selection`]: which still-silent characters join a follow-up round
//! - [`sanitize`]: cleanup of raw model output before display and speech
//! - [`audio`]: strictly sequential voice playback
//! - [`endless`]: the self-driving auto-turn loop

pub mod audio;
pub mod endless;
pub mod log;
pub mod orchestrator;
pub mod sanitize;
pub mod selection;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use audio::{AudioClip, AudioSequencer, AudioSink, PlaybackError, VoiceLine};
pub use endless::EndlessMode;
pub use log::{ConversationLog, Surface, RENDER_CAP, SEAT_COUNT};
pub use orchestrator::{StoryOrchestrator, TurnOutcome, MAX_FOLLOW_UP_ROUNDS};
pub use types::{
    AiParameters, Character, CharacterReply, ContextMessage, EndlessSettings, Message,
    MessageKind, SessionData, VoiceParams,
};
