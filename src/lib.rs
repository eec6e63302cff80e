//! Core engine for a multi-character story chat client.
//!
//! A session seats up to four characters. Each user message (manual, or
//! generated while endless mode runs) triggers one orchestrated turn: the
//! backend returns every seated character's reply, replies are sanitized
//! and appended in speaking order, mentioned characters get bounded
//! follow-up rounds, and accepted replies are voiced one at a time.
//!
//! The backend API and the audio output device sit behind traits
//! ([`api::StoryBackend`], [`story::AudioSink`]) so the whole pipeline runs
//! under test with scripted collaborators.

pub mod api;
pub mod error;
pub mod logger;
pub mod storage;
pub mod story;
mod utils;

pub use api::{HttpStoryBackend, StoryBackend};
pub use error::StoryError;
pub use storage::MessageStore;
pub use story::{EndlessMode, EndlessSettings, SessionData, StoryOrchestrator};
