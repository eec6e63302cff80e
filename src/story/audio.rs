//! Sequential voice playback for story replies.
//!
//! At most one clip plays at any moment. Replies are voiced strictly in
//! speaking order; a new batch, a mode toggle, or a fresh user message
//! supersedes whatever is still playing, and a superseded clip's late
//! completion has no observable effect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::StoryBackend;
use crate::error::StoryError;
use crate::story::sanitize::strip_stage_directions;

/// A playable clip returned by the TTS collaborator.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub url: String,
}

/// One reply's worth of speech, with the voice parameters denormalized at
/// append time.
#[derive(Debug, Clone)]
pub struct VoiceLine {
    pub text: String,
    pub voice: Option<String>,
    pub model: String,
    pub rate: i32,
    pub pitch: i32,
}

#[derive(Debug)]
pub enum PlaybackError {
    Failed(String),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::Failed(msg) => write!(f, "playback failed: {}", msg),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// The audio output device: plays one clip through to its end (or error).
/// The browser `Audio` element analogue; injected so tests can script it.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, clip: AudioClip) -> Result<(), PlaybackError>;
}

/// Owns the single "current player" slot. Each `play_all` claims a new
/// generation; any older run observes the change at its next await point
/// and winds down without touching the newer playback.
pub struct AudioSequencer {
    sink: Arc<dyn AudioSink>,
    generation: AtomicU64,
    current: watch::Sender<u64>,
}

impl AudioSequencer {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        let (current, _) = watch::channel(0);
        Self {
            sink,
            generation: AtomicU64::new(0),
            current,
        }
    }

    /// Voices the given lines in order. Per-line synthesis or playback
    /// failure logs and skips to the next line; one bad line must not
    /// silence the rest of the turn.
    pub async fn play_all(&self, backend: &dyn StoryBackend, lines: Vec<VoiceLine>) {
        let my_gen = self.claim();
        let mut superseded = self.current.subscribe();

        for line in lines {
            if *superseded.borrow() != my_gen {
                debug!("playback superseded, dropping remaining lines");
                return;
            }

            let text = strip_stage_directions(&line.text);
            if text.is_empty() {
                continue;
            }

            let clip = match backend
                .synthesize_speech(&text, line.voice.as_deref(), &line.model, line.rate, line.pitch)
                .await
            {
                Ok(clip) => clip,
                Err(StoryError::TtsFailed(msg)) => {
                    warn!(%msg, "speech synthesis failed, skipping line");
                    continue;
                }
                Err(err) => {
                    warn!(%err, "speech synthesis failed, skipping line");
                    continue;
                }
            };

            tokio::select! {
                result = self.sink.play(clip) => {
                    if let Err(err) = result {
                        warn!(%err, "playback failed, skipping line");
                    }
                }
                _ = superseded.changed() => {
                    // A newer batch or an interrupt took the player. The
                    // dropped play future can no longer report a stale end.
                    debug!("playback interrupted mid-clip");
                    return;
                }
            }
        }
    }

    /// Stops the in-flight clip and clears anything still queued. Used on
    /// audio toggle-off and when a new user message preempts playback.
    pub fn interrupt(&self) {
        self.claim();
    }

    fn claim(&self) -> u64 {
        let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // send_replace updates the value even when no run is subscribed yet
        self.current.send_replace(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::testutil::{GatedSink, ScriptedBackend};
    use std::time::Duration;

    fn line(text: &str) -> VoiceLine {
        VoiceLine {
            text: text.to_string(),
            voice: Some("en-US-AriaNeural".to_string()),
            model: "char-1".to_string(),
            rate: 0,
            pitch: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn plays_lines_in_order() {
        let sink = Arc::new(GatedSink::open());
        let sequencer = AudioSequencer::new(sink.clone());
        let backend = ScriptedBackend::new();

        sequencer
            .play_all(&backend, vec![line("first"), line("second")])
            .await;

        assert_eq!(sink.started(), vec!["first", "second"]);
        assert_eq!(sink.completed(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_before_any_playback_does_not_wedge_the_sequencer() {
        let sink = Arc::new(GatedSink::open());
        let sequencer = AudioSequencer::new(sink.clone());
        let backend = ScriptedBackend::new();

        // Nothing is subscribed yet; the claim must still take effect.
        sequencer.interrupt();
        sequencer.play_all(&backend, vec![line("first")]).await;

        assert_eq!(sink.completed(), vec!["first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_batch_supersedes_older_playback() {
        let sink = Arc::new(GatedSink::blocking_on("slow"));
        let sequencer = Arc::new(AudioSequencer::new(sink.clone()));
        let backend = Arc::new(ScriptedBackend::new());

        let seq = sequencer.clone();
        let be = backend.clone();
        let first = tokio::spawn(async move {
            seq.play_all(be.as_ref(), vec![line("slow"), line("never")]).await;
        });

        // Let the first batch reach its blocking play call.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.started(), vec!["slow"]);

        sequencer.play_all(backend.as_ref(), vec![line("fresh")]).await;
        first.await.unwrap();

        // The superseded clip never completed and its tail was dropped.
        assert_eq!(sink.started(), vec!["slow", "fresh"]);
        assert_eq!(sink.completed(), vec!["fresh"]);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_playback_and_clears_queue() {
        let sink = Arc::new(GatedSink::blocking_on("slow"));
        let sequencer = Arc::new(AudioSequencer::new(sink.clone()));
        let backend = Arc::new(ScriptedBackend::new());

        let seq = sequencer.clone();
        let be = backend.clone();
        let task = tokio::spawn(async move {
            seq.play_all(be.as_ref(), vec![line("slow"), line("queued")]).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        sequencer.interrupt();
        task.await.unwrap();

        assert_eq!(sink.started(), vec!["slow"]);
        assert!(sink.completed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tts_failure_skips_the_line_not_the_batch() {
        let sink = Arc::new(GatedSink::open());
        let sequencer = AudioSequencer::new(sink.clone());
        let backend = ScriptedBackend::new();
        backend.fail_tts_for("cursed");

        sequencer
            .play_all(&backend, vec![line("cursed"), line("fine")])
            .await;

        assert_eq!(sink.started(), vec!["fine"]);
        assert_eq!(sink.completed(), vec!["fine"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_directions_never_reach_the_synthesizer() {
        let sink = Arc::new(GatedSink::open());
        let sequencer = AudioSequencer::new(sink.clone());
        let backend = ScriptedBackend::new();

        sequencer
            .play_all(&backend, vec![line("*leans in* hello there")])
            .await;

        assert_eq!(backend.tts_texts(), vec!["hello there"]);
    }

    #[tokio::test(start_paused = true)]
    async fn all_stage_directions_means_nothing_to_voice() {
        let sink = Arc::new(GatedSink::open());
        let sequencer = AudioSequencer::new(sink.clone());
        let backend = ScriptedBackend::new();

        sequencer.play_all(&backend, vec![line("*silent nod*")]).await;

        assert!(sink.started().is_empty());
        assert!(backend.tts_texts().is_empty());
    }
}
