//! Endless mode: the story drives itself.
//!
//! While running, a background task repeatedly asks the backend for a
//! plausible next user message, feeds it through the normal turn pipeline,
//! then waits out the configured delay. Stopping is cooperative and takes
//! effect at the next turn boundary; the in-flight turn always completes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::StoryError;
use crate::story::orchestrator::StoryOrchestrator;
use crate::story::sanitize::sanitize_auto_message;
use crate::story::types::EndlessSettings;

pub struct EndlessMode {
    active: AtomicBool,
    current_turn: AtomicU32,
    stop_tx: watch::Sender<bool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EndlessMode {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            active: AtomicBool::new(false),
            current_turn: AtomicU32::new(0),
            stop_tx,
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawns the auto-turn loop. Fails when already running or when the
    /// session has no seated characters to speak.
    pub async fn start(
        self: &Arc<Self>,
        orchestrator: Arc<StoryOrchestrator>,
        settings: EndlessSettings,
    ) -> Result<(), StoryError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(StoryError::Other("endless mode already running".to_string()));
        }
        if orchestrator.character_count().await == 0 {
            self.active.store(false, Ordering::SeqCst);
            return Err(StoryError::SessionNotLoaded);
        }

        // Drain the previous run's task before anything else: its exit
        // clears the active flag, which must not race this run's.
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            let _ = previous.await;
            self.active.store(true, Ordering::SeqCst);
        }

        self.current_turn.store(0, Ordering::SeqCst);
        self.stop_tx.send_replace(false);
        info!(
            delay_seconds = settings.delay_seconds,
            max_turns = settings.max_turns,
            "starting endless mode"
        );

        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run(orchestrator, settings).await;
            this.active.store(false, Ordering::SeqCst);
        });
        *task = Some(handle);
        Ok(())
    }

    async fn run(&self, orchestrator: Arc<StoryOrchestrator>, settings: EndlessSettings) {
        let backend = orchestrator.backend();
        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            let context = orchestrator.backend_context().await;
            let raw = match backend
                .generate_auto_user_message(
                    orchestrator.session_id(),
                    &context,
                    settings.temperature,
                )
                .await
            {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "auto message generation failed, stopping endless mode");
                    break;
                }
            };

            let names = orchestrator.character_names().await;
            let message = sanitize_auto_message(&raw, &names);
            if message.is_empty() {
                warn!("auto message generator produced nothing, stopping endless mode");
                break;
            }

            match orchestrator.process_turn(&message, settings.temperature).await {
                Ok(_) => {}
                Err(StoryError::InsufficientCredits) => {
                    warn!("out of credits, stopping endless mode");
                    break;
                }
                Err(err) => {
                    // Transient failure; the next scheduled turn is the retry.
                    warn!(%err, "auto turn failed");
                }
            }

            let turn = self.current_turn.fetch_add(1, Ordering::SeqCst) + 1;
            if turn >= settings.max_turns {
                info!(turn, "turn cap reached, stopping endless mode");
                break;
            }

            tokio::select! {
                _ = stop_rx.changed() => {}
                _ = tokio::time::sleep(Duration::from_secs(settings.delay_seconds)) => {}
            }
            if *stop_rx.borrow() {
                debug!("stop requested, leaving endless mode at turn boundary");
                break;
            }
        }
    }

    /// Requests a stop. The current turn (if any) finishes first; no new
    /// turn starts afterwards.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.current_turn.store(0, Ordering::SeqCst);
        self.stop_tx.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn current_turn(&self) -> u32 {
        self.current_turn.load(Ordering::SeqCst)
    }

    /// Waits for the background loop to wind down. Test hook, mainly.
    pub async fn join(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Default for EndlessMode {
    fn default() -> Self {
        Self::new()
    }
}
