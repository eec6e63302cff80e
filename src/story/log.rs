use std::collections::VecDeque;

use tracing::warn;

use crate::storage::MessageStore;
use crate::story::types::{ContextMessage, Message, MessageKind};

/// Most messages a single surface keeps rendered. Older entries fall off the
/// display but stay in the full history used to build backend context.
pub const RENDER_CAP: usize = 10;

pub const SEAT_COUNT: usize = 4;

/// A render target: the user's own stream, or one character seat's stream.
/// System notices share the user surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    User,
    Seat(u8),
}

/// Append-only conversation history plus the bounded per-surface render
/// windows. The message array is the single source of truth; the windows
/// only decide what a UI would still be showing.
pub struct ConversationLog {
    session_id: String,
    messages: Vec<Message>,
    user_window: VecDeque<usize>,
    seat_windows: [VecDeque<usize>; SEAT_COUNT],
    store: Option<MessageStore>,
}

impl ConversationLog {
    pub fn new(session_id: impl Into<String>, store: Option<MessageStore>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            user_window: VecDeque::new(),
            seat_windows: Default::default(),
            store,
        }
    }

    /// Replays persisted history into the render windows. No side effects
    /// beyond the in-memory state: nothing is re-fetched, re-voiced, or
    /// written back. Returns how many messages were restored.
    pub fn restore(&mut self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        match store.load(&self.session_id) {
            Ok(Some(saved)) => {
                for message in saved {
                    self.push(message);
                }
                self.messages.len()
            }
            Ok(None) => 0,
            Err(err) => {
                warn!(session_id = %self.session_id, %err, "failed to restore message history");
                0
            }
        }
    }

    /// Appends to the history and the owning surface's render window,
    /// dropping the oldest rendered entry past the cap. Every append also
    /// writes the full history through to the store; a write failure only
    /// loses unsaved history on reload, so it is logged and swallowed.
    pub fn append(&mut self, message: Message) -> &Message {
        self.push(message);
        if let Some(store) = &self.store {
            if let Err(err) = store.save(&self.session_id, &self.messages) {
                warn!(session_id = %self.session_id, %err, "failed to persist message history");
            }
        }
        // push() always leaves at least one element
        &self.messages[self.messages.len() - 1]
    }

    fn push(&mut self, message: Message) {
        let surface = surface_of(&message);
        self.messages.push(message);
        let index = self.messages.len() - 1;

        let window = match surface {
            Surface::User => &mut self.user_window,
            Surface::Seat(seat) => match self.seat_windows.get_mut(seat as usize) {
                Some(window) => window,
                None => {
                    // Kept in history and context, just never rendered.
                    warn!(seat, "message for an unknown seat left out of the render windows");
                    return;
                }
            },
        };
        window.push_back(index);
        if window.len() > RENDER_CAP {
            window.pop_front();
        }
    }

    /// The messages a UI would still be showing on one surface, oldest first.
    pub fn rendered(&self, surface: Surface) -> Vec<&Message> {
        let window = match surface {
            Surface::User => &self.user_window,
            Surface::Seat(seat) => match self.seat_windows.get(seat as usize) {
                Some(window) => window,
                None => return Vec::new(),
            },
        };
        window.iter().map(|&i| &self.messages[i]).collect()
    }

    /// Maps the full history into the `{role, content}` sequence the
    /// completions backend expects. System notices are UI-only and excluded.
    pub fn backend_context(&self) -> Vec<ContextMessage> {
        self.messages
            .iter()
            .filter(|m| m.kind != MessageKind::System)
            .map(|m| ContextMessage {
                role: match m.kind {
                    MessageKind::User => "user".to_string(),
                    _ => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

fn surface_of(message: &Message) -> Surface {
    match message.kind {
        MessageKind::Character => Surface::Seat(message.position.unwrap_or(0)),
        _ => Surface::User,
    }
}
