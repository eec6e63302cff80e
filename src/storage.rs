use std::fs;
use std::path::PathBuf;

use crate::error::StoryError;
use crate::story::types::Message;

/// File-backed message history, one JSON document per story session under
/// the key `story_{session_id}_messages`. Written whole on every append and
/// read once when a session page is (re)entered.
pub struct MessageStore {
    root: PathBuf,
}

impl MessageStore {
    pub fn new(root: PathBuf) -> Result<Self, StoryError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Opens the store in the platform data directory.
    pub fn open_default() -> Result<Self, StoryError> {
        let base = dirs::data_dir()
            .ok_or_else(|| StoryError::Other("no data directory available".into()))?;
        Self::new(base.join("storychat"))
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root
            .join(format!("story_{}_messages.json", sanitize_session_id(session_id)))
    }

    pub fn save(&self, session_id: &str, messages: &[Message]) -> Result<(), StoryError> {
        let json = serde_json::to_string(messages)?;
        fs::write(self.path_for(session_id), json)?;
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> Result<Option<Vec<Message>>, StoryError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)?;
        let messages: Vec<Message> = serde_json::from_str(&data)?;
        Ok(Some(messages))
    }

    pub fn clear(&self, session_id: &str) -> Result<(), StoryError> {
        let path = self.path_for(session_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Session ids come from URLs; keep only filename-safe characters.
fn sanitize_session_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
