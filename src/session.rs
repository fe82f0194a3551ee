use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::overlay::TextOverlay;

pub type ChatId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Ongoing,
    AwaitingText,
    AwaitingTextStyle,
    AwaitingFont,
    AwaitingTextSize,
    AwaitingHorizontalAlignment,
    AwaitingVerticalAlignment,
    AwaitingHorizontalPadding,
    AwaitingVerticalPadding,
    AwaitingTextColor,
    AwaitingBorderColor,
    AwaitingBorderThickness,
    Done,
}

/// Per-chat conversation record. The pending overlay is always a complete,
/// defaulted configuration; it is reset to defaults after every commit.
#[derive(Debug)]
pub struct Session {
    pub state: SessionState,
    pub source_path: Option<PathBuf>,
    pub pending: TextOverlay,
    pub last_config: Option<String>,
    pub working: Option<Vec<u8>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::New,
            source_path: None,
            pending: TextOverlay::default(),
            last_config: None,
            working: None,
        }
    }

    /// Output path for the finalized image, derived from the source name.
    pub fn final_path(&self) -> Option<PathBuf> {
        let source = self.source_path.as_deref()?;
        let stem = source.file_stem()?.to_string_lossy();
        Some(source.with_file_name(format!("{stem}-final.png")))
    }

    /// Releases the session's owned image resources: drops the working copy
    /// and erases the on-disk artifacts best-effort.
    pub fn release(&mut self) {
        self.working = None;
        if let Some(path) = self.final_path() {
            remove_artifact(&path);
        }
        if let Some(path) = self.source_path.take() {
            remove_artifact(&path);
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_artifact(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        debug!("could not remove {}: {}", path.display(), err);
    }
}

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Keyed session registry. The map lock only guards lookup; each session
/// carries its own async mutex, which event handlers hold for the whole
/// dispatch so one user's events are strictly serialized while other users
/// proceed in parallel.
pub struct SessionStore {
    sessions: Mutex<HashMap<ChatId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `chat`, creating a fresh one on first contact.
    pub fn get(&self, chat: ChatId) -> SessionHandle {
        self.lock_map()
            .entry(chat)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Session::new())))
            .clone()
    }

    /// Detaches the session for `chat`. Callers already holding the session
    /// lock must release its resources themselves via `Session::release`.
    pub fn remove(&self, chat: ChatId) -> Option<SessionHandle> {
        self.lock_map().remove(&chat)
    }

    pub fn contains(&self, chat: ChatId) -> bool {
        self.lock_map().contains_key(&chat)
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, SessionHandle>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
