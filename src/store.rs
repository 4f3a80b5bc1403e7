//! Durable storage for the resume identity.
//!
//! The session keeps two values across restarts, the game code and the
//! server-assigned player id, so an interrupted client can send
//! `reconnectGame` instead of joining as a new participant.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Key holding the server-assigned player id.
pub const PLAYER_ID_KEY: &str = "exquisiteCorpsePlayerId";

/// Key holding the joined game code.
pub const GAME_CODE_KEY: &str = "exquisiteCorpseGameCode";

/// A durable string key-value store.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Volatile store, for tests and clients that never resume.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// The file is read once when opened and rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// A file that cannot be parsed is treated as empty and overwritten on
    /// the next change.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding unreadable identity file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, text)
            .map_err(|e| SessionError::Store(format!("writing {}: {e}", self.path.display())))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Identity needed to resume a game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentity {
    pub game_code: Option<String>,
    pub player_id: Option<String>,
}

impl PersistedIdentity {
    /// Both halves are present, so a resume can be attempted.
    pub fn is_resumable(&self) -> bool {
        self.game_code.is_some() && self.player_id.is_some()
    }

    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        Ok(Self {
            game_code: store.get(GAME_CODE_KEY)?,
            player_id: store.get(PLAYER_ID_KEY)?,
        })
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        match &self.game_code {
            Some(code) => store.set(GAME_CODE_KEY, code)?,
            None => store.remove(GAME_CODE_KEY)?,
        }
        match &self.player_id {
            Some(id) => store.set(PLAYER_ID_KEY, id)?,
            None => store.remove(PLAYER_ID_KEY)?,
        }
        Ok(())
    }

    pub fn clear(store: &mut dyn KeyValueStore) -> Result<()> {
        debug!("clearing persisted identity");
        store.remove(PLAYER_ID_KEY)?;
        store.remove(GAME_CODE_KEY)
    }
}
