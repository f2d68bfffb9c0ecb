use crate::error::AppError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::{debug, error};

/// One exchange: what the caller said and what we said back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Caller utterance
    pub message: String,
    /// Generated reply
    pub response: String,
}

impl ConversationTurn {
    pub fn new(
        timestamp: OffsetDateTime,
        message: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            message: message.into(),
            response: response.into(),
        }
    }

    /// UTC calendar day the turn belongs to.
    pub fn day(&self) -> Date {
        self.timestamp.to_offset(UtcOffset::UTC).date()
    }
}

/// A conversation log is keyed by caller number and calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LogKey {
    pub caller: String,
    pub day: Date,
}

impl LogKey {
    pub fn new(caller: &str, day: Date) -> Self {
        Self {
            caller: caller.to_string(),
            day,
        }
    }

    /// `<caller>_<YYYYMMDD>.json`, with anything that could escape the directory replaced.
    pub fn file_name(&self) -> String {
        let caller: String = self
            .caller
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "{caller}_{:04}{:02}{:02}.json",
            self.day.year(),
            u8::from(self.day.month()),
            self.day.day()
        )
    }
}

/// Append-only storage for conversation logs.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append `turn` to the caller's log for the day the turn was taken, creating the log
    /// if needed.
    async fn append_turn(&self, caller: &str, turn: ConversationTurn) -> Result<(), AppError>;

    /// Up to `limit` most recent turns of the caller's log for `day`, oldest first.
    async fn recent_turns(
        &self,
        caller: &str,
        day: Date,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, AppError>;
}

fn tail(turns: &[ConversationTurn], limit: usize) -> Vec<ConversationTurn> {
    turns[turns.len().saturating_sub(limit)..].to_vec()
}

/// One pretty-printed JSON array per (caller, day) under a directory.
///
/// Every append reads the whole day's log, pushes the turn and rewrites the file through a
/// temporary sibling. Appends to the same file are serialized within this process; a second
/// process writing the same directory can still lose updates.
pub struct JsonFileStore {
    root: PathBuf,
    /// File name => lock, present only while an append to that file is in flight
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JsonFileStore {
    /// Use `root` as the log directory, creating it if it does not exist.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            error!(error=%e, dir=%root.display(), "failed to create conversations directory");
            e
        })?;
        Ok(Self {
            root,
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &LogKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    fn key_lock(&self, file_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(file_name.to_string()).or_default().clone()
    }

    /// Drop our handle and forget the lock once nobody else holds it. Handles are only
    /// cloned under the map mutex, so a count of one cannot race with a new waiter.
    fn release_key_lock(&self, file_name: &str, key_lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(key_lock);
        if locks
            .get(file_name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(file_name);
        }
    }

    async fn rewrite(path: &Path, turn: ConversationTurn) -> Result<usize, AppError> {
        let mut conversation = Self::load(path).await?;
        conversation.push(turn);
        let json = serde_json::to_vec_pretty(&conversation)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(conversation.len())
    }

    async fn load(path: &Path) -> Result<Vec<ConversationTurn>, AppError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn append_turn(&self, caller: &str, turn: ConversationTurn) -> Result<(), AppError> {
        let file_name = LogKey::new(caller, turn.day()).file_name();
        let path = self.root.join(&file_name);
        let key_lock = self.key_lock(&file_name);
        let saved = {
            let _guard = key_lock.lock().await;
            Self::rewrite(&path, turn).await
        };
        self.release_key_lock(&file_name, key_lock);

        let turns = saved?;
        debug!(path=%path.display(), turns, "saved conversation");
        Ok(())
    }

    async fn recent_turns(
        &self,
        caller: &str,
        day: Date,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, AppError> {
        let path = self.path_for(&LogKey::new(caller, day));
        let conversation = Self::load(&path).await?;
        Ok(tail(&conversation, limit))
    }
}

/// Keeps logs in memory; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    logs: Mutex<HashMap<LogKey, Vec<ConversationTurn>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full log for a key.
    pub fn turns(&self, caller: &str, day: Date) -> Vec<ConversationTurn> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(&LogKey::new(caller, day))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append_turn(&self, caller: &str, turn: ConversationTurn) -> Result<(), AppError> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry(LogKey::new(caller, turn.day()))
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn recent_turns(
        &self,
        caller: &str,
        day: Date,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, AppError> {
        Ok(tail(&self.turns(caller, day), limit))
    }
}
