//! Per-bot JSON settings documents (welcome templates, log channel).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::fsio::write_atomic;
use crate::platform::ChannelId;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Channel ids are stored as strings, with `""` meaning unset.
mod channel_string {
    use super::ChannelId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<ChannelId>, s: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => s.serialize_str(&id.0.to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ChannelId>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
            Null(()),
        }
        Ok(match Raw::deserialize(d)? {
            Raw::Text(s) => s.trim().parse().ok().map(ChannelId),
            Raw::Number(n) => Some(ChannelId(n)),
            Raw::Null(()) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeSettings {
    #[serde(default, with = "channel_string")]
    pub welcome_channel_id: Option<ChannelId>,
    #[serde(default, with = "channel_string")]
    pub goodbye_channel_id: Option<ChannelId>,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    #[serde(default = "default_goodbye_message")]
    pub goodbye_message: String,
}

fn default_welcome_message() -> String {
    "Yo {user}, welcome to {server}! 🔥".to_string()
}

fn default_goodbye_message() -> String {
    "Sad to see you go, {user}! 😢".to_string()
}

impl Default for WelcomeSettings {
    fn default() -> Self {
        Self {
            welcome_channel_id: None,
            goodbye_channel_id: None,
            welcome_message: default_welcome_message(),
            goodbye_message: default_goodbye_message(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSettings {
    #[serde(default, with = "channel_string")]
    pub log_channel_id: Option<ChannelId>,
}

/// A JSON document loaded once and rewritten on every change.
pub struct SettingsStore<T> {
    path: PathBuf,
    current: Mutex<T>,
}

impl<T> SettingsStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    /// Load `path`, creating it with defaults when absent. A document that
    /// fails to parse is left on disk and defaults are used in memory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed settings, using defaults");
                    T::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let value = T::default();
                persist(&path, &value)?;
                info!(path = %path.display(), "created settings file");
                value
            }
            Err(source) => return Err(SettingsError::Read { path, source }),
        };
        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    /// In-memory store that never touches disk until `update`.
    pub fn with_value(path: impl Into<PathBuf>, value: T) -> Self {
        Self {
            path: path.into(),
            current: Mutex::new(value),
        }
    }

    pub async fn get(&self) -> T {
        self.current.lock().await.clone()
    }

    /// Apply `change` and persist. Memory is only updated once the write
    /// has succeeded.
    pub async fn update<F>(&self, change: F) -> Result<T, SettingsError>
    where
        F: FnOnce(&mut T),
    {
        let mut guard = self.current.lock().await;
        let mut next = guard.clone();
        change(&mut next);
        persist(&self.path, &next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn persist<T: Serialize>(path: &Path, value: &T) -> Result<(), SettingsError> {
    let data = serde_json::to_string_pretty(value)?;
    write_atomic(path, data.as_bytes()).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}
