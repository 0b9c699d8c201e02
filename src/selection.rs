use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::platform::UserId;

/// Commands each user has opted into through the selection menu.
///
/// Append-only and in-memory: entries are never removed and nothing survives
/// a restart.
#[derive(Debug, Default)]
pub struct SelectionStore {
    inner: Mutex<HashMap<UserId, Vec<String>>>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `commands` into the user's selection and return the full list.
    /// Order of first selection is kept; duplicates are dropped.
    pub async fn append(&self, user: UserId, commands: &[String]) -> Vec<String> {
        let mut map = self.inner.lock().await;
        let entry = map.entry(user).or_default();
        for cmd in commands {
            if !entry.contains(cmd) {
                entry.push(cmd.clone());
            }
        }
        entry.clone()
    }

    pub async fn has(&self, user: UserId, command: &str) -> bool {
        self.inner
            .lock()
            .await
            .get(&user)
            .map(|cmds| cmds.iter().any(|c| c == command))
            .unwrap_or(false)
    }
}
