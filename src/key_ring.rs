use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeyState {
    current_key_index: usize,
    failed_keys: BTreeSet<usize>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRingStatus {
    pub total: usize,
    pub active: usize,
    pub failed: usize,
    /// 1-based, 0 when no key is configured.
    pub current: usize,
}

/// Rendering API keys, rotated when the active key runs out of credits.
///
/// Exhausted keys are remembered in a small JSON state file so the next run
/// starts from a key that still works.
#[derive(Debug)]
pub struct KeyRing {
    keys: Vec<String>,
    state: Mutex<KeyState>,
    state_path: Option<PathBuf>,
}

impl KeyRing {
    pub fn new(keys: Vec<String>, state_path: Option<PathBuf>) -> Self {
        let mut state = match state_path.as_deref() {
            Some(path) => load_state(path),
            None => KeyState::default(),
        };
        state.failed_keys.retain(|&index| index < keys.len());
        if state.current_key_index >= keys.len() {
            state.current_key_index = 0;
        }
        Self {
            keys,
            state: Mutex::new(state),
            state_path,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The first usable key starting at the current index, or `None` when
    /// every key has been exhausted.
    pub fn current(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let mut state = self.lock();
        for _ in 0..self.keys.len() {
            if !state.failed_keys.contains(&state.current_key_index) {
                return Some(self.keys[state.current_key_index].clone());
            }
            state.current_key_index = (state.current_key_index + 1) % self.keys.len();
        }
        None
    }

    /// Marks the current key exhausted and moves to the next usable one.
    ///
    /// Returns `false` when there is nothing to rotate to.
    pub fn rotate(&self, reason: &str) -> bool {
        if self.keys.len() <= 1 {
            return false;
        }
        let mut state = self.lock();
        let old_index = state.current_key_index;
        state.failed_keys.insert(old_index);

        for _ in 0..self.keys.len() {
            state.current_key_index = (state.current_key_index + 1) % self.keys.len();
            if !state.failed_keys.contains(&state.current_key_index) {
                tracing::info!(
                    from = old_index + 1,
                    to = state.current_key_index + 1,
                    reason,
                    "api key rotated"
                );
                self.persist(&mut state);
                return true;
            }
        }

        tracing::error!(keys = self.keys.len(), "all api keys exhausted");
        self.persist(&mut state);
        false
    }

    pub fn status(&self) -> KeyRingStatus {
        let state = self.lock();
        let total = self.keys.len();
        KeyRingStatus {
            total,
            active: total - state.failed_keys.len(),
            failed: state.failed_keys.len(),
            current: if total > 0 {
                state.current_key_index + 1
            } else {
                0
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, KeyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &mut KeyState) {
        let Some(path) = self.state_path.as_deref() else {
            return;
        };
        state.last_updated = Some(chrono::Utc::now().to_rfc3339());
        if let Err(err) = crate::store::write_json_atomic(path, &*state) {
            tracing::warn!(path = %path.display(), ?err, "failed to save api key state");
        }
    }
}

fn load_state(path: &Path) -> KeyState {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return KeyState::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), ?err, "failed to read api key state");
            return KeyState::default();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), ?err, "ignoring invalid api key state");
        KeyState::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("key-{i}")).collect()
    }

    #[test]
    fn single_key_never_rotates() {
        let ring = KeyRing::new(keys(1), None);
        assert!(!ring.rotate("403"));
        assert_eq!(ring.current().as_deref(), Some("key-1"));
    }

    #[test]
    fn rotation_skips_exhausted_keys_until_none_remain() {
        let ring = KeyRing::new(keys(3), None);
        assert!(ring.rotate("403"));
        assert_eq!(ring.current().as_deref(), Some("key-2"));
        assert!(ring.rotate("403"));
        assert_eq!(ring.current().as_deref(), Some("key-3"));
        assert!(!ring.rotate("403"));
        assert_eq!(ring.current(), None);
        assert_eq!(
            ring.status(),
            KeyRingStatus {
                total: 3,
                active: 0,
                failed: 3,
                current: 3
            }
        );
    }

    #[test]
    fn state_survives_restart() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("api_key_state.json");

        let ring = KeyRing::new(keys(2), Some(path.clone()));
        assert!(ring.rotate("403"));
        drop(ring);

        let ring = KeyRing::new(keys(2), Some(path));
        assert_eq!(ring.current().as_deref(), Some("key-2"));
        assert_eq!(ring.status().failed, 1);
        Ok(())
    }

    #[test]
    fn stale_state_is_clamped_to_configured_keys() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("api_key_state.json");
        std::fs::write(&path, r#"{"current_key_index": 5, "failed_keys": [0, 7]}"#)?;

        let ring = KeyRing::new(keys(2), Some(path));
        assert_eq!(ring.current().as_deref(), Some("key-2"));
        assert_eq!(ring.status().failed, 1);
        Ok(())
    }
}
