//! Client state that survives between runs: the active session, the
//! selected repository and the auth token.
//!
//! Stored as JSON next to the config file. Writes go through a temp file
//! and a rename while holding an exclusive lock on a sibling `.lock` file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use issuedesk_common::Repository;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    pub active_session_id: Option<String>,
    #[serde(default)]
    pub selected_repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl LocalState {
    pub fn is_logged_in(&self) -> bool {
        self.auth_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/issuedesk/state.json`
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("issuedesk").join(STATE_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or empty file reads as the default state.
    pub fn load(&self) -> Result<LocalState> {
        if !self.path.exists() {
            return Ok(LocalState::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(LocalState::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    pub fn save(&self, state: &LocalState) -> Result<()> {
        let _lock = self.lock()?;
        self.write(state)
    }

    /// Read-modify-write under the lock. Returns the stored state.
    pub fn update(&self, f: impl FnOnce(&mut LocalState)) -> Result<LocalState> {
        let _lock = self.lock()?;
        let mut state = self.load()?;
        f(&mut state);
        self.write(&state)?;
        Ok(state)
    }

    fn write(&self, state: &LocalState) -> Result<()> {
        let parent = self
            .path
            .parent()
            .context("State path has no parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
        let tmp = self.sibling("tmp");
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            restrict_permissions(&file)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Local state saved");
        Ok(())
    }

    fn lock(&self) -> Result<File> {
        let lock_path = self.sibling("lock");
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
        Ok(file)
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| STATE_FILE_NAME.to_string());
        self.path.with_file_name(format!(".{}.{}", name, extension))
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .context("Failed to restrict state file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("nested").join(STATE_FILE_NAME))
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let state = store(&dir).load().unwrap();
        assert_eq!(state, LocalState::default());
        assert!(!state.is_logged_in());
    }

    #[test]
    fn test_save_then_load_restores_continuity() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let state = LocalState {
            active_session_id: Some("s-42".into()),
            selected_repository: Repository::parse("acme/widgets@dev", "main"),
            auth_token: Some("tok".into()),
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
        assert!(!store.sibling("tmp").exists());
    }

    #[test]
    fn test_update_preserves_other_fields() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .update(|s| s.auth_token = Some("tok".into()))
            .unwrap();
        let state = store
            .update(|s| s.active_session_id = Some("s-1".into()))
            .unwrap();
        assert_eq!(state.auth_token.as_deref(), Some("tok"));
        assert_eq!(store.load().unwrap().active_session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_logout_drops_token_from_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.update(|s| s.auth_token = Some("tok".into())).unwrap();
        store.update(|s| s.auth_token = None).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("auth_token"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[cfg(unix)]
    #[test]
    fn test_state_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&LocalState::default()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
