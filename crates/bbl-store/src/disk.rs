use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bbl_domain::State;
use tracing::debug;

use crate::error::StoreError;
use crate::migrate::migrate;
use crate::store::StateStore;

const STATE_FILE: &str = "state.json";
const VARS_DIR: &str = "vars";
const TERRAFORM_DIR: &str = "terraform";
const LOCK_FILE: &str = ".bbl.lock";

/// File-backed [`StateStore`] rooted at one state dir.
///
/// Writes go to a temp file in the same directory, are fsynced, and are then
/// renamed over the target, so readers see either the old document or the
/// new one.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vars_dir(&self) -> PathBuf {
        self.dir.join(VARS_DIR)
    }

    pub fn terraform_dir(&self) -> PathBuf {
        self.dir.join(TERRAFORM_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn var_path(&self, deployment: &str, name: &str) -> PathBuf {
        self.vars_dir().join(format!("{}-{}", deployment, name))
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let parent = target
            .parent()
            .ok_or_else(|| StoreError::Corrupt(format!("{} has no parent dir", target.display())))?;
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::io(parent.display().to_string(), e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| StoreError::io(parent.display().to_string(), e))?;
        tmp.write_all(bytes)
            .map_err(|e| StoreError::io(target.display().to_string(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(target.display().to_string(), e))?;
        tmp.persist(target)
            .map_err(|e| StoreError::io(target.display().to_string(), e.error))?;

        // Make the rename itself durable.
        #[cfg(unix)]
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for DiskStore {
    async fn load(&self) -> Result<Option<State>, StoreError> {
        let path = self.state_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path.display().to_string(), e)),
        };

        let doc: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
        let migrated = migrate(doc)?;
        let state: State = serde_json::from_value(migrated)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    async fn set(&self, state: &State) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(state)?;
        bytes.push(b'\n');
        self.write_atomic(&self.state_path(), &bytes)?;
        debug!(path = %self.state_path().display(), "state persisted");
        Ok(())
    }

    async fn get_var(&self, deployment: &str, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.var_path(deployment, name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path.display().to_string(), e)),
        }
    }

    async fn set_var(&self, deployment: &str, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.write_atomic(&self.var_path(deployment, name), bytes)
    }

    async fn remove(&self) -> Result<(), StoreError> {
        let state = self.state_path();
        match std::fs::remove_file(&state) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(state.display().to_string(), e)),
        }
        for dir in [self.vars_dir(), self.terraform_dir()] {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(dir.display().to_string(), e)),
            }
        }
        Ok(())
    }

    async fn lock(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::io(self.dir.display().to_string(), e))?;
        let path = self.dir.join(LOCK_FILE);
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                return Err(StoreError::Locked(holder.trim().to_string()));
            }
            Err(e) => return Err(StoreError::io(path.display().to_string(), e)),
        };
        let info = format!("pid {} at {}", std::process::id(), chrono::Utc::now());
        file.write_all(info.as_bytes())
            .map_err(|e| StoreError::io(path.display().to_string(), e))?;
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        let path = self.dir.join(LOCK_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path.display().to_string(), e)),
        }
    }
}
