// Persisted login session
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::TokenState;
use crate::modules::config::get_data_dir;

const SESSION_FILE: &str = "session.json";

/// Durable home of the current [`TokenState`]
pub trait SessionRepository: Send + Sync {
    fn load(&self) -> AppResult<Option<TokenState>>;
    fn save(&self, state: &TokenState) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;
}

/// JSON file store, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct FileSessionRepository {
    path: PathBuf,
}

impl FileSessionRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{data_dir}/session.json`
    pub fn default_location() -> AppResult<Self> {
        Ok(Self::new(get_data_dir()?.join(SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| SESSION_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionRepository for FileSessionRepository {
    fn load(&self) -> AppResult<Option<TokenState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content).map(Some).map_err(|e| {
            AppError::Session(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, state: &TokenState) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_vec_pretty(state)?;
        let temp_path = self.temp_path();

        let mut file = open_private(&temp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        drop(file);

        // Atomic rename
        fs::rename(&temp_path, &self.path).map_err(|e| {
            AppError::Session(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        tracing::debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
