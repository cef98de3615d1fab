//! Client configuration, stored as JSON.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ideaflash_storage::NoteStorage;

use crate::error::EngineError;
use crate::http::HttpRemote;
use crate::session::{Session, SessionFile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// SQLite file holding the local notes
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
    /// Remote service base url; sync is disabled when absent
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

fn default_database_file() -> PathBuf {
    PathBuf::from("ideaflash.db")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_session_file() -> PathBuf {
    PathBuf::from("session.json")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            api_base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            session_file: default_session_file(),
        }
    }
}

impl ClientConfig {
    /// Defaults when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(EngineError::Io(e)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.database_file.as_os_str().is_empty() {
            return Err(EngineError::Config("database_file cannot be empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn storage(&self) -> NoteStorage {
        NoteStorage::at_path(&self.database_file)
    }

    pub fn session_store(&self) -> SessionFile {
        SessionFile::new(&self.session_file)
    }

    /// `None` when no remote is configured.
    pub fn remote(&self, session: Option<&Session>) -> Result<Option<HttpRemote>, EngineError> {
        let Some(base_url) = self.api_base_url.as_deref() else {
            return Ok(None);
        };
        let mut remote = HttpRemote::new(base_url, self.request_timeout())?;
        if let Some(session) = session {
            remote = remote.with_session(session);
        }
        Ok(Some(remote))
    }
}
