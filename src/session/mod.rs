//! Time-limited login session persisted to a small JSON file.
//!
//! The file is plain text; anyone with access to it can read the username
//! and forge a session.

use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// How long a login or signup stays valid.
pub fn session_ttl() -> Duration {
    Duration::days(7)
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("session file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode session for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Stored session fields. Key names match the on-disk format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "is_logged_in", default)]
    pub logged_in: bool,
    /// Epoch milliseconds.
    #[serde(rename = "expiry_time", default)]
    pub expiry_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
}

impl Session {
    fn started_at(now: DateTime<Utc>, username: &str, fullname: Option<&str>) -> Self {
        Self {
            logged_in: true,
            expiry_ms: (now + session_ttl()).timestamp_millis(),
            username: Some(username.to_owned()),
            fullname: fullname.map(str::to_owned),
        }
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expiry_ms)
    }

    /// The flag is honoured only strictly before expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.logged_in && now.timestamp_millis() < self.expiry_ms
    }
}

/// Where the application goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Authentication,
    Home,
}

pub struct SessionManager {
    path: PathBuf,
}

impl SessionManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn login(
        &self,
        username: &str,
        fullname: Option<&str>,
    ) -> Result<Session, SessionError> {
        self.start_at(Utc::now(), username, fullname).await
    }

    /// Same session shape as `login`.
    pub async fn signup(
        &self,
        username: &str,
        fullname: Option<&str>,
    ) -> Result<Session, SessionError> {
        self.start_at(Utc::now(), username, fullname).await
    }

    /// Write a fresh session that expires `session_ttl()` after `now`,
    /// replacing whatever was stored.
    pub async fn start_at(
        &self,
        now: DateTime<Utc>,
        username: &str,
        fullname: Option<&str>,
    ) -> Result<Session, SessionError> {
        let session = Session::started_at(now, username, fullname);
        self.save(&session).await?;
        info!(username = %username, expiry = ?session.expiry(), "Session started");
        Ok(session)
    }

    pub async fn is_logged_in(&self) -> bool {
        self.is_logged_in_at(Utc::now()).await
    }

    /// Expired sessions count as logged out; their data is left on disk
    /// until the next login or logout.
    pub async fn is_logged_in_at(&self, now: DateTime<Utc>) -> bool {
        match self.current().await {
            Ok(session) => session.is_valid_at(now),
            Err(e) => {
                warn!(error = %e, "Unreadable session treated as logged out");
                false
            }
        }
    }

    /// Erase the session entirely.
    pub async fn logout(&self) -> Result<Route, SessionError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        }
        info!("Session cleared");
        Ok(Route::Authentication)
    }

    pub async fn fullname(&self) -> Option<String> {
        self.current().await.ok().and_then(|s| s.fullname)
    }

    pub async fn username(&self) -> Option<String> {
        self.current().await.ok().and_then(|s| s.username)
    }

    pub async fn entry_route(&self) -> Route {
        if self.is_logged_in().await {
            Route::Home
        } else {
            Route::Authentication
        }
    }

    /// Stored session, or an empty one if none was ever written.
    pub async fn current(&self) -> Result<Session, SessionError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Session::default()),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(session).map_err(|source| SessionError::Encode {
            path: self.path.clone(),
            source,
        })?;

        fs::write(&self.path, &json).await.map_err(io_err)?;

        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }
}
