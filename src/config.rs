//! Durable bot configuration: source chats, forwarding destinations, admins
//! and pacing delay, persisted as a YAML document after every mutation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

/// Inter-delivery delay used when the config file does not specify one.
pub const DEFAULT_DELAY_SECONDS: f64 = 1.0;

/// Errors raised by [`ConfigStore`] operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The persisted document failed to parse. Fatal at startup, never retried.
    #[error("config file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// A forwarding destination. Identity is `(chat_id, thread_id)`; the title is
/// descriptive only and does not participate in uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub chat_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i32>,
    #[serde(default)]
    pub title: String,
}

/// A monitored chat whose new messages trigger forwarding.
///
/// Older config files stored source chats as bare integers; both that form
/// and the structured mapping are accepted on read. Written back structured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SourceChatRepr")]
pub struct SourceChat {
    pub chat_id: i64,
    #[serde(default)]
    pub title: String,
}

impl SourceChat {
    #[must_use]
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            title: String::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceChatRepr {
    Entry {
        chat_id: i64,
        #[serde(default)]
        title: String,
    },
    Id(i64),
}

impl From<SourceChatRepr> for SourceChat {
    fn from(repr: SourceChatRepr) -> Self {
        match repr {
            SourceChatRepr::Entry { chat_id, title } => Self { chat_id, title },
            SourceChatRepr::Id(chat_id) => Self::new(chat_id),
        }
    }
}

/// The full configuration document.
///
/// `target_chats` order is fan-out order: first registered, first forwarded-to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub bot_token: String,
    pub target_chats: Vec<Destination>,
    pub source_chats: Vec<SourceChat>,
    pub admin_usernames: Vec<String>,
    pub delay_seconds: f64,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            target_chats: Vec::new(),
            source_chats: Vec::new(),
            admin_usernames: Vec::new(),
            delay_seconds: DEFAULT_DELAY_SECONDS,
        }
    }
}

impl MuxConfig {
    /// Inter-delivery delay as a [`Duration`], clamped to zero for negative
    /// or non-finite values in the file.
    #[must_use]
    pub fn delay(&self) -> Duration {
        if self.delay_seconds.is_finite() && self.delay_seconds > 0.0 {
            Duration::from_secs_f64(self.delay_seconds)
        } else {
            Duration::ZERO
        }
    }
}

/// Sole owner of the persisted configuration.
///
/// Every operation is serialized behind one mutex so concurrent admin
/// commands cannot interleave or corrupt the backing file. Mutations apply to
/// a copy, persist the whole document atomically (write-then-rename), and
/// only then commit in memory, so a failed write leaves the previous state
/// intact.
pub struct ConfigStore {
    path: PathBuf,
    inner: Mutex<MuxConfig>,
}

impl ConfigStore {
    /// Load the configuration from `path`, creating a default file if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Corrupt`] for a malformed document, or an I/O
    /// variant when the file cannot be read or the default cannot be written.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => {
                let config = MuxConfig::default();
                persist(&path, &config).await?;
                config
            }
            Ok(raw) => serde_yaml::from_str(&raw).map_err(|source| ConfigError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let config = MuxConfig::default();
                persist(&path, &config).await?;
                config
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Ok(Self {
            path,
            inner: Mutex::new(config),
        })
    }

    /// A read-only copy of the current configuration. In-flight fan-outs hold
    /// their own snapshot and never observe later mutations.
    pub async fn snapshot(&self) -> MuxConfig {
        self.inner.lock().await.clone()
    }

    pub async fn is_admin(&self, username: &str) -> bool {
        self.inner
            .lock()
            .await
            .admin_usernames
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(username))
    }

    pub async fn is_source(&self, chat_id: i64) -> bool {
        self.inner
            .lock()
            .await
            .source_chats
            .iter()
            .any(|source| source.chat_id == chat_id)
    }

    /// Register a destination. Returns `false` without appending when a
    /// destination with the same `(chat_id, thread_id)` already exists; a
    /// changed non-empty title is refreshed in place in that case.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when persisting fails; the in-memory
    /// state is left unchanged.
    pub async fn add_destination(
        &self,
        chat_id: i64,
        thread_id: Option<i32>,
        title: &str,
    ) -> Result<bool, ConfigError> {
        let mut guard = self.inner.lock().await;
        let mut next = guard.clone();
        if let Some(existing) = next
            .target_chats
            .iter_mut()
            .find(|dest| dest.chat_id == chat_id && dest.thread_id == thread_id)
        {
            if !title.is_empty() && existing.title != title {
                existing.title = title.to_string();
                persist(&self.path, &next).await?;
                *guard = next;
            }
            return Ok(false);
        }
        next.target_chats.push(Destination {
            chat_id,
            thread_id,
            title: title.to_string(),
        });
        persist(&self.path, &next).await?;
        *guard = next;
        Ok(true)
    }

    /// Remove a destination. Returns `false` when no `(chat_id, thread_id)`
    /// match exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when persisting fails.
    pub async fn remove_destination(
        &self,
        chat_id: i64,
        thread_id: Option<i32>,
    ) -> Result<bool, ConfigError> {
        let mut guard = self.inner.lock().await;
        let mut next = guard.clone();
        let Some(index) = next
            .target_chats
            .iter()
            .position(|dest| dest.chat_id == chat_id && dest.thread_id == thread_id)
        else {
            return Ok(false);
        };
        next.target_chats.remove(index);
        persist(&self.path, &next).await?;
        *guard = next;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when persisting fails.
    pub async fn set_sources(&self, sources: Vec<SourceChat>) -> Result<(), ConfigError> {
        self.replace(|config| config.source_chats = sources).await
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when persisting fails.
    pub async fn set_admins(&self, usernames: Vec<String>) -> Result<(), ConfigError> {
        self.replace(|config| config.admin_usernames = usernames)
            .await
    }

    /// Replace the inter-delivery delay. Negative values clamp to zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when persisting fails.
    pub async fn set_delay(&self, delay_seconds: f64) -> Result<(), ConfigError> {
        self.replace(|config| config.delay_seconds = delay_seconds.max(0.0))
            .await
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when persisting fails.
    pub async fn set_token(&self, token: &str) -> Result<(), ConfigError> {
        self.replace(|config| config.bot_token = token.to_string())
            .await
    }

    async fn replace(&self, apply: impl FnOnce(&mut MuxConfig)) -> Result<(), ConfigError> {
        let mut guard = self.inner.lock().await;
        let mut next = guard.clone();
        apply(&mut next);
        persist(&self.path, &next).await?;
        *guard = next;
        Ok(())
    }
}

/// Write the whole document to a sibling temp file, then rename it over the
/// target. A crash mid-write never leaves a half-written config behind.
async fn persist(path: &Path, config: &MuxConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }
    let raw = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yml.tmp");
    fs::write(&tmp, raw)
        .await
        .map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    fs::rename(&tmp, path)
        .await
        .map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}
