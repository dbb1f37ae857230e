//! Anonymous participant identity.
//!
//! A client obtains its [`UserId`] once, before building any coordinator,
//! and passes it explicitly from then on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use derive_more::{Display, Error};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::UserId;

/// Issues the identity a client plays under.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns this client's id, creating one on first use.
    ///
    /// Repeated calls in one session return the same id.
    async fn get_or_create_anonymous_id(&self) -> Result<UserId, IdentityError>;
}

/// Identity error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Identity error: {} at {}:{}", message, file, line)]
pub struct IdentityError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl IdentityError {
    /// Creates a new identity error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

fn anonymous_id() -> UserId {
    UserId::from(format!("anon-{}", uuid::Uuid::new_v4()))
}

/// Identity that lives for the current process only.
#[derive(Debug, Default)]
pub struct EphemeralIdentity {
    id: OnceCell<UserId>,
}

impl EphemeralIdentity {
    /// Creates a provider with no id issued yet.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for EphemeralIdentity {
    #[instrument(skip(self))]
    async fn get_or_create_anonymous_id(&self) -> Result<UserId, IdentityError> {
        let id = self
            .id
            .get_or_init(|| async {
                let id = anonymous_id();
                info!(user_id = %id, "Issued ephemeral identity");
                id
            })
            .await;
        Ok(id.clone())
    }
}

/// Identity persisted to a file and reused across runs.
#[derive(Debug)]
pub struct FileIdentity {
    path: PathBuf,
    id: OnceCell<UserId>,
}

impl FileIdentity {
    /// Creates a provider storing its id at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id: OnceCell::new(),
        }
    }

    /// Where the id is stored.
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn read_or_create(&self) -> Result<UserId, IdentityError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if !content.trim().is_empty() => {
                let id = UserId::from(content.trim());
                debug!(user_id = %id, "Loaded stored identity");
                return Ok(id);
            }
            Ok(_) => debug!("Identity file empty, issuing a new id"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No identity file, issuing a new id")
            }
            Err(e) => {
                return Err(IdentityError::new(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        }

        let id = anonymous_id();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                IdentityError::new(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&self.path, id.as_str()).await.map_err(|e| {
            IdentityError::new(format!("Failed to write {}: {}", self.path.display(), e))
        })?;
        info!(user_id = %id, "Issued and stored new identity");
        Ok(id)
    }
}

#[async_trait]
impl IdentityProvider for FileIdentity {
    async fn get_or_create_anonymous_id(&self) -> Result<UserId, IdentityError> {
        self.id
            .get_or_try_init(|| self.read_or_create())
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_identity_is_stable() {
        let identity = EphemeralIdentity::new();
        let first = identity.get_or_create_anonymous_id().await.expect("id");
        let second = identity.get_or_create_anonymous_id().await.expect("id");
        assert_eq!(first, second);
        assert!(first.as_str().starts_with("anon-"));
    }

    #[tokio::test]
    async fn test_distinct_clients_get_distinct_ids() {
        let a = EphemeralIdentity::new().get_or_create_anonymous_id().await.expect("id");
        let b = EphemeralIdentity::new().get_or_create_anonymous_id().await.expect("id");
        assert_ne!(a, b);
    }
}
