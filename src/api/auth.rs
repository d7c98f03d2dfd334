use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{client::HttpBackend, ApiError};

/// Supplies the bearer token for authenticated collaborator calls.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    /// Called when a collaborator rejects the token (401/403).
    fn invalidate(&self);
}

/// Process-wide login session. Established on login, cleared on logout or expiry.
///
/// A remembered token is kept in `token_path` so it survives restarts; an
/// unremembered one lives in memory only.
pub struct CredentialStore {
    token_path: PathBuf,
    token: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn new(token_path: PathBuf) -> Result<Self> {
        let token = if token_path.exists() {
            let contents = fs::read_to_string(&token_path)
                .with_context(|| format!("Failed to read token from {}", token_path.display()))?;
            Some(contents.trim().to_string()).filter(|token| !token.is_empty())
        } else {
            None
        };

        Ok(Self {
            token_path,
            token: RwLock::new(token),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<String>> {
        self.token.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<String>> {
        self.token.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn establish(&self, token: String, remember: bool) -> Result<()> {
        if remember {
            if let Some(parent) = self.token_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(&self.token_path, &token).with_context(|| {
                format!("Failed to write token to {}", self.token_path.display())
            })?;
        } else {
            self.remove_persisted()?;
        }

        *self.write() = Some(token);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        *self.write() = None;
        self.remove_persisted()
    }

    fn remove_persisted(&self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path).with_context(|| {
                format!("Failed to remove token at {}", self.token_path.display())
            })?;
        }
        Ok(())
    }
}

impl CredentialProvider for CredentialStore {
    fn bearer_token(&self) -> Option<String> {
        self.read().clone()
    }

    fn invalidate(&self) {
        info!("Credential rejected by server; clearing session");
        if let Err(err) = self.clear() {
            warn!("Failed to clear persisted token: {err:#}");
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: String,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

impl HttpBackend {
    /// `POST /auth/login`. Returns the issued token; does not store it.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        let request = LoginRequest {
            email: email.trim().to_lowercase(),
            password,
        };

        let response: Option<LoginResponse> = self
            .send_unauthenticated(self.http().post(url).json(&request))
            .await
            .map_err(|err| match err {
                ApiError::Unauthorized { status } => ApiError::Status {
                    status,
                    message: "invalid email or password".into(),
                },
                other => other,
            })?;

        response
            .and_then(|body| body.token)
            .ok_or_else(|| ApiError::Decode("login response carried no token".into()))
    }
}
