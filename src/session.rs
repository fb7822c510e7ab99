// Copyright (c) 2025 - Cowboy AI, Inc.
//! Session lifecycle
//!
//! A run authenticates once and gives the token back exactly once, whatever
//! happens in between.
//!
//! ```text
//! SessionGuard::acquire ──> token ──> engine run ──> SessionGuard::release
//!                                          │
//!                    (early return, panic) └──> Drop spawns release
//! ```
//!
//! [`NetBoxSessions`] provisions a short-lived API token from a username and
//! password and deletes it afterwards. A pre-issued token is used as-is and
//! never deleted.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::client::netbox::{classify, default_headers, read_json};
use crate::client::ClientError;
use crate::config::NetBoxConfig;

/// Session errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Token provisioning failed: {0}")]
    Acquire(ClientError),

    #[error("Token release failed: {0}")]
    Release(ClientError),
}

/// How to authenticate against the inventory
#[derive(Clone)]
pub enum Credentials {
    /// Provision a fresh token for this run
    Password { username: String, password: String },
    /// Use a token that was issued out of band
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

/// An API token held for the duration of a run
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Server-side id when the token was provisioned by this run
    id: Option<i64>,
    key: String,
}

impl SessionToken {
    /// Token provisioned by this run; released by deleting `id`
    pub fn provisioned(id: i64, key: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            key: key.into(),
        }
    }

    /// Token issued out of band; release is a no-op
    pub fn preissued(key: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Acquire/release contract consumed by the runner
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, credentials: &Credentials) -> Result<SessionToken, SessionError>;

    async fn release(&self, token: SessionToken) -> Result<(), SessionError>;
}

/// Token provisioning against NetBox's users API
#[derive(Debug, Clone)]
pub struct NetBoxSessions {
    base_url: String,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ProvisionedToken {
    id: i64,
    key: String,
}

impl NetBoxSessions {
    pub fn new(config: &NetBoxConfig) -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers(None)?)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }
}

#[async_trait]
impl SessionProvider for NetBoxSessions {
    async fn acquire(&self, credentials: &Credentials) -> Result<SessionToken, SessionError> {
        let (username, password) = match credentials {
            Credentials::Token(key) => return Ok(SessionToken::preissued(key.clone())),
            Credentials::Password { username, password } => (username, password),
        };

        let url = format!("{}/api/users/tokens/provision/", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| SessionError::Acquire(classify(e, self.timeout)))?;

        let body = read_json(response, self.timeout)
            .await
            .map_err(SessionError::Acquire)?;
        let token: ProvisionedToken = serde_json::from_value(body)
            .map_err(|e| SessionError::Acquire(ClientError::Decode(e.to_string())))?;

        info!("Provisioned NetBox token {} for {}", token.id, username);
        Ok(SessionToken::provisioned(token.id, token.key))
    }

    async fn release(&self, token: SessionToken) -> Result<(), SessionError> {
        let Some(id) = token.id() else {
            debug!("Pre-issued token; nothing to release");
            return Ok(());
        };

        let url = format!("{}/api/users/tokens/{}/", self.base_url, id);
        let response = self
            .client
            .delete(&url)
            .header("Authorization", format!("Token {}", token.key()))
            .send()
            .await
            .map_err(|e| SessionError::Release(classify(e, self.timeout)))?;

        read_json(response, self.timeout)
            .await
            .map_err(SessionError::Release)?;

        info!("Released NetBox token {}", id);
        Ok(())
    }
}

/// A token that is released exactly once
///
/// Call [`SessionGuard::release`] on the normal path. If the guard is
/// dropped without it, the release is spawned onto the current Tokio runtime.
pub struct SessionGuard {
    provider: Arc<dyn SessionProvider>,
    token: Option<SessionToken>,
}

impl SessionGuard {
    pub async fn acquire(
        provider: Arc<dyn SessionProvider>,
        credentials: &Credentials,
    ) -> Result<Self, SessionError> {
        let token = provider.acquire(credentials).await?;
        Ok(Self {
            provider,
            token: Some(token),
        })
    }

    /// The held token; present until released
    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub async fn release(mut self) -> Result<(), SessionError> {
        match self.token.take() {
            Some(token) => self.provider.release(token).await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        warn!("Session guard dropped without release; releasing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let provider = Arc::clone(&self.provider);
                handle.spawn(async move {
                    if let Err(e) = provider.release(token).await {
                        error!("Background token release failed: {}", e);
                    }
                });
            }
            Err(_) => error!("No runtime available; token {:?} was not released", token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSessions {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    #[async_trait]
    impl SessionProvider for CountingSessions {
        async fn acquire(&self, _credentials: &Credentials) -> Result<SessionToken, SessionError> {
            let n = self.acquired.fetch_add(1, Ordering::SeqCst) as i64;
            Ok(SessionToken::provisioned(n + 1, "key"))
        }

        async fn release(&self, _token: SessionToken) -> Result<(), SessionError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::Password {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?} {:?}", creds, SessionToken::preissued("s3cr3t"));
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_explicit_release_happens_once() {
        let sessions = Arc::new(CountingSessions::default());
        let guard = SessionGuard::acquire(sessions.clone(), &Credentials::Token("t".into()))
            .await
            .unwrap();
        assert!(guard.token().is_some());

        guard.release().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(sessions.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(sessions.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let sessions = Arc::new(CountingSessions::default());
        {
            let _guard = SessionGuard::acquire(sessions.clone(), &Credentials::Token("t".into()))
                .await
                .unwrap();
        }

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(sessions.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preissued_token_skips_provisioning() {
        let sessions = NetBoxSessions::new(&NetBoxConfig::default()).unwrap();
        let token = sessions
            .acquire(&Credentials::Token("abc".to_string()))
            .await
            .unwrap();

        assert_eq!(token.id(), None);
        assert_eq!(token.key(), "abc");
        sessions.release(token).await.unwrap();
    }
}
