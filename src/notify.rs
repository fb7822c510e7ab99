// Copyright (c) 2025 - Cowboy AI, Inc.
//! Notification sink
//!
//! Notifications are best-effort: a failed post is logged by the caller and
//! never changes a reconciliation outcome.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Notification delivery error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification rejected with status {0}")]
    Rejected(u16),

    #[error("Notification transport error: {0}")]
    Transport(String),
}

/// Destination for human-readable run messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Posts messages to a Slack incoming webhook
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        // Slack answers 200 with body "ok"; anything else is a rejection
        if response.status() == reqwest::StatusCode::OK {
            debug!("Posted notification to Slack");
            Ok(())
        } else {
            Err(NotifyError::Rejected(response.status().as_u16()))
        }
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector that records messages and then reports failure
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text.to_string());
        }
        if self.fail {
            Err(NotifyError::Rejected(500))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collecting_notifier() {
        let notifier = CollectingNotifier::new();
        notifier.notify("first").await.unwrap();
        notifier.notify("second").await.unwrap();
        assert_eq!(notifier.messages(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failing_notifier_still_records() {
        let notifier = CollectingNotifier::failing();
        assert_eq!(notifier.notify("x").await, Err(NotifyError::Rejected(500)));
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_null_notifier() {
        tokio_test::assert_ok!(NullNotifier.notify("ignored").await);
    }
}
