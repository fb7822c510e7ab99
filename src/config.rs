// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run configuration
//!
//! Connection settings come from the environment so credentials never land
//! in desired-state documents:
//!
//! | Variable               | Meaning                                    |
//! |------------------------|--------------------------------------------|
//! | `NETBOX_URL`           | NetBox base URL                            |
//! | `NETBOX_API_TOKEN`     | Pre-issued token (skips provisioning)      |
//! | `NETBOX_USERNAME`      | Username for token provisioning            |
//! | `NETBOX_PASSWORD`      | Password for token provisioning            |
//! | `NETBOX_TIMEOUT_SECS`  | Per-call deadline (default 30)             |
//! | `NETBOX_CREATE_ONLY`   | `true` disables drift updates              |
//! | `SLACK_WEBHOOK_URL`    | Optional notification webhook              |

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::SyncOptions;
use crate::errors::{SyncError, SyncResult};
use crate::session::Credentials;

/// Configuration for the NetBox connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetBoxConfig {
    /// NetBox base URL (e.g., "http://netbox.example.com")
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for NetBoxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Everything a run needs besides the desired state itself
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub netbox: NetBoxConfig,
    pub credentials: Credentials,
    pub slack_webhook: Option<String>,
    pub options: SyncOptions,
}

impl RunConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut netbox = NetBoxConfig::default();
        if let Some(url) = var("NETBOX_URL") {
            netbox.base_url = url;
        }
        if let Some(secs) = var("NETBOX_TIMEOUT_SECS") {
            netbox.timeout_secs = secs.trim().parse().map_err(|_| {
                SyncError::Configuration(format!("NETBOX_TIMEOUT_SECS is not a number: {}", secs))
            })?;
        }

        let credentials = match (var("NETBOX_API_TOKEN"), var("NETBOX_USERNAME"), var("NETBOX_PASSWORD")) {
            (Some(token), _, _) => Credentials::Token(token),
            (None, Some(username), Some(password)) => Credentials::Password { username, password },
            _ => {
                return Err(SyncError::Configuration(
                    "set NETBOX_API_TOKEN, or NETBOX_USERNAME and NETBOX_PASSWORD".to_string(),
                ))
            }
        };

        let create_only = var("NETBOX_CREATE_ONLY")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let options = SyncOptions {
            create_only,
            call_timeout: Duration::from_secs(netbox.timeout_secs),
        };

        Ok(Self {
            netbox,
            credentials,
            slack_webhook: var("SLACK_WEBHOOK_URL"),
            options,
        })
    }
}
