// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run orchestration
//!
//! Acquires the session, builds a client from its token, reconciles, and
//! releases the session exactly once. Failing to acquire is the only error
//! that ends a run early; everything after that is reported in the
//! [`RunReport`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::client::InventoryClient;
use crate::desired::DesiredState;
use crate::engine::{Reconciler, SyncOptions};
use crate::errors::{SyncError, SyncResult};
use crate::notify::Notifier;
use crate::report::{Reporter, RunReport};
use crate::session::{Credentials, SessionGuard, SessionProvider, SessionToken};

/// Reconcile `desired` inside one inventory session
///
/// `connect` turns the session token into a client. The session is released
/// whether or not the client could be built.
pub async fn run_with_session<C, F>(
    sessions: Arc<dyn SessionProvider>,
    credentials: &Credentials,
    connect: F,
    desired: &DesiredState,
    options: SyncOptions,
    notifier: Option<Arc<dyn Notifier>>,
) -> SyncResult<RunReport>
where
    C: InventoryClient,
    F: FnOnce(&SessionToken) -> SyncResult<C>,
{
    let guard = SessionGuard::acquire(sessions, credentials)
        .await
        .map_err(|e| SyncError::SessionAcquire(e.to_string()))?;

    let client = match guard.token().map(connect) {
        Some(Ok(client)) => client,
        Some(Err(e)) => {
            release(guard).await;
            return Err(e);
        }
        None => {
            release(guard).await;
            return Err(SyncError::SessionAcquire("session holds no token".to_string()));
        }
    };

    match client.health_check().await {
        Ok(Some(version)) => info!("Connected to {} ({})", client.name(), version),
        Ok(None) => info!("Connected to {}", client.name()),
        Err(e) => warn!("Health check against {} failed: {}", client.name(), e),
    }

    let report = Reconciler::new(&client, options, Reporter::new(notifier))
        .run(desired)
        .await;

    release(guard).await;
    Ok(report)
}

async fn release(guard: SessionGuard) {
    if let Err(e) = guard.release().await {
        warn!("Failed to release session: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryInventory;
    use crate::session::SessionError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSessions {
        released: AtomicUsize,
        refuse: bool,
    }

    #[async_trait]
    impl SessionProvider for CountingSessions {
        async fn acquire(&self, _credentials: &Credentials) -> Result<SessionToken, SessionError> {
            if self.refuse {
                return Err(SessionError::Acquire(crate::client::ClientError::Api {
                    status: 403,
                    body: "invalid credentials".to_string(),
                }));
            }
            Ok(SessionToken::provisioned(1, "key"))
        }

        async fn release(&self, _token: SessionToken) -> Result<(), SessionError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_released_after_run() {
        let sessions = Arc::new(CountingSessions::default());
        let desired = DesiredState::parse("sites: [{name: nyc1}]\n").unwrap();

        let report = run_with_session(
            sessions.clone(),
            &Credentials::Token("t".to_string()),
            |_| Ok(MemoryInventory::new()),
            &desired,
            SyncOptions::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.counts().created, 1);
        assert_eq!(sessions.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_released_when_connect_fails() {
        let sessions = Arc::new(CountingSessions::default());

        let result = run_with_session(
            sessions.clone(),
            &Credentials::Token("t".to_string()),
            |_| -> SyncResult<MemoryInventory> {
                Err(SyncError::Configuration("bad url".to_string()))
            },
            &DesiredState::default(),
            SyncOptions::default(),
            None,
        )
        .await;

        assert!(matches!(result, Err(SyncError::Configuration(_))));
        assert_eq!(sessions.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_failure_is_fatal() {
        let sessions = Arc::new(CountingSessions {
            refuse: true,
            ..CountingSessions::default()
        });

        let result = run_with_session(
            sessions.clone(),
            &Credentials::Token("t".to_string()),
            |_| Ok(MemoryInventory::new()),
            &DesiredState::default(),
            SyncOptions::default(),
            None,
        )
        .await;

        assert!(matches!(result, Err(SyncError::SessionAcquire(_))));
        assert_eq!(sessions.released.load(Ordering::SeqCst), 0);
    }
}
