// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for netbox-sync
//!
//! Provides deterministic desired-state documents and helpers for running
//! the reconciler against the in-memory inventory.
//!
//! # Design Principles
//! - All documents are fixed constants
//! - Every run uses `MemoryInventory`, so writes can be asserted exactly
//! - Per-call deadlines are short enough for paused-time tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use netbox_sync::client::Fields;
use netbox_sync::session::{Credentials, SessionError, SessionProvider, SessionToken};
use netbox_sync::{DesiredState, MemoryInventory, Reconciler, Reporter, RunReport, SyncOptions};

/// A small but complete site: every kind appears at least once
pub const CAMPUS: &str = r#"
sites:
  - name: nyc1
    status: active
    physical_address: 1 Main St
    time_zone: America/New_York
device_roles:
  - name: router
    color: ff0000
manufacturers:
  - name: mikrotik
device_types:
  - model: rb4011
    manufacturer: mikrotik
devices:
  - name: nyc1-rtr1
    site: nyc1
    role: router
    type: rb4011
    status: active
interfaces:
  - device: nyc1-rtr1
    interfaces:
      - name: ether1
        type: 1000base-t
        address: 10.1.10.1/24
      - name: bridge1
        type: bridge
vlans:
  - site: nyc1
    vid: 10
    name: users
  - site: nyc1
    vid: 20
    name: voice
prefixes:
  - prefix: 10.1.0.0/16
    site: nyc1
    container: true
  - prefix: 10.1.10.0/24
    site: nyc1
    vlan: { vid: 10, name: users }
  - prefix: 10.1.20.0/24
    site: nyc1
    vlan: { vid: 20, name: voice }
"#;

/// Number of records [`CAMPUS`] creates in an empty inventory
pub const CAMPUS_RECORDS: usize = 13;

pub const CALL_TIMEOUT: Duration = Duration::from_secs(2);

pub fn desired(yaml: &str) -> DesiredState {
    DesiredState::parse(yaml).expect("Invalid desired state in test fixture")
}

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("Fixture must be an object, got {}", other),
    }
}

pub fn options() -> SyncOptions {
    SyncOptions {
        create_only: false,
        call_timeout: CALL_TIMEOUT,
    }
}

/// Run one reconciliation pass with no notifier
pub async fn run(inventory: &MemoryInventory, state: &DesiredState) -> RunReport {
    Reconciler::new(inventory, options(), Reporter::new(None))
        .run(state)
        .await
}

/// Session provider that counts acquire and release calls
#[derive(Debug, Default)]
pub struct CountingSessions {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl CountingSessions {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for CountingSessions {
    async fn acquire(&self, _credentials: &Credentials) -> Result<SessionToken, SessionError> {
        let n = self.acquired.fetch_add(1, Ordering::SeqCst) as i64;
        Ok(SessionToken::provisioned(n + 1, "0123456789abcdef"))
    }

    async fn release(&self, _token: SessionToken) -> Result<(), SessionError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn credentials() -> Credentials {
    Credentials::Password {
        username: "netbox-sync".to_string(),
        password: "not-a-secret".to_string(),
    }
}
