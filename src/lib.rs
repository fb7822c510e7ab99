// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency-ordered reconciliation of declarative desired state into NetBox
//!
//! This crate reads desired-state documents (sites, device roles,
//! manufacturers, device types, devices, interfaces, IP addresses, VLANs and
//! prefixes), finds each entry's existing record by natural key, and creates
//! or updates only what differs. Nothing is ever deleted.

pub mod client;
pub mod config;
pub mod desired;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod facts;
pub mod notify;
pub mod report;
pub mod runner;
pub mod schema;
pub mod session;
pub mod state_machine;

// Re-export commonly used types
pub use client::{ClientError, Filter, InventoryClient, MemoryInventory, NetBoxClient, Record};
pub use config::{NetBoxConfig, RunConfig};
pub use desired::DesiredState;
pub use engine::{Reconciler, SyncOptions};
pub use errors::{EntryError, SyncError, SyncResult};
pub use report::{OutcomeCounts, Reporter, RunReport};
pub use runner::run_with_session;
pub use schema::ResourceKind;
pub use session::{Credentials, NetBoxSessions, SessionGuard, SessionProvider};
pub use state_machine::EntryState;
