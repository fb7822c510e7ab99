// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory Client contract
//!
//! The engine talks to the source of truth exclusively through
//! [`InventoryClient`]. Implementations:
//!
//! - [`NetBoxClient`] - NetBox REST API over `reqwest`
//! - [`MemoryInventory`] - in-process store that records every write
//!
//! All calls are request/response and awaited one at a time. The engine
//! wraps the client in a [`TimedClient`] so every call carries its own
//! deadline.

pub mod memory;
pub mod netbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::IpAddressWithCidr;
use crate::schema::ResourceKind;

pub use memory::{MemoryInventory, Operation, WriteCall};
pub use netbox::NetBoxClient;

/// Field map sent to or read from the inventory
pub type Fields = Map<String, Value>;

/// Errors reported by an inventory client
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientError {
    /// The inventory answered but refused the request
    #[error("Inventory API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The inventory could not be reached at all
    #[error("Inventory unreachable: {0}")]
    Transport(String),

    /// The call did not complete within its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be understood
    #[error("Failed to decode inventory response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

/// Result type for inventory calls
pub type ClientResult<T> = Result<T, ClientError>;

/// A record as stored by the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    pub fn new(id: i64, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Field value with nested choice and reference objects collapsed
    ///
    /// NetBox returns `{"value": "active", "label": "Active"}` for choice
    /// fields and `{"id": 3, "url": ..}` for references; both collapse to
    /// their scalar so they compare against desired values directly.
    pub fn value(&self, field: &str) -> Value {
        self.fields.get(field).map(flatten).unwrap_or(Value::Null)
    }
}

/// Collapse choice (`value`) and reference (`id`) objects to scalars
pub fn flatten(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get("value") {
                inner.clone()
            } else if let Some(id) = map.get("id") {
                id.clone()
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

/// One exact-match condition in a [`Filter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Field equals this string
    Text(String),
    /// Field equals this integer
    Int(i64),
    /// Field is this address with any prefix length
    Host(IpAddr),
    /// Field references the record with this id (`<field>_id=` on NetBox)
    Reference(i64),
    /// Reference field is empty (`<field>_id=null` on NetBox)
    Unset,
}

/// Exact-match filter for `get` and `list`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, FilterValue)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push((field.into(), FilterValue::Text(value.into())));
        self
    }

    pub fn int(mut self, field: impl Into<String>, value: i64) -> Self {
        self.conditions.push((field.into(), FilterValue::Int(value)));
        self
    }

    pub fn host(mut self, field: impl Into<String>, address: IpAddr) -> Self {
        self.conditions.push((field.into(), FilterValue::Host(address)));
        self
    }

    pub fn reference(mut self, field: impl Into<String>, id: i64) -> Self {
        self.conditions
            .push((field.into(), FilterValue::Reference(id)));
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.conditions.push((field.into(), FilterValue::Unset));
        self
    }

    pub fn conditions(&self) -> &[(String, FilterValue)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Query parameters in NetBox filter syntax
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|(field, value)| match value {
                FilterValue::Text(s) => (field.clone(), s.clone()),
                FilterValue::Int(n) => (field.clone(), n.to_string()),
                // NetBox matches a bare address against every prefix length
                FilterValue::Host(address) => (field.clone(), address.to_string()),
                FilterValue::Reference(id) => (format!("{}_id", field), id.to_string()),
                FilterValue::Unset => (format!("{}_id", field), "null".to_string()),
            })
            .collect()
    }

    /// Whether `record` satisfies every condition
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            let actual = record.value(field);
            match expected {
                FilterValue::Text(s) => actual.as_str() == Some(s.as_str()),
                FilterValue::Int(n) | FilterValue::Reference(n) => actual.as_i64() == Some(*n),
                FilterValue::Host(address) => actual
                    .as_str()
                    .and_then(|s| IpAddressWithCidr::new(s).ok())
                    .is_some_and(|ip| ip.address() == *address),
                FilterValue::Unset => actual.is_null(),
            }
        })
    }
}

/// Request/response access to the source of truth
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Single record matching `filter`, if any
    async fn get(&self, kind: ResourceKind, filter: &Filter) -> ClientResult<Option<Record>> {
        let mut records = self.list(kind, filter).await?;
        records.sort_by_key(|r| r.id);
        Ok(records.into_iter().next())
    }

    /// All records matching `filter`
    async fn list(&self, kind: ResourceKind, filter: &Filter) -> ClientResult<Vec<Record>>;

    /// Create a record from `fields`
    async fn create(&self, kind: ResourceKind, fields: &Fields) -> ClientResult<Record>;

    /// Write `fields` onto the record `id`
    async fn update(&self, kind: ResourceKind, id: i64, fields: &Fields) -> ClientResult<Record>;

    /// Valid values for an enumerated field
    async fn choices(&self, kind: ResourceKind, field: &str) -> ClientResult<BTreeSet<String>>;

    /// Verify the inventory is reachable; returns a version string when known
    async fn health_check(&self) -> ClientResult<Option<String>> {
        Ok(None)
    }

    /// Name of this client for logs
    fn name(&self) -> &str;
}

/// An [`InventoryClient`] borrowed with a per-call deadline
#[derive(Clone, Copy)]
pub struct TimedClient<'a> {
    inner: &'a dyn InventoryClient,
    timeout: Duration,
}

impl<'a> TimedClient<'a> {
    pub fn new(inner: &'a dyn InventoryClient, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn within<T>(&self, call: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        }
    }

    pub async fn list(&self, kind: ResourceKind, filter: &Filter) -> ClientResult<Vec<Record>> {
        self.within(self.inner.list(kind, filter)).await
    }

    pub async fn create(&self, kind: ResourceKind, fields: &Fields) -> ClientResult<Record> {
        self.within(self.inner.create(kind, fields)).await
    }

    pub async fn update(
        &self,
        kind: ResourceKind,
        id: i64,
        fields: &Fields,
    ) -> ClientResult<Record> {
        self.within(self.inner.update(kind, id, fields)).await
    }

    pub async fn choices(
        &self,
        kind: ResourceKind,
        field: &str,
    ) -> ClientResult<BTreeSet<String>> {
        self.within(self.inner.choices(kind, field)).await
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }
}
