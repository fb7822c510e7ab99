// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory inventory
//!
//! A [`InventoryClient`] backed by plain vectors. Every create and update is
//! appended to a write log so callers can assert on exactly which writes a
//! run issued. Latency and faults can be injected per kind and operation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{ClientError, ClientResult, Fields, Filter, InventoryClient, Record};
use crate::schema::ResourceKind;

/// Operation selector for injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Create,
    Update,
    Choices,
}

/// A write issued against the inventory
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCall {
    Create { kind: ResourceKind, fields: Fields },
    Update { kind: ResourceKind, id: i64, fields: Fields },
}

impl WriteCall {
    pub fn kind(&self) -> ResourceKind {
        match self {
            WriteCall::Create { kind, .. } | WriteCall::Update { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    kind: ResourceKind,
    operation: Operation,
    /// Only fire when the written fields carry this value
    when: Option<(String, Value)>,
    error: ClientError,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<ResourceKind, Vec<Record>>,
    choices: HashMap<(ResourceKind, String), BTreeSet<String>>,
    next_id: i64,
    writes: Vec<WriteCall>,
    choice_fetches: usize,
    faults: Vec<Fault>,
    latency: Duration,
}

/// In-process inventory store
#[derive(Debug)]
pub struct MemoryInventory {
    state: Mutex<State>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInventory {
    /// Empty store advertising NetBox's stock choice sets
    pub fn new() -> Self {
        let inventory = Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
        };

        inventory.set_choices(
            ResourceKind::Site,
            "status",
            ["planned", "staging", "active", "decommissioning", "retired"],
        );
        inventory.set_choices(
            ResourceKind::Device,
            "status",
            [
                "offline",
                "active",
                "planned",
                "staged",
                "failed",
                "inventory",
                "decommissioning",
            ],
        );
        inventory.set_choices(
            ResourceKind::Interface,
            "type",
            ["virtual", "bridge", "lag", "1000base-t", "10gbase-x-sfpp", "other"],
        );
        inventory.set_choices(
            ResourceKind::IpAddress,
            "status",
            ["active", "reserved", "deprecated", "dhcp", "slaac"],
        );
        inventory.set_choices(
            ResourceKind::Vlan,
            "status",
            ["active", "reserved", "deprecated"],
        );
        inventory.set_choices(
            ResourceKind::Prefix,
            "status",
            ["container", "active", "reserved", "deprecated"],
        );
        inventory
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panic while holding the lock leaves plain data behind, still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the advertised choices for `kind.field`
    pub fn set_choices<I, S>(&self, kind: ResourceKind, field: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.lock().choices.insert((kind, field.to_string()), values);
    }

    /// Insert a pre-existing record without logging a write
    pub fn seed(&self, kind: ResourceKind, fields: Fields) -> Record {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let record = Record::new(id, fields);
        state.records.entry(kind).or_default().push(record.clone());
        record
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Fail every `operation` on `kind` with `error`
    pub fn fail(&self, kind: ResourceKind, operation: Operation, error: ClientError) {
        self.lock().faults.push(Fault {
            kind,
            operation,
            when: None,
            error,
        });
    }

    /// Fail writes on `kind` whose fields carry `field == value`
    pub fn fail_when(
        &self,
        kind: ResourceKind,
        operation: Operation,
        field: &str,
        value: Value,
        error: ClientError,
    ) {
        self.lock().faults.push(Fault {
            kind,
            operation,
            when: Some((field.to_string(), value)),
            error,
        });
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn records(&self, kind: ResourceKind) -> Vec<Record> {
        self.lock().records.get(&kind).cloned().unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Number of `choices` calls served
    pub fn choice_fetches(&self) -> usize {
        self.lock().choice_fetches
    }

    async fn simulate(
        &self,
        kind: ResourceKind,
        operation: Operation,
        fields: Option<&Fields>,
    ) -> ClientResult<()> {
        let (latency, fault) = {
            let state = self.lock();
            let fault = state
                .faults
                .iter()
                .find(|f| {
                    f.kind == kind
                        && f.operation == operation
                        && match (&f.when, fields) {
                            (None, _) => true,
                            (Some((field, value)), Some(fields)) => fields.get(field) == Some(value),
                            (Some(_), None) => false,
                        }
                })
                .map(|f| f.error.clone());
            (state.latency, fault)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match fault {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InventoryClient for MemoryInventory {
    async fn list(&self, kind: ResourceKind, filter: &Filter) -> ClientResult<Vec<Record>> {
        self.simulate(kind, Operation::List, None).await?;

        Ok(self
            .lock()
            .records
            .get(&kind)
            .map(|records| records.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, kind: ResourceKind, fields: &Fields) -> ClientResult<Record> {
        self.simulate(kind, Operation::Create, Some(fields)).await?;

        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let record = Record::new(id, fields.clone());
        state.records.entry(kind).or_default().push(record.clone());
        state.writes.push(WriteCall::Create {
            kind,
            fields: fields.clone(),
        });
        Ok(record)
    }

    async fn update(&self, kind: ResourceKind, id: i64, fields: &Fields) -> ClientResult<Record> {
        self.simulate(kind, Operation::Update, Some(fields)).await?;

        let mut state = self.lock();
        let record = state
            .records
            .get_mut(&kind)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| ClientError::Api {
                status: 404,
                body: format!("{} {} not found", kind, id),
            })?;

        for (field, value) in fields {
            record.fields.insert(field.clone(), value.clone());
        }
        let updated = record.clone();

        state.writes.push(WriteCall::Update {
            kind,
            id,
            fields: fields.clone(),
        });
        Ok(updated)
    }

    async fn choices(&self, kind: ResourceKind, field: &str) -> ClientResult<BTreeSet<String>> {
        self.simulate(kind, Operation::Choices, None).await?;

        let mut state = self.lock();
        state.choice_fetches += 1;
        state
            .choices
            .get(&(kind, field.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::Api {
                status: 400,
                body: format!("{}.{} is not a choice field", kind, field),
            })
    }

    async fn health_check(&self) -> ClientResult<Option<String>> {
        Ok(Some("memory".to_string()))
    }

    fn name(&self) -> &str {
        "memory-inventory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let inventory = MemoryInventory::new();
        let created = inventory
            .create(ResourceKind::Site, &fields(json!({"name": "NYC1", "slug": "nyc1"})))
            .await
            .unwrap();

        let found = inventory
            .get(ResourceKind::Site, &Filter::new().text("name", "NYC1"))
            .await
            .unwrap();
        assert_eq!(found, Some(created));
        assert_eq!(inventory.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_is_not_a_write() {
        let inventory = MemoryInventory::new();
        inventory.seed(ResourceKind::Site, fields(json!({"name": "NYC1"})));

        assert_eq!(inventory.records(ResourceKind::Site).len(), 1);
        assert!(inventory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let inventory = MemoryInventory::new();
        let seeded = inventory.seed(
            ResourceKind::Site,
            fields(json!({"name": "NYC1", "physical_address": "1 Main St"})),
        );

        let updated = inventory
            .update(
                ResourceKind::Site,
                seeded.id,
                &fields(json!({"physical_address": "2 Main St"})),
            )
            .await
            .unwrap();

        assert_eq!(updated.value("name"), json!("NYC1"));
        assert_eq!(updated.value("physical_address"), json!("2 Main St"));
    }

    #[tokio::test]
    async fn test_fault_injection_matches_fields() {
        let inventory = MemoryInventory::new();
        inventory.fail_when(
            ResourceKind::Site,
            Operation::Create,
            "name",
            json!("BAD"),
            ClientError::Api {
                status: 400,
                body: "rejected".to_string(),
            },
        );

        assert!(inventory
            .create(ResourceKind::Site, &fields(json!({"name": "BAD"})))
            .await
            .is_err());
        assert!(inventory
            .create(ResourceKind::Site, &fields(json!({"name": "GOOD"})))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_choices_count_fetches() {
        let inventory = MemoryInventory::new();
        let statuses = inventory.choices(ResourceKind::Device, "status").await.unwrap();
        assert!(statuses.contains("active"));
        assert_eq!(inventory.choice_fetches(), 1);

        assert!(inventory.choices(ResourceKind::Manufacturer, "status").await.is_err());
    }
}
