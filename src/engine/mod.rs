// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reconciliation engine
//!
//! Drives every desired entry through one generic procedure, kind by kind
//! in [`ResourceKind::SYNC_ORDER`]:
//!
//! ```text
//! entry ──> required fields ──> natural key ──> references ──> choices
//!                                                                 │
//!        Created <── create <── NotFound ◄── identity lookup ◄────┘
//!                                 Found ──> diff ──> Updated | Resolved
//! ```
//!
//! Calls are awaited one at a time. An unreachable inventory ends the
//! current stage; later stages still run.

pub mod choices;
pub mod diff;
pub mod identity;
pub mod key;

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::client::{Fields, InventoryClient, TimedClient};
use crate::desired::{DesiredState, RejectedEntry};
use crate::errors::{EntryError, Phase};
use crate::report::{EntryReport, Reporter, RunReport};
use crate::schema::ResourceKind;
use crate::state_machine::{EntryEvent, EntryState, ResolvedReason, StateMachine};

pub use choices::StatusValidator;
pub use identity::{IdentityResolver, SyncedIndex};
pub use key::{slugify, KeyPart, NaturalKey};

/// Global switches for a run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Never update existing records
    pub create_only: bool,
    /// Deadline for each inventory call
    pub call_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            create_only: false,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// What happened to an entry that reached the inventory
struct Applied {
    event: EntryEvent,
    id: i64,
    detail: Option<String>,
}

/// One reconciliation pass over a desired state
pub struct Reconciler<'a> {
    client: TimedClient<'a>,
    options: SyncOptions,
    identity: IdentityResolver<'a>,
    statuses: StatusValidator,
    reporter: Reporter,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a dyn InventoryClient, options: SyncOptions, reporter: Reporter) -> Self {
        let client = TimedClient::new(client, options.call_timeout);
        Self {
            client,
            options,
            identity: IdentityResolver::new(client),
            statuses: StatusValidator::new(),
            reporter,
        }
    }

    /// Reconcile every kind in order and return the run's report
    pub async fn run(mut self, desired: &DesiredState) -> RunReport {
        info!(
            "🚀 Reconciliation {} against {} (create_only: {})",
            self.reporter.run_id(),
            self.client.name(),
            self.options.create_only
        );

        for kind in ResourceKind::SYNC_ORDER {
            let entries = desired.entries(kind);
            let rejected = desired.rejected(kind);
            if entries.is_empty() && rejected.is_empty() {
                debug!("No {} in desired state", kind.label());
                continue;
            }
            self.sync_stage(kind, &rejected, &entries).await;
        }

        debug!("Synced index holds {} records", self.identity.index().len());
        self.reporter.finish().await
    }

    async fn sync_stage(
        &mut self,
        kind: ResourceKind,
        rejected: &[&RejectedEntry],
        entries: &[Fields],
    ) {
        self.reporter.begin_stage(kind);

        for (position, entry) in rejected.iter().enumerate() {
            let label = fallback_label(&entry.fields, position);
            let error = EntryError::Validation(entry.reason.clone());
            self.settle(kind, label, EntryEvent::from_error(&error), None, Some(error.to_string()))
                .await;
        }

        for (position, entry) in entries.iter().enumerate() {
            let mut label = fallback_label(entry, position);
            let outcome = self.ensure(kind, entry, &mut label).await;
            let transport_lost = matches!(&outcome, Err(e) if e.is_transport());

            let (event, id, detail) = match outcome {
                Ok(applied) => (applied.event, Some(applied.id), applied.detail),
                Err(e) => (EntryEvent::from_error(&e), None, Some(e.to_string())),
            };
            self.settle(kind, label, event, id, detail).await;

            if transport_lost {
                self.reporter.abort_stage(entries.len() - position - 1);
                break;
            }
        }
    }

    /// Move an entry out of `Pending` and report where it landed
    async fn settle(
        &mut self,
        kind: ResourceKind,
        label: String,
        event: EntryEvent,
        id: Option<i64>,
        detail: Option<String>,
    ) {
        match EntryState::Pending.transition(&event) {
            Ok((state, level)) => {
                let report = EntryReport {
                    kind,
                    key: label,
                    state,
                    detail,
                    id,
                };
                self.reporter.record(report, level).await;
            }
            Err(e) => error!("{} {}: {}", kind, label, e),
        }
    }

    /// Bring one entry in line with the inventory
    async fn ensure(
        &mut self,
        kind: ResourceKind,
        entry: &Fields,
        label: &mut String,
    ) -> Result<Applied, EntryError> {
        let schema = kind.schema();

        let missing: Vec<&str> = schema
            .required
            .iter()
            .copied()
            .filter(|field| entry.get(*field).map_or(true, is_blank))
            .collect();
        if !missing.is_empty() {
            return Err(EntryError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let key = NaturalKey::build(kind, entry)?;
        *label = key.to_string();

        let mut payload = entry.clone();
        for fk in schema.references {
            payload.remove(fk.field);
        }
        for key_field in schema.key {
            if let Some(value) = key.scalar(key_field.field) {
                payload.insert(key_field.field.to_string(), value);
            }
        }
        if let Some(source) = schema.slug_from {
            if !payload.contains_key("slug") {
                if let Some(Value::String(name)) = payload.get(source) {
                    let slug = slugify(name);
                    payload.insert("slug".to_string(), Value::from(slug));
                }
            }
        }

        for fk in schema.references {
            let Some(value) = entry.get(fk.field).filter(|v| !is_blank(v)) else {
                continue;
            };
            let target = NaturalKey::reference(fk, value, entry)?;
            let record = self.identity.require(&target).await?;
            payload.insert(fk.write_as.to_string(), Value::from(record.id));
            if let Some((tag_field, tag_value)) = fk.tag {
                payload.insert(tag_field.to_string(), Value::from(tag_value));
            }
        }

        for field in schema.enumerated {
            if let Some(value) = payload.get(*field) {
                self.statuses.check(&self.client, kind, field, value).await?;
            }
        }

        match self.identity.resolve(&key).await? {
            Some(record) if schema.is_create_only() || self.options.create_only => Ok(Applied {
                event: EntryEvent::Resolve(ResolvedReason::Existing),
                id: record.id,
                detail: None,
            }),
            Some(record) => {
                let mut changes = diff::drift(schema, &payload, &record);
                if changes.is_empty() {
                    return Ok(Applied {
                        event: EntryEvent::Resolve(ResolvedReason::NoDrift),
                        id: record.id,
                        detail: None,
                    });
                }

                for fk in schema.references {
                    if let Some((tag_field, tag_value)) = fk.tag {
                        if changes.contains_key(fk.write_as) {
                            changes.insert(tag_field.to_string(), Value::from(tag_value));
                        }
                    }
                }

                let changed: Vec<String> = changes.keys().cloned().collect();
                let updated = self
                    .client
                    .update(kind, record.id, &changes)
                    .await
                    .map_err(|e| EntryError::client(Phase::Update, e))?;
                let id = updated.id;
                self.identity.remember(key, updated);

                Ok(Applied {
                    event: EntryEvent::Update,
                    id,
                    detail: Some(format!("changed {}", changed.join(", "))),
                })
            }
            None => {
                // defaults apply to new records only
                for (field, default) in schema.defaults {
                    if payload.get(*field).map_or(true, Value::is_null) {
                        payload.insert(field.to_string(), Value::from(*default));
                    }
                }
                let created = self
                    .client
                    .create(kind, &payload)
                    .await
                    .map_err(|e| EntryError::client(Phase::Create, e))?;
                let id = created.id;
                self.identity.remember(key, created);

                Ok(Applied {
                    event: EntryEvent::Create,
                    id,
                    detail: None,
                })
            }
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Label for an entry whose natural key could not be built
fn fallback_label(entry: &Fields, position: usize) -> String {
    ["name", "model", "address", "prefix"]
        .iter()
        .find_map(|field| entry.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", position + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, MemoryInventory, Operation, WriteCall};
    use crate::state_machine::{FailureReason, SkipReason};
    use serde_json::json;

    fn desired(yaml: &str) -> DesiredState {
        DesiredState::parse(yaml).unwrap()
    }

    async fn run(inventory: &MemoryInventory, state: &DesiredState) -> RunReport {
        Reconciler::new(inventory, SyncOptions::default(), Reporter::new(None))
            .run(state)
            .await
    }

    #[tokio::test]
    async fn test_create_writes_normalized_payload() {
        let inventory = MemoryInventory::new();
        let state = desired("sites:\n  - name: new york 1\n    status: active\n");

        let report = run(&inventory, &state).await;

        assert_eq!(report.counts().created, 1);
        assert_eq!(
            inventory.writes(),
            vec![WriteCall::Create {
                kind: ResourceKind::Site,
                fields: match json!({"name": "NEW YORK 1", "slug": "new-york-1", "status": "active"}) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_required_field_is_skipped() {
        let inventory = MemoryInventory::new();
        let state = desired("devices:\n  - name: nyc1-rtr1\n    site: nyc1\n");

        let report = run(&inventory, &state).await;
        let entry = report.entry(ResourceKind::Device, "nyc1-rtr1").unwrap();

        assert_eq!(entry.state, EntryState::Skipped(SkipReason::Validation));
        assert!(entry.detail.as_deref().unwrap_or_default().contains("role"));
        assert!(inventory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_defaults_and_tags_are_applied() {
        let inventory = MemoryInventory::new();
        let state = desired(
            r#"
sites: [{name: nyc1}]
device_roles: [{name: router}]
manufacturers: [{name: mikrotik}]
device_types: [{model: rb4011, manufacturer: mikrotik}]
devices: [{name: nyc1-rtr1, site: nyc1, role: router, type: rb4011}]
interfaces: [{device: nyc1-rtr1, name: ether1, address: 10.1.10.1/24}]
"#,
        );

        let report = run(&inventory, &state).await;
        assert_eq!(report.counts().created, 7);

        let interface = &inventory.records(ResourceKind::Interface)[0];
        assert_eq!(interface.value("type"), json!("virtual"));

        let ip = &inventory.records(ResourceKind::IpAddress)[0];
        assert_eq!(ip.value("assigned_object_id"), json!(interface.id));
        assert_eq!(ip.value("assigned_object_type"), json!("dcim.interface"));
        assert_eq!(ip.value("description"), json!("NYC1-RTR1:ether1"));
        assert!(ip.fields.get("interface").is_none());
    }

    #[tokio::test]
    async fn test_create_only_resolves_existing() {
        let inventory = MemoryInventory::new();
        inventory.seed(
            ResourceKind::Site,
            match json!({"name": "NYC1", "description": "old"}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        );
        let state = desired("sites: [{name: nyc1, description: new}]\n");

        let options = SyncOptions {
            create_only: true,
            ..SyncOptions::default()
        };
        let report = Reconciler::new(&inventory, options, Reporter::new(None))
            .run(&state)
            .await;

        assert_eq!(
            report.entry(ResourceKind::Site, "NYC1").map(|e| e.state),
            Some(EntryState::Resolved(ResolvedReason::Existing))
        );
        assert!(inventory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_create_error_is_entry_local() {
        let inventory = MemoryInventory::new();
        inventory.fail_when(
            ResourceKind::Site,
            Operation::Create,
            "name",
            json!("LAX1"),
            ClientError::Api {
                status: 400,
                body: "slug exists".to_string(),
            },
        );
        let state = desired("sites: [{name: lax1}, {name: nyc1}]\n");

        let report = run(&inventory, &state).await;

        assert_eq!(
            report.entry(ResourceKind::Site, "LAX1").map(|e| e.state),
            Some(EntryState::Failed(FailureReason::CreateError))
        );
        assert_eq!(
            report.entry(ResourceKind::Site, "NYC1").map(|e| e.state),
            Some(EntryState::Created)
        );
    }

    #[test]
    fn test_fallback_label() {
        let entry = match json!({"status": "active"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(fallback_label(&entry, 2), "#3");
    }
}
