// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity resolution
//!
//! Maps a [`NaturalKey`] to an existing record. The run's synced index is
//! consulted first; otherwise the inventory is listed with an exact filter
//! and the results are re-checked client side, since server-side filters may
//! be looser than the key.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::key::{KeyPart, NaturalKey};
use crate::client::{Filter, Record, TimedClient};
use crate::errors::{EntryError, Phase};

/// Records created, updated or found during this run
#[derive(Debug, Default)]
pub struct SyncedIndex {
    records: HashMap<NaturalKey, Record>,
}

impl SyncedIndex {
    pub fn get(&self, key: &NaturalKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn insert(&mut self, key: NaturalKey, record: Record) {
        self.records.insert(key, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Resolves natural keys against the synced index and the inventory
pub struct IdentityResolver<'a> {
    client: TimedClient<'a>,
    index: SyncedIndex,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(client: TimedClient<'a>) -> Self {
        Self {
            client,
            index: SyncedIndex::default(),
        }
    }

    pub fn index(&self) -> &SyncedIndex {
        &self.index
    }

    /// Remember a record written or confirmed during this run
    pub fn remember(&mut self, key: NaturalKey, record: Record) {
        self.index.insert(key, record);
    }

    /// Existing record for `key`, if any
    ///
    /// Reference components are resolved first; if one of them does not
    /// exist, neither can a record keyed on it.
    pub fn resolve<'s>(
        &'s mut self,
        key: &'s NaturalKey,
    ) -> BoxFuture<'s, Result<Option<Record>, EntryError>> {
        async move {
            if let Some(record) = self.index.get(key) {
                return Ok(Some(record.clone()));
            }

            let mut filter = Filter::new();
            for (field, part) in key.parts() {
                filter = match part {
                    KeyPart::Text(s) => filter.text(*field, s.clone()),
                    KeyPart::Int(n) => filter.int(*field, *n),
                    KeyPart::Host(address) => filter.host(*field, *address),
                    KeyPart::Absent => filter.unset(*field),
                    KeyPart::Ref(target) => match self.resolve(target).await? {
                        Some(record) => filter.reference(*field, record.id),
                        None => {
                            debug!("{} {} not found: {} {} does not exist", key.kind(), key, target.kind(), target);
                            return Ok(None);
                        }
                    },
                };
            }

            let mut matches: Vec<Record> = self
                .client
                .list(key.kind(), &filter)
                .await
                .map_err(|e| EntryError::client(Phase::Lookup, e))?
                .into_iter()
                .filter(|r| filter.matches(r))
                .collect();
            matches.sort_by_key(|r| r.id);

            if matches.len() > 1 {
                warn!(
                    "{} matches for {} {}; using lowest id {}",
                    matches.len(),
                    key.kind(),
                    key,
                    matches[0].id
                );
            }

            match matches.into_iter().next() {
                Some(record) => {
                    debug!("Resolved {} {} to id {}", key.kind(), key, record.id);
                    self.index.insert(key.clone(), record.clone());
                    Ok(Some(record))
                }
                None => Ok(None),
            }
        }
        .boxed()
    }

    /// Like [`Self::resolve`], but a missing record is an unresolved reference
    pub async fn require(&mut self, key: &NaturalKey) -> Result<Record, EntryError> {
        self.resolve(key)
            .await?
            .ok_or_else(|| EntryError::Reference(format!("{} {}", key.kind(), key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, Fields, MemoryInventory, Operation};
    use crate::schema::ResourceKind;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn timed(inventory: &MemoryInventory) -> TimedClient<'_> {
        TimedClient::new(inventory, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_resolves_exact_match_only() {
        let inventory = MemoryInventory::new();
        inventory.seed(ResourceKind::Site, fields(json!({"name": "NYC10"})));
        let nyc1 = inventory.seed(ResourceKind::Site, fields(json!({"name": "NYC1"})));

        let mut resolver = IdentityResolver::new(timed(&inventory));
        let key = NaturalKey::build(ResourceKind::Site, &fields(json!({"name": "nyc1"}))).unwrap();

        let found = resolver.resolve(&key).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(nyc1.id));
        assert_eq!(resolver.index().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_matches_pick_lowest_id() {
        let inventory = MemoryInventory::new();
        let first = inventory.seed(ResourceKind::Manufacturer, fields(json!({"name": "MIKROTIK"})));
        inventory.seed(ResourceKind::Manufacturer, fields(json!({"name": "MIKROTIK"})));

        let mut resolver = IdentityResolver::new(timed(&inventory));
        let key = NaturalKey::build(ResourceKind::Manufacturer, &fields(json!({"name": "MikroTik"}))).unwrap();

        assert_eq!(resolver.require(&key).await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_composite_key_resolves_through_reference() {
        let inventory = MemoryInventory::new();
        let nyc1 = inventory.seed(ResourceKind::Site, fields(json!({"name": "NYC1"})));
        let lax1 = inventory.seed(ResourceKind::Site, fields(json!({"name": "LAX1"})));
        inventory.seed(ResourceKind::Vlan, fields(json!({"site": lax1.id, "vid": 100, "name": "MGMT"})));
        let vlan = inventory.seed(ResourceKind::Vlan, fields(json!({"site": nyc1.id, "vid": 100, "name": "MGMT"})));

        let mut resolver = IdentityResolver::new(timed(&inventory));
        let key = NaturalKey::build(
            ResourceKind::Vlan,
            &fields(json!({"site": "NYC1", "vid": 100, "name": "mgmt"})),
        )
        .unwrap();

        assert_eq!(resolver.require(&key).await.unwrap().id, vlan.id);
    }

    #[tokio::test]
    async fn test_missing_reference_short_circuits() {
        let inventory = MemoryInventory::new();
        let mut resolver = IdentityResolver::new(timed(&inventory));
        let key = NaturalKey::build(
            ResourceKind::Interface,
            &fields(json!({"device": "GHOST", "name": "ether1"})),
        )
        .unwrap();

        assert_eq!(resolver.resolve(&key).await.unwrap(), None);
        assert!(matches!(resolver.require(&key).await, Err(EntryError::Reference(_))));
    }

    #[tokio::test]
    async fn test_index_is_consulted_before_inventory() {
        let inventory = MemoryInventory::new();
        let mut resolver = IdentityResolver::new(timed(&inventory));
        let key = NaturalKey::build(ResourceKind::Site, &fields(json!({"name": "NYC1"}))).unwrap();
        resolver.remember(key.clone(), Record::new(42, fields(json!({"name": "NYC1"}))));

        inventory.fail(
            ResourceKind::Site,
            Operation::List,
            ClientError::Transport("down".to_string()),
        );
        assert_eq!(resolver.require(&key).await.unwrap().id, 42);
    }

    #[tokio::test]
    async fn test_lookup_error_is_reported() {
        let inventory = MemoryInventory::new();
        inventory.fail(
            ResourceKind::Site,
            Operation::List,
            ClientError::Api {
                status: 500,
                body: "boom".to_string(),
            },
        );

        let mut resolver = IdentityResolver::new(timed(&inventory));
        let key = NaturalKey::build(ResourceKind::Site, &fields(json!({"name": "NYC1"}))).unwrap();
        assert!(matches!(
            resolver.resolve(&key).await,
            Err(EntryError::Client { phase: Phase::Lookup, .. })
        ));
    }
}
