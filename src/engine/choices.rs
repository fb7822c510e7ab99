// Copyright (c) 2025 - Cowboy AI, Inc.
//! Enumerated field validation
//!
//! Choice sets are fetched from the inventory the first time a (kind, field)
//! pair is needed and reused for the rest of the run. A failed fetch caches
//! nothing, so the next entry tries again.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::client::TimedClient;
use crate::errors::{EntryError, Phase};
use crate::schema::ResourceKind;

/// Run-scoped cache of advertised choice sets
#[derive(Debug, Default)]
pub struct StatusValidator {
    cache: HashMap<(ResourceKind, String), BTreeSet<String>>,
}

impl StatusValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the choices for `kind.field` are already cached
    pub fn is_cached(&self, kind: ResourceKind, field: &str) -> bool {
        self.cache.contains_key(&(kind, field.to_string()))
    }

    /// Check `value` against the advertised choices for `kind.field`
    pub async fn check(
        &mut self,
        client: &TimedClient<'_>,
        kind: ResourceKind,
        field: &str,
        value: &Value,
    ) -> Result<(), EntryError> {
        let cache_key = (kind, field.to_string());
        if !self.cache.contains_key(&cache_key) {
            let choices = client
                .choices(kind, field)
                .await
                .map_err(|e| EntryError::client(Phase::Choices, e))?;
            debug!("Cached {} choices for {}.{}", choices.len(), kind, field);
            self.cache.insert(cache_key.clone(), choices);
        }

        let valid = self.cache.get(&cache_key).cloned().unwrap_or_default();
        match value.as_str() {
            Some(s) if valid.contains(s) => Ok(()),
            _ => Err(EntryError::Enumeration(format!(
                "{}.{} = {} (expected one of: {})",
                kind,
                field,
                value,
                valid.into_iter().collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}
