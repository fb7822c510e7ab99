// Copyright (c) 2025 - Cowboy AI, Inc.
//! Drift detection

use serde_json::Value;

use crate::client::{Fields, Record};
use crate::schema::ResourceSchema;

/// Drift fields whose desired value differs from the record
///
/// Only fields present in `desired` are compared; anything the entry leaves
/// out is owned by whoever last set it.
pub fn drift(schema: &ResourceSchema, desired: &Fields, record: &Record) -> Fields {
    let mut changes = Fields::new();

    for field in schema.drift {
        let Some(wanted) = desired.get(*field) else {
            continue;
        };
        if wanted.is_null() {
            continue;
        }
        if !same_value(wanted, &record.value(field)) {
            changes.insert(field.to_string(), wanted.clone());
        }
    }

    changes
}

/// Equality after the loosening YAML and JSON need: numbers compare by
/// value, and a number equals its own decimal text
fn same_value(wanted: &Value, actual: &Value) -> bool {
    match (wanted, actual) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim() == n.to_string()
        }
        (Value::String(s), Value::Null) => s.is_empty(),
        (a, b) => a == b,
    }
}
