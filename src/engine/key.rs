// Copyright (c) 2025 - Cowboy AI, Inc.
//! Natural keys
//!
//! A natural key is built from the desired entry only, with the kind's
//! normalization applied, so the same value is written on create and
//! searched for on lookup.

use serde_json::Value;
use std::fmt;
use std::net::IpAddr;

use crate::client::Fields;
use crate::domain::{IpAddressWithCidr, VlanId};
use crate::errors::EntryError;
use crate::schema::{ForeignKey, Normalization, ResourceKind};

/// One normalized component of a natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Text(String),
    Int(i64),
    /// Bare address; matches a record of any prefix length
    Host(IpAddr),
    /// Key of the referenced record, resolved to an id at lookup time
    Ref(NaturalKey),
    /// Optional component left out by the entry
    Absent,
}

/// Normalized identity of a desired entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    kind: ResourceKind,
    parts: Vec<(&'static str, KeyPart)>,
}

impl NaturalKey {
    /// Build the key of `kind` from a desired entry
    pub fn build(kind: ResourceKind, entry: &Fields) -> Result<Self, EntryError> {
        let schema = kind.schema();
        let mut parts = Vec::with_capacity(schema.key.len());

        for key_field in schema.key {
            let value = entry.get(key_field.field).filter(|v| !is_blank(v));
            let part = match (value, key_field.normalization) {
                (None, _) if key_field.optional => KeyPart::Absent,
                (None, _) => {
                    return Err(EntryError::Validation(format!(
                        "{} is missing key field {}",
                        kind, key_field.field
                    )))
                }
                (Some(value), Normalization::Reference(_)) => {
                    let fk = schema.reference(key_field.field).ok_or_else(|| {
                        EntryError::Validation(format!(
                            "{}.{} has no foreign key",
                            kind, key_field.field
                        ))
                    })?;
                    KeyPart::Ref(Self::reference(fk, value, entry)?)
                }
                (Some(value), normalization) => normalize(key_field.field, normalization, value)?,
            };
            parts.push((key_field.field, part));
        }

        Ok(Self { kind, parts })
    }

    /// Build the key a foreign-key value points at
    ///
    /// A scalar names the target by its single key field. A mapping gives
    /// the target's key fields; those listed in `fk.inherit` fall back to the
    /// referring entry.
    pub fn reference(fk: &ForeignKey, value: &Value, referrer: &Fields) -> Result<Self, EntryError> {
        let target = fk.target.schema();
        let mut fields = match value {
            Value::Object(map) => map.clone(),
            Value::String(_) | Value::Number(_) => {
                let required: Vec<_> = target.key.iter().filter(|k| !k.optional).collect();
                match required.as_slice() {
                    [only] => {
                        let mut fields = Fields::new();
                        fields.insert(only.field.to_string(), value.clone());
                        fields
                    }
                    _ => {
                        return Err(EntryError::Validation(format!(
                            "{} must name {} by {}",
                            fk.field,
                            fk.target,
                            required.iter().map(|k| k.field).collect::<Vec<_>>().join(" and ")
                        )))
                    }
                }
            }
            other => {
                return Err(EntryError::Validation(format!(
                    "{} has unsupported value {}",
                    fk.field, other
                )))
            }
        };

        for inherited in fk.inherit {
            if fields.get(*inherited).map_or(true, is_blank) {
                if let Some(v) = referrer.get(*inherited) {
                    fields.insert(inherited.to_string(), v.clone());
                }
            }
        }

        Self::build(fk.target, &fields)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn parts(&self) -> &[(&'static str, KeyPart)] {
        &self.parts
    }

    /// Normalized scalar value for `field`, if the key holds one
    pub fn scalar(&self, field: &str) -> Option<Value> {
        self.parts.iter().find(|(f, _)| *f == field).and_then(|(_, part)| match part {
            KeyPart::Text(s) => Some(Value::String(s.clone())),
            KeyPart::Int(n) => Some(Value::from(*n)),
            // written as the host route the inventory stores
            KeyPart::Host(address) => {
                let host_len = if address.is_ipv4() { 32 } else { 128 };
                Some(Value::String(format!("{}/{}", address, host_len)))
            }
            KeyPart::Ref(_) | KeyPart::Absent => None,
        })
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (_, part) in &self.parts {
            if matches!(part, KeyPart::Absent) {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match part {
                KeyPart::Text(s) => f.write_str(s)?,
                KeyPart::Int(n) => write!(f, "{}", n)?,
                KeyPart::Host(address) => write!(f, "{}", address)?,
                KeyPart::Ref(key) => write!(f, "{}", key)?,
                KeyPart::Absent => {}
            }
        }
        Ok(())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_text(field: &str, value: &Value) -> Result<String, EntryError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(EntryError::Validation(format!(
            "{} must be text, got {}",
            field, other
        ))),
    }
}

/// Apply `normalization` to a scalar key value
pub fn normalize(
    field: &str,
    normalization: Normalization,
    value: &Value,
) -> Result<KeyPart, EntryError> {
    let invalid = |e: crate::domain::NetworkError| EntryError::Validation(format!("{}: {}", field, e));

    match normalization {
        Normalization::Upper => Ok(KeyPart::Text(as_text(field, value)?.to_uppercase())),
        Normalization::Lower => Ok(KeyPart::Text(as_text(field, value)?.to_lowercase())),
        Normalization::Exact => Ok(KeyPart::Text(as_text(field, value)?)),
        Normalization::Address => {
            let address = IpAddressWithCidr::new(as_text(field, value)?).map_err(invalid)?;
            match address.prefix_length() {
                Some(_) => Ok(KeyPart::Text(address.as_cidr())),
                None => Ok(KeyPart::Host(address.address())),
            }
        }
        Normalization::Network => {
            let network = IpAddressWithCidr::network(as_text(field, value)?).map_err(invalid)?;
            Ok(KeyPart::Text(network.as_cidr()))
        }
        Normalization::Vid => {
            let vid = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| EntryError::Validation(format!("{} must be an integer", field)))?;
            let vid = VlanId::new(vid).map_err(invalid)?;
            Ok(KeyPart::Int(i64::from(vid.value())))
        }
        Normalization::Reference(target) => Err(EntryError::Validation(format!(
            "{} refers to {} and cannot be normalized as a scalar",
            field, target
        ))),
    }
}

/// Lower-case slug: runs of characters outside `[a-z0-9_]` become one `-`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    fn entry(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test_case("NYC1", "nyc1" ; "plain")]
    #[test_case("New York 1", "new-york-1" ; "spaces")]
    #[test_case("  RB4011iGS+RM ", "rb4011igs-rm" ; "symbols")]
    #[test_case("core__sw", "core__sw" ; "underscores kept")]
    fn test_slugify(name: &str, expected: &str) {
        assert_eq!(slugify(name), expected);
    }

    #[test]
    fn test_site_key_is_upper_cased() {
        let key = NaturalKey::build(ResourceKind::Site, &entry(json!({"name": " nyc1 "}))).unwrap();
        assert_eq!(key.scalar("name"), Some(json!("NYC1")));
        assert_eq!(key.to_string(), "NYC1");
    }

    #[test]
    fn test_interface_key_nests_device() {
        let key = NaturalKey::build(
            ResourceKind::Interface,
            &entry(json!({"device": "nyc1-rtr1", "name": "ether1"})),
        )
        .unwrap();

        let device = NaturalKey::build(ResourceKind::Device, &entry(json!({"name": "NYC1-RTR1"}))).unwrap();
        assert_eq!(key.parts()[0], ("device", KeyPart::Ref(device)));
        assert_eq!(key.to_string(), "NYC1-RTR1 ether1");
    }

    #[test]
    fn test_prefix_vlan_inherits_site() {
        let key = NaturalKey::build(
            ResourceKind::Prefix,
            &entry(json!({
                "prefix": "10.1.100.0/24",
                "site": "nyc1",
                "vlan": {"vid": 100, "name": "mgmt"}
            })),
        )
        .unwrap();

        let vlan = NaturalKey::build(
            ResourceKind::Vlan,
            &entry(json!({"site": "NYC1", "vid": "100", "name": "MGMT"})),
        )
        .unwrap();
        assert_eq!(key.parts()[2], ("vlan", KeyPart::Ref(vlan)));
    }

    #[test]
    fn test_global_prefix_has_absent_parts() {
        let key = NaturalKey::build(ResourceKind::Prefix, &entry(json!({"prefix": "10.0.0.0/8"}))).unwrap();
        assert_eq!(key.parts()[1], ("site", KeyPart::Absent));
        assert_eq!(key.parts()[2], ("vlan", KeyPart::Absent));
        assert_eq!(key.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn test_bare_address_matches_by_host() {
        let key = NaturalKey::build(ResourceKind::IpAddress, &entry(json!({"address": "10.1.1.5"}))).unwrap();
        assert_eq!(key.parts()[0], ("address", KeyPart::Host("10.1.1.5".parse().unwrap())));
        assert_eq!(key.scalar("address"), Some(json!("10.1.1.5/32")));
        assert_eq!(key.to_string(), "10.1.1.5");

        let v6 = NaturalKey::build(ResourceKind::IpAddress, &entry(json!({"address": "2001:db8::5"}))).unwrap();
        assert_eq!(v6.scalar("address"), Some(json!("2001:db8::5/128")));
    }

    #[test]
    fn test_prefix_key_drops_host_bits() {
        let key = NaturalKey::build(ResourceKind::Prefix, &entry(json!({"prefix": "10.1.10.5/24"}))).unwrap();
        assert_eq!(key.scalar("prefix"), Some(json!("10.1.10.0/24")));
    }

    #[test]
    fn test_scalar_reference_needs_single_key_field() {
        let err = NaturalKey::build(
            ResourceKind::Prefix,
            &entry(json!({"prefix": "10.0.0.0/24", "vlan": "MGMT"})),
        )
        .unwrap_err();
        assert!(matches!(err, EntryError::Validation(_)));
    }

    #[test_case(json!({"site": "NYC1", "vid": 0, "name": "X"}) ; "vid zero")]
    #[test_case(json!({"site": "NYC1", "vid": 4095, "name": "X"}) ; "vid too large")]
    #[test_case(json!({"site": "NYC1", "vid": "ten", "name": "X"}) ; "vid not a number")]
    #[test_case(json!({"site": "", "vid": 10, "name": "X"}) ; "blank site")]
    fn test_invalid_vlan_keys(value: Value) {
        assert!(matches!(
            NaturalKey::build(ResourceKind::Vlan, &entry(value)),
            Err(EntryError::Validation(_))
        ));
    }

    #[test]
    fn test_prefix_requires_mask() {
        assert!(NaturalKey::build(ResourceKind::Prefix, &entry(json!({"prefix": "10.0.0.0"}))).is_err());
    }

    proptest! {
        #[test]
        fn prop_upper_normalization_ignores_case_and_padding(name in "[a-zA-Z0-9-]{1,16}", pad in " {0,3}") {
            let lower = entry(json!({"name": format!("{}{}", pad, name.to_lowercase())}));
            let upper = entry(json!({"name": format!("{}{}", name.to_uppercase(), pad)}));
            prop_assert_eq!(
                NaturalKey::build(ResourceKind::Site, &lower).unwrap(),
                NaturalKey::build(ResourceKind::Site, &upper).unwrap()
            );
        }

        #[test]
        fn prop_slug_is_url_safe(name in "\\PC{0,24}") {
            let slug = slugify(&name);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'));
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
        }
    }
}
