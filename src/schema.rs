// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Schema Registry
//!
//! One static descriptor per resource kind. The engine is generic over these
//! rows: adding a kind means adding a variant and a [`ResourceSchema`], never
//! touching the driver.
//!
//! # Sync Order
//!
//! ```text
//! Sites ─┬─────────────────────────────┬──> VLANs ──> Prefixes
//!        │                             │
//! DeviceRoles ─┐                       │
//! Manufacturers ──> DeviceTypes ──> Devices ──> Interfaces ──> IPAddresses
//! ```
//!
//! Every foreign key points at a kind earlier in [`ResourceKind::SYNC_ORDER`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The resource kinds the engine reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Site,
    DeviceRole,
    Manufacturer,
    DeviceType,
    Device,
    Interface,
    IpAddress,
    Vlan,
    Prefix,
}

impl ResourceKind {
    /// Fixed topological order; each stage completes before the next starts
    pub const SYNC_ORDER: [ResourceKind; 9] = [
        ResourceKind::Site,
        ResourceKind::DeviceRole,
        ResourceKind::Manufacturer,
        ResourceKind::DeviceType,
        ResourceKind::Device,
        ResourceKind::Interface,
        ResourceKind::IpAddress,
        ResourceKind::Vlan,
        ResourceKind::Prefix,
    ];

    /// Static descriptor for this kind
    pub fn schema(self) -> &'static ResourceSchema {
        match self {
            ResourceKind::Site => &SITE,
            ResourceKind::DeviceRole => &DEVICE_ROLE,
            ResourceKind::Manufacturer => &MANUFACTURER,
            ResourceKind::DeviceType => &DEVICE_TYPE,
            ResourceKind::Device => &DEVICE,
            ResourceKind::Interface => &INTERFACE,
            ResourceKind::IpAddress => &IP_ADDRESS,
            ResourceKind::Vlan => &VLAN,
            ResourceKind::Prefix => &PREFIX,
        }
    }

    /// Human-readable plural used in logs and notifications
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Site => "sites",
            ResourceKind::DeviceRole => "device roles",
            ResourceKind::Manufacturer => "manufacturers",
            ResourceKind::DeviceType => "device types",
            ResourceKind::Device => "devices",
            ResourceKind::Interface => "interfaces",
            ResourceKind::IpAddress => "IP addresses",
            ResourceKind::Vlan => "VLANs",
            ResourceKind::Prefix => "prefixes",
        }
    }

    /// Position in [`Self::SYNC_ORDER`]
    pub fn stage(self) -> usize {
        Self::SYNC_ORDER
            .iter()
            .position(|k| *k == self)
            .unwrap_or(Self::SYNC_ORDER.len())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Site => "site",
            ResourceKind::DeviceRole => "device_role",
            ResourceKind::Manufacturer => "manufacturer",
            ResourceKind::DeviceType => "device_type",
            ResourceKind::Device => "device",
            ResourceKind::Interface => "interface",
            ResourceKind::IpAddress => "ip_address",
            ResourceKind::Vlan => "vlan",
            ResourceKind::Prefix => "prefix",
        };
        f.write_str(s)
    }
}

/// How a natural-key component is canonicalized before write and lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Trimmed and upper-cased (`nyc1` → `NYC1`)
    Upper,
    /// Trimmed and lower-cased
    Lower,
    /// Trimmed, otherwise unchanged
    Exact,
    /// IP address with optional mask, canonical textual form
    Address,
    /// CIDR network with mandatory mask, canonical textual form
    Network,
    /// IEEE 802.1Q VLAN ID
    Vid,
    /// Natural key of another kind
    Reference(ResourceKind),
}

/// One component of a natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyField {
    pub field: &'static str,
    pub normalization: Normalization,
    /// Absent components match records where the field is empty
    pub optional: bool,
}

const fn key(field: &'static str, normalization: Normalization) -> KeyField {
    KeyField {
        field,
        normalization,
        optional: false,
    }
}

const fn optional_key(field: &'static str, normalization: Normalization) -> KeyField {
    KeyField {
        field,
        normalization,
        optional: true,
    }
}

/// A reference from a desired entry to a record of an earlier kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    /// Field in the desired entry holding the reference
    pub field: &'static str,
    /// Kind the reference points at
    pub target: ResourceKind,
    /// Payload field receiving the resolved record id
    pub write_as: &'static str,
    /// Target key components taken from the referring entry when the
    /// reference itself omits them (a prefix's VLAN lives in the prefix's site)
    pub inherit: &'static [&'static str],
    /// Constant payload field set alongside the resolved id
    pub tag: Option<(&'static str, &'static str)>,
}

const fn fk(field: &'static str, target: ResourceKind) -> ForeignKey {
    ForeignKey {
        field,
        target,
        write_as: field,
        inherit: &[],
        tag: None,
    }
}

/// Static descriptor for one resource kind
#[derive(Debug)]
pub struct ResourceSchema {
    pub kind: ResourceKind,
    /// REST collection path below `/api/`
    pub endpoint: &'static str,
    pub key: &'static [KeyField],
    /// Field the lower-case slug is derived from
    pub slug_from: Option<&'static str>,
    pub required: &'static [&'static str],
    pub references: &'static [ForeignKey],
    /// Payload fields compared against an existing record; empty means create-only
    pub drift: &'static [&'static str],
    /// Fields validated against the inventory's advertised choices
    pub enumerated: &'static [&'static str],
    /// Values applied when the entry leaves the field out
    pub defaults: &'static [(&'static str, &'static str)],
}

impl ResourceSchema {
    pub fn is_create_only(&self) -> bool {
        self.drift.is_empty()
    }

    pub fn key_field(&self, field: &str) -> Option<&KeyField> {
        self.key.iter().find(|k| k.field == field)
    }

    pub fn reference(&self, field: &str) -> Option<&ForeignKey> {
        self.references.iter().find(|r| r.field == field)
    }
}

static SITE: ResourceSchema = ResourceSchema {
    kind: ResourceKind::Site,
    endpoint: "dcim/sites",
    key: &[key("name", Normalization::Upper)],
    slug_from: Some("name"),
    required: &["name"],
    references: &[],
    drift: &["status", "description", "physical_address", "time_zone"],
    enumerated: &["status"],
    defaults: &[],
};

static DEVICE_ROLE: ResourceSchema = ResourceSchema {
    kind: ResourceKind::DeviceRole,
    endpoint: "dcim/device-roles",
    key: &[key("name", Normalization::Upper)],
    slug_from: Some("name"),
    required: &["name"],
    references: &[],
    drift: &["description", "color"],
    enumerated: &[],
    defaults: &[],
};

static MANUFACTURER: ResourceSchema = ResourceSchema {
    kind: ResourceKind::Manufacturer,
    endpoint: "dcim/manufacturers",
    key: &[key("name", Normalization::Upper)],
    slug_from: Some("name"),
    required: &["name"],
    references: &[],
    drift: &[],
    enumerated: &[],
    defaults: &[],
};

static DEVICE_TYPE: ResourceSchema = ResourceSchema {
    kind: ResourceKind::DeviceType,
    endpoint: "dcim/device-types",
    key: &[key("model", Normalization::Upper)],
    slug_from: Some("model"),
    required: &["model", "manufacturer"],
    references: &[fk("manufacturer", ResourceKind::Manufacturer)],
    drift: &["manufacturer"],
    enumerated: &[],
    defaults: &[],
};

static DEVICE: ResourceSchema = ResourceSchema {
    kind: ResourceKind::Device,
    endpoint: "dcim/devices",
    key: &[key("name", Normalization::Upper)],
    slug_from: Some("name"),
    required: &["name", "site", "role", "device_type"],
    references: &[
        fk("site", ResourceKind::Site),
        fk("role", ResourceKind::DeviceRole),
        fk("device_type", ResourceKind::DeviceType),
    ],
    drift: &["status", "description", "serial", "site", "role", "device_type"],
    enumerated: &["status"],
    defaults: &[],
};

static INTERFACE: ResourceSchema = ResourceSchema {
    kind: ResourceKind::Interface,
    endpoint: "dcim/interfaces",
    key: &[
        key("device", Normalization::Reference(ResourceKind::Device)),
        key("name", Normalization::Exact),
    ],
    slug_from: None,
    required: &["device", "name"],
    references: &[fk("device", ResourceKind::Device)],
    drift: &["type", "description", "enabled", "mtu"],
    enumerated: &["type"],
    defaults: &[("type", "virtual")],
};

static IP_ADDRESS: ResourceSchema = ResourceSchema {
    kind: ResourceKind::IpAddress,
    endpoint: "ipam/ip-addresses",
    key: &[key("address", Normalization::Address)],
    slug_from: None,
    required: &["address"],
    references: &[ForeignKey {
        field: "interface",
        target: ResourceKind::Interface,
        write_as: "assigned_object_id",
        inherit: &["device"],
        tag: Some(("assigned_object_type", "dcim.interface")),
    }],
    drift: &["status", "description", "assigned_object_id"],
    enumerated: &["status"],
    defaults: &[],
};

static VLAN: ResourceSchema = ResourceSchema {
    kind: ResourceKind::Vlan,
    endpoint: "ipam/vlans",
    key: &[
        key("site", Normalization::Reference(ResourceKind::Site)),
        key("vid", Normalization::Vid),
        key("name", Normalization::Upper),
    ],
    slug_from: None,
    required: &["site", "vid", "name"],
    references: &[fk("site", ResourceKind::Site)],
    drift: &["status", "description"],
    enumerated: &["status"],
    defaults: &[("status", "active")],
};

static PREFIX: ResourceSchema = ResourceSchema {
    kind: ResourceKind::Prefix,
    endpoint: "ipam/prefixes",
    key: &[
        key("prefix", Normalization::Network),
        optional_key("site", Normalization::Reference(ResourceKind::Site)),
        optional_key("vlan", Normalization::Reference(ResourceKind::Vlan)),
    ],
    slug_from: None,
    required: &["prefix"],
    references: &[
        fk("site", ResourceKind::Site),
        ForeignKey {
            field: "vlan",
            target: ResourceKind::Vlan,
            write_as: "vlan",
            inherit: &["site"],
            tag: None,
        },
    ],
    drift: &["status", "description"],
    enumerated: &["status"],
    defaults: &[("status", "active")],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_point_backwards() {
        for kind in ResourceKind::SYNC_ORDER {
            for reference in kind.schema().references {
                assert!(
                    reference.target.stage() < kind.stage(),
                    "{} references {} which is synced later",
                    kind,
                    reference.target
                );
            }
        }
    }

    #[test]
    fn test_schema_kind_matches_variant() {
        for kind in ResourceKind::SYNC_ORDER {
            assert_eq!(kind.schema().kind, kind);
        }
    }

    #[test]
    fn test_reference_key_fields_have_foreign_keys() {
        for kind in ResourceKind::SYNC_ORDER {
            let schema = kind.schema();
            for part in schema.key {
                if let Normalization::Reference(target) = part.normalization {
                    let fk = schema
                        .reference(part.field)
                        .expect("reference key component without foreign key");
                    assert_eq!(fk.target, target);
                }
            }
        }
    }

    #[test]
    fn test_create_only_kinds() {
        assert!(ResourceKind::Manufacturer.schema().is_create_only());
        assert!(!ResourceKind::Site.schema().is_create_only());
    }

    #[test]
    fn test_enumerated_fields_are_driftable_or_keyed() {
        // a status that cannot drift would be validated but never corrected
        for kind in ResourceKind::SYNC_ORDER {
            let schema = kind.schema();
            for field in schema.enumerated {
                assert!(schema.drift.contains(field), "{kind}.{field}");
            }
        }
    }
}
