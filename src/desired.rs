// Copyright (c) 2025 - Cowboy AI, Inc.
//! Desired-state documents
//!
//! One YAML document lists the records that should exist, grouped by kind.
//! Every list is optional and every entry keeps the fields it does not
//! name in `extra`, which is passed through on create.
//!
//! ```yaml
//! sites:
//!   - name: nyc1
//!     status: active
//! interfaces:
//!   - device: nyc1-rtr1
//!     interfaces:
//!       - name: ether1
//!         address: 10.1.10.1/24
//! prefixes:
//!   - prefix: 10.1.0.0/16
//!     site: nyc1
//!     container: true
//!   - prefix: 10.1.10.0/24
//!     site: nyc1
//!     vlan: { vid: 10, name: users }
//! ```
//!
//! Key fields are optional in the types, and each entry is read on its own,
//! so a malformed entry is reported as skipped instead of failing the whole
//! document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::client::Fields;
use crate::domain::IpAddressWithCidr;
use crate::errors::{SyncError, SyncResult};
use crate::facts::{filter_arp_entries, parse_arp_table, parse_routerboard, ArpEntry, DeviceFacts, FactsDocument};
use crate::schema::ResourceKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub name: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub physical_address: Option<String>,
    pub time_zone: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRoleEntry {
    pub name: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerEntry {
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTypeEntry {
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: Option<String>,
    pub site: Option<String>,
    #[serde(alias = "device_role")]
    pub role: Option<String>,
    #[serde(alias = "type")]
    pub device_type: Option<String>,
    pub status: Option<String>,
    pub serial: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub device: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub interface_type: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub mtu: Option<u32>,
    /// Expands into an IP address assigned to this interface
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// Interfaces of one device, as in a per-device interface list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceGroup {
    pub device: Option<String>,
    pub interfaces: Vec<InterfaceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InterfaceItem {
    Grouped(InterfaceGroup),
    Flat(InterfaceEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpAddressEntry {
    pub address: Option<String>,
    pub interface: Option<InterfaceRef>,
    pub status: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlanEntry {
    pub site: Option<String>,
    pub vid: Option<Value>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// VLAN named by a prefix; the site defaults to the prefix's site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlanRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefixEntry {
    pub prefix: Option<String>,
    pub site: Option<String>,
    pub vlan: Option<VlanRef>,
    /// Shorthand for `status: container`
    #[serde(default, skip_serializing)]
    pub container: bool,
    pub status: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// An entry that could not be read
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEntry {
    pub kind: ResourceKind,
    pub fields: Fields,
    pub reason: String,
}

/// Document as written, before its entries are typed
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDocument {
    sites: Vec<Value>,
    device_roles: Vec<Value>,
    manufacturers: Vec<Value>,
    device_types: Vec<Value>,
    devices: Vec<Value>,
    interfaces: Vec<Value>,
    ip_addresses: Vec<Value>,
    vlans: Vec<Value>,
    prefixes: Vec<Value>,
}

/// Everything that should exist in the inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DesiredState {
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub device_roles: Vec<DeviceRoleEntry>,
    #[serde(default)]
    pub manufacturers: Vec<ManufacturerEntry>,
    #[serde(default)]
    pub device_types: Vec<DeviceTypeEntry>,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceItem>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddressEntry>,
    #[serde(default)]
    pub vlans: Vec<VlanEntry>,
    #[serde(default)]
    pub prefixes: Vec<PrefixEntry>,
    /// Entries that could not be read; each is reported as skipped
    #[serde(skip)]
    pub rejected: Vec<RejectedEntry>,
}

/// Type one entry, or keep it as rejected
fn typed<T: DeserializeOwned>(
    kind: ResourceKind,
    raw: Value,
    rejected: &mut Vec<RejectedEntry>,
) -> Option<T> {
    match T::deserialize(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Unreadable {} entry: {}", kind, e);
            let fields = match raw {
                Value::Object(map) => map,
                other => Fields::from_iter([("value".to_string(), other)]),
            };
            rejected.push(RejectedEntry {
                kind,
                fields,
                reason: e.to_string(),
            });
            None
        }
    }
}

fn read_list<T: DeserializeOwned>(
    kind: ResourceKind,
    items: Vec<Value>,
    rejected: &mut Vec<RejectedEntry>,
) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|raw| typed(kind, raw, rejected))
        .collect()
}

/// Read flat interfaces and per-device groups; a bad interface in a group
/// does not affect its siblings
fn read_interfaces(items: Vec<Value>, rejected: &mut Vec<RejectedEntry>) -> Vec<InterfaceItem> {
    let mut read = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(mut group) if group.get("interfaces").is_some_and(Value::is_array) => {
                let device = group.remove("device");
                let Some(Value::Array(members)) = group.remove("interfaces") else {
                    continue;
                };

                let mut interfaces = Vec::with_capacity(members.len());
                for mut member in members {
                    if let (Value::Object(fields), Some(device)) = (&mut member, &device) {
                        fields.entry("device").or_insert_with(|| device.clone());
                    }
                    if let Some(entry) = typed(ResourceKind::Interface, member, rejected) {
                        interfaces.push(entry);
                    }
                }

                read.push(InterfaceItem::Grouped(InterfaceGroup {
                    device: device.as_ref().and_then(Value::as_str).map(str::to_string),
                    interfaces,
                }));
            }
            other => {
                if let Some(entry) = typed(ResourceKind::Interface, other, rejected) {
                    read.push(InterfaceItem::Flat(entry));
                }
            }
        }
    }
    read
}

/// Serialize an entry to a field map, dropping unset fields
fn to_fields<T: Serialize>(entry: &T) -> Fields {
    match serde_json::to_value(entry) {
        Ok(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        Ok(_) | Err(_) => Fields::new(),
    }
}

fn same_name(a: Option<&str>, b: &str) -> bool {
    a.is_some_and(|a| a.trim().eq_ignore_ascii_case(b.trim()))
}

fn same_host(address: &str, host: IpAddr) -> bool {
    IpAddressWithCidr::new(address).is_ok_and(|ip| ip.address() == host)
}

impl DesiredState {
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SyncError::Document {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let raw: RawDocument = serde_yaml::from_str(&text).map_err(|e| SyncError::Document {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let state = Self::from_document(raw);

        info!("📄 Loaded desired state from {} ({} entries)", path.display(), state.len());
        Ok(state)
    }

    pub fn parse(text: &str) -> SyncResult<Self> {
        let raw: RawDocument = serde_yaml::from_str(text).map_err(|e| SyncError::Document {
            path: "<desired>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_document(raw))
    }

    fn from_document(raw: RawDocument) -> Self {
        let mut rejected = Vec::new();
        Self {
            sites: read_list(ResourceKind::Site, raw.sites, &mut rejected),
            device_roles: read_list(ResourceKind::DeviceRole, raw.device_roles, &mut rejected),
            manufacturers: read_list(ResourceKind::Manufacturer, raw.manufacturers, &mut rejected),
            device_types: read_list(ResourceKind::DeviceType, raw.device_types, &mut rejected),
            devices: read_list(ResourceKind::Device, raw.devices, &mut rejected),
            interfaces: read_interfaces(raw.interfaces, &mut rejected),
            ip_addresses: read_list(ResourceKind::IpAddress, raw.ip_addresses, &mut rejected),
            vlans: read_list(ResourceKind::Vlan, raw.vlans, &mut rejected),
            prefixes: read_list(ResourceKind::Prefix, raw.prefixes, &mut rejected),
            rejected,
        }
    }

    /// Total entries across kinds, after interface expansion, including
    /// rejected ones
    pub fn len(&self) -> usize {
        let readable: usize = ResourceKind::SYNC_ORDER
            .iter()
            .map(|kind| self.entries(*kind).len())
            .sum();
        readable + self.rejected.len()
    }

    /// Entries of `kind` that could not be read
    pub fn rejected(&self, kind: ResourceKind) -> Vec<&RejectedEntry> {
        self.rejected.iter().filter(|r| r.kind == kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interface entries with the group's device filled in
    fn flat_interfaces(&self) -> Vec<InterfaceEntry> {
        let mut flat = Vec::new();
        for item in &self.interfaces {
            match item {
                InterfaceItem::Flat(entry) => flat.push(entry.clone()),
                InterfaceItem::Grouped(group) => {
                    for entry in &group.interfaces {
                        let mut entry = entry.clone();
                        if entry.device.is_none() {
                            entry.device = group.device.clone();
                        }
                        flat.push(entry);
                    }
                }
            }
        }
        flat
    }

    /// Entries for `kind` as field maps, in document order
    pub fn entries(&self, kind: ResourceKind) -> Vec<Fields> {
        match kind {
            ResourceKind::Site => self.sites.iter().map(to_fields).collect(),
            ResourceKind::DeviceRole => self.device_roles.iter().map(to_fields).collect(),
            ResourceKind::Manufacturer => self.manufacturers.iter().map(to_fields).collect(),
            ResourceKind::DeviceType => self.device_types.iter().map(to_fields).collect(),
            ResourceKind::Device => self.devices.iter().map(to_fields).collect(),
            ResourceKind::Interface => self
                .flat_interfaces()
                .into_iter()
                .map(|mut entry| {
                    entry.address = None;
                    to_fields(&entry)
                })
                .collect(),
            ResourceKind::IpAddress => {
                let mut entries: Vec<Fields> = self.ip_addresses.iter().map(to_fields).collect();
                for interface in self.flat_interfaces() {
                    let (Some(address), Some(device), Some(name)) =
                        (&interface.address, &interface.device, &interface.name)
                    else {
                        continue;
                    };
                    let expanded = IpAddressEntry {
                        address: Some(address.clone()),
                        interface: Some(InterfaceRef {
                            device: Some(device.clone()),
                            name: Some(name.clone()),
                        }),
                        description: Some(format!("{}:{}", device.trim().to_uppercase(), name.trim())),
                        ..IpAddressEntry::default()
                    };
                    entries.push(to_fields(&expanded));
                }
                entries
            }
            ResourceKind::Vlan => self.vlans.iter().map(to_fields).collect(),
            ResourceKind::Prefix => self
                .prefixes
                .iter()
                .map(|prefix| {
                    let mut fields = to_fields(prefix);
                    if prefix.container && prefix.status.is_none() {
                        fields.insert("status".to_string(), Value::from("container"));
                    }
                    fields
                })
                .collect(),
        }
    }

    /// Record a device's hardware facts
    ///
    /// Sets the serial number and device type of the named device and adds
    /// the manufacturer and device type entries when they are not already
    /// listed. Returns `false` when the device is not in the document.
    pub fn apply_device_facts(&mut self, device: &str, facts: &DeviceFacts, manufacturer: &str) -> bool {
        let Some(entry) = self.devices.iter_mut().find(|d| same_name(d.name.as_deref(), device)) else {
            warn!("Facts for {} ignored: device not in desired state", device);
            return false;
        };
        entry.serial = Some(facts.serial.clone());
        entry.device_type = Some(facts.model.clone());

        if !self.manufacturers.iter().any(|m| same_name(m.name.as_deref(), manufacturer)) {
            self.manufacturers.push(ManufacturerEntry {
                name: Some(manufacturer.to_string()),
                ..ManufacturerEntry::default()
            });
        }
        if !self.device_types.iter().any(|t| same_name(t.model.as_deref(), &facts.model)) {
            self.device_types.push(DeviceTypeEntry {
                model: Some(facts.model.clone()),
                manufacturer: Some(manufacturer.to_string()),
                ..DeviceTypeEntry::default()
            });
        }

        debug!("Applied facts to {}: model {} serial {}", device, facts.model, facts.serial);
        true
    }

    /// Add discovered neighbours as IP addresses described by their MAC
    ///
    /// Addresses compare by host, whatever their prefix length. An address
    /// that is already listed, directly or on an interface, only gets its
    /// description set. New addresses are added bare, so they also match an
    /// existing record of any prefix length.
    pub fn apply_arp_entries(&mut self, entries: &[ArpEntry]) -> usize {
        let mut added = 0;
        for arp in entries {
            let description = Some(arp.mac.to_string());

            if let Some(existing) = self
                .ip_addresses
                .iter_mut()
                .find(|ip| ip.address.as_deref().is_some_and(|a| same_host(a, arp.address)))
            {
                existing.description = description;
                continue;
            }

            if let Some(assigned) = self.take_interface_address(arp.address) {
                self.ip_addresses.push(IpAddressEntry {
                    description,
                    ..assigned
                });
                continue;
            }

            self.ip_addresses.push(IpAddressEntry {
                address: Some(arp.address.to_string()),
                description,
                ..IpAddressEntry::default()
            });
            added += 1;
        }
        added
    }

    /// Move an interface's `address` matching `host` into an assigned
    /// IP address entry
    fn take_interface_address(&mut self, host: IpAddr) -> Option<IpAddressEntry> {
        for item in &mut self.interfaces {
            let (group_device, entries) = match item {
                InterfaceItem::Flat(entry) => (None, std::slice::from_mut(entry)),
                InterfaceItem::Grouped(InterfaceGroup { device, interfaces }) => {
                    (device.clone(), interfaces.as_mut_slice())
                }
            };

            for entry in entries {
                if !entry.address.as_deref().is_some_and(|a| same_host(a, host)) {
                    continue;
                }
                let (Some(device), Some(name)) =
                    (entry.device.clone().or_else(|| group_device.clone()), entry.name.clone())
                else {
                    continue;
                };
                return Some(IpAddressEntry {
                    address: entry.address.take(),
                    interface: Some(InterfaceRef {
                        device: Some(device),
                        name: Some(name),
                    }),
                    ..IpAddressEntry::default()
                });
            }
        }
        None
    }

    /// Fold a facts document into this desired state
    pub fn apply_facts(&mut self, facts: &FactsDocument) -> SyncResult<()> {
        let subnets = facts.networks()?;

        for capture in &facts.devices {
            let manufacturer = capture.manufacturer.as_deref().unwrap_or(&facts.manufacturer);
            if let Some(text) = &capture.routerboard {
                match parse_routerboard(text) {
                    Some(device_facts) => {
                        self.apply_device_facts(&capture.name, &device_facts, manufacturer);
                    }
                    None => warn!("No model/serial in routerboard output for {}", capture.name),
                }
            }

            if let Some(text) = &capture.arp {
                let found = filter_arp_entries(parse_arp_table(text), &subnets);
                let added = self.apply_arp_entries(&found);
                info!(
                    "Found {} ARP entries on {} ({} new addresses)",
                    found.len(),
                    capture.name,
                    added
                );
            }
        }

        Ok(())
    }
}
