// Copyright (c) 2025 - Cowboy AI, Inc.
//! Device facts
//!
//! Parsers for RouterOS command output that was captured ahead of a run.
//! Connecting to devices is out of scope; these only read text.
//!
//! ```text
//! /system/routerboard/print   ──> DeviceFacts { model, serial }
//! /ip/arp/print               ──> Vec<ArpEntry { address, mac }>
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::domain::{IpAddressWithCidr, MacAddress};
use crate::errors::{SyncError, SyncResult};

static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*model:\s*(\S+)").expect("valid regex")
});

static SERIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*serial-number:\s*(\S+)").expect("valid regex")
});

static ARP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:\.\d{1,3}){3})\s+([0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5})")
        .expect("valid regex")
});

/// Hardware facts reported by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFacts {
    pub model: String,
    pub serial: String,
}

/// Parse `/system/routerboard/print` output
///
/// Returns `None` unless both model and serial number are present.
pub fn parse_routerboard(text: &str) -> Option<DeviceFacts> {
    let model = MODEL_RE.captures(text)?.get(1)?.as_str();
    let serial = SERIAL_RE.captures(text)?.get(1)?.as_str();

    Some(DeviceFacts {
        model: model.to_string(),
        serial: serial.to_string(),
    })
}

/// One IPv4 neighbour from an ARP table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub address: IpAddr,
    pub mac: MacAddress,
}

/// Parse `/ip/arp/print` output; lines without an address and MAC are ignored
pub fn parse_arp_table(text: &str) -> Vec<ArpEntry> {
    text.lines()
        .filter_map(|line| {
            let captures = ARP_RE.captures(line)?;
            let address = captures.get(1)?.as_str().parse().ok()?;
            let mac = MacAddress::new(captures.get(2)?.as_str()).ok()?;
            Some(ArpEntry { address, mac })
        })
        .collect()
}

/// Keep entries whose address is a usable host in one of `subnets`
pub fn filter_arp_entries(entries: Vec<ArpEntry>, subnets: &[IpAddressWithCidr]) -> Vec<ArpEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            let keep = subnets.iter().any(|s| s.contains_host(entry.address));
            if !keep {
                debug!("Ignoring ARP entry {} outside scanned subnets", entry.address);
            }
            keep
        })
        .collect()
}

/// Captured command output for one device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceCapture {
    pub name: String,
    /// Manufacturer to file the device type under
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Raw `/system/routerboard/print` output
    #[serde(default)]
    pub routerboard: Option<String>,
    /// Raw `/ip/arp/print` output
    #[serde(default)]
    pub arp: Option<String>,
}

/// `facts.yml`: captured output plus the subnets ARP entries are kept for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactsDocument {
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub devices: Vec<DeviceCapture>,
}

fn default_manufacturer() -> String {
    "MikroTik".to_string()
}

impl FactsDocument {
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SyncError::Document {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|e| match e {
            SyncError::Document { reason, .. } => SyncError::Document {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn parse(text: &str) -> SyncResult<Self> {
        serde_yaml::from_str(text).map_err(|e| SyncError::Document {
            path: "<facts>".to_string(),
            reason: e.to_string(),
        })
    }

    /// The configured subnets as networks
    pub fn networks(&self) -> SyncResult<Vec<IpAddressWithCidr>> {
        self.subnets
            .iter()
            .map(|s| {
                IpAddressWithCidr::network(s)
                    .map_err(|e| SyncError::Configuration(format!("subnet {}: {}", s, e)))
            })
            .collect()
    }
}
