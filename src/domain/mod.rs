// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network value objects shared by key normalization and device facts
//!
//! - [`IpAddressWithCidr`] - IPv4/IPv6 with optional CIDR prefix length
//! - [`MacAddress`] - 48-bit MAC address
//! - [`VlanId`] - IEEE 802.1Q VLAN ID (1-4094)

pub mod network;

pub use network::{IpAddressWithCidr, MacAddress, NetworkError, VlanId};
