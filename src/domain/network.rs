// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants
//!
//! Canonical forms matter here: addresses and prefixes are part of natural
//! keys, so the same network must always render to the same string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),

    #[error("Prefix length required: {0}")]
    MissingPrefixLength(String),

    #[error("Invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("Invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(i64),
}

/// IP Address with optional CIDR prefix length
///
/// Invariants:
/// - Valid IPv4 or IPv6 address
/// - Prefix length within range for the address family
///
/// # Examples
///
/// ```rust
/// use netbox_sync::domain::IpAddressWithCidr;
///
/// let ip = IpAddressWithCidr::new("192.168.1.10/24").unwrap();
/// assert_eq!(ip.address().to_string(), "192.168.1.10");
/// assert_eq!(ip.prefix_length(), Some(24));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpAddressWithCidr {
    address: IpAddr,
    prefix_length: Option<u8>,
}

impl IpAddressWithCidr {
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref().trim();

        if let Some((addr_str, prefix_str)) = cidr.split_once('/') {
            let address = IpAddr::from_str(addr_str)
                .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

            let prefix_length = prefix_str
                .parse::<u8>()
                .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

            Self::from_parts(address, Some(prefix_length))
        } else {
            let address = IpAddr::from_str(cidr)
                .map_err(|_| NetworkError::InvalidIpAddress(cidr.to_string()))?;

            Ok(Self {
                address,
                prefix_length: None,
            })
        }
    }

    /// Parse a network, rejecting bare addresses
    ///
    /// Host bits are cleared, as NetBox does when it saves a prefix:
    /// `10.1.10.5/24` becomes `10.1.10.0/24`.
    pub fn network(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let parsed = Self::new(cidr.as_ref())?;
        let Some(prefix) = parsed.prefix_length else {
            return Err(NetworkError::MissingPrefixLength(cidr.as_ref().trim().to_string()));
        };

        let address = match parsed.address {
            IpAddr::V4(addr) => IpAddr::V4(Ipv4Addr::from(u32::from(addr) & v4_mask(prefix))),
            IpAddr::V6(addr) => IpAddr::V6(Ipv6Addr::from(u128::from(addr) & v6_mask(prefix))),
        };
        Ok(Self {
            address,
            prefix_length: Some(prefix),
        })
    }

    fn from_parts(address: IpAddr, prefix_length: Option<u8>) -> Result<Self, NetworkError> {
        if let Some(prefix) = prefix_length {
            if prefix > Self::max_prefix(address) {
                return Err(NetworkError::InvalidPrefixLength(prefix));
            }
        }

        Ok(Self {
            address,
            prefix_length,
        })
    }

    fn max_prefix(address: IpAddr) -> u8 {
        match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn prefix_length(&self) -> Option<u8> {
        self.prefix_length
    }

    /// Get as CIDR notation string
    pub fn as_cidr(&self) -> String {
        if let Some(prefix) = self.prefix_length {
            format!("{}/{}", self.address, prefix)
        } else {
            self.address.to_string()
        }
    }

    /// Whether `candidate` is a usable host address inside this network
    ///
    /// For IPv4 networks shorter than /31 the network and broadcast addresses
    /// are excluded. A bare address (no prefix length) contains only itself.
    pub fn contains_host(&self, candidate: IpAddr) -> bool {
        let Some(prefix) = self.prefix_length else {
            return self.address == candidate;
        };

        match (self.address, candidate) {
            (IpAddr::V4(net), IpAddr::V4(host)) => {
                let mask = v4_mask(prefix);
                let network = u32::from(net) & mask;
                let host = u32::from(host);
                if host & mask != network {
                    return false;
                }
                if prefix >= 31 {
                    return true;
                }
                let broadcast = network | !mask;
                host != network && host != broadcast
            }
            (IpAddr::V6(net), IpAddr::V6(host)) => {
                let mask = v6_mask(prefix);
                u128::from(net) & mask == u128::from(host) & mask
            }
            _ => false,
        }
    }
}

fn v4_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn v6_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl fmt::Display for IpAddressWithCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

impl FromStr for IpAddressWithCidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<Ipv4Addr> for IpAddressWithCidr {
    fn from(address: Ipv4Addr) -> Self {
        Self {
            address: IpAddr::V4(address),
            prefix_length: None,
        }
    }
}

impl From<Ipv6Addr> for IpAddressWithCidr {
    fn from(address: Ipv6Addr) -> Self {
        Self {
            address: IpAddr::V6(address),
            prefix_length: None,
        }
    }
}

/// MAC Address value object
///
/// Accepts colon, hyphen or unseparated hex. Renders upper-case and
/// colon-separated, which is how RouterOS prints ARP entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(mac: impl AsRef<str>) -> Result<Self, NetworkError> {
        let mac = mac.as_ref().trim();
        let mac_clean = mac.replace([':', '-'], "");

        if mac_clean.len() != 12 || !mac_clean.is_ascii() {
            return Err(NetworkError::InvalidMacAddress(mac.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, chunk) in mac_clean.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk)
                .map_err(|_| NetworkError::InvalidMacAddress(mac.to_string()))?;
            octets[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|_| NetworkError::InvalidMacAddress(mac.to_string()))?;
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// VLAN ID value object (IEEE 802.1Q, 1-4094)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4094;

    pub fn new(id: i64) -> Result<Self, NetworkError> {
        if id < i64::from(Self::MIN) || id > i64::from(Self::MAX) {
            return Err(NetworkError::InvalidVlanId(id));
        }

        Ok(Self(id as u16))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
