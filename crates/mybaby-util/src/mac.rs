//! Canonical MAC addresses and vendor prefixes
//!
//! Accepted input is six 2-digit hex groups separated by `:` or `-`, in any
//! case. The canonical form is uppercase and colon-separated
//! (`AA:BB:CC:DD:EE:FF`), so formatting a parsed address and parsing it again
//! yields the same value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Input that is not a well-formed MAC address or OUI
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid MAC format '{0}' (expected AA:BB:CC:DD:EE:FF, ':' or '-' separated)")]
pub struct MacParseError(pub String);

/// A MAC address in canonical form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn parse(raw: &str) -> Result<Self, MacParseError> {
        parse_hex_groups::<6>(raw)
            .map(Self)
            .ok_or_else(|| MacParseError(raw.to_string()))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Vendor prefix: the first three octets
    pub fn oui(&self) -> Oui {
        Oui([self.0[0], self.0[1], self.0[2]])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_groups(f, &self.0)
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Organizationally Unique Identifier (first three octets of a MAC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oui([u8; 3]);

impl Oui {
    pub fn parse(raw: &str) -> Result<Self, MacParseError> {
        parse_hex_groups::<3>(raw)
            .map(Self)
            .ok_or_else(|| MacParseError(raw.to_string()))
    }
}

impl fmt::Display for Oui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_groups(f, &self.0)
    }
}

impl TryFrom<String> for Oui {
    type Error = MacParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Oui> for String {
    fn from(oui: Oui) -> Self {
        oui.to_string()
    }
}

fn parse_hex_groups<const N: usize>(raw: &str) -> Option<[u8; N]> {
    let bytes = raw.as_bytes();
    if bytes.len() != N * 3 - 1 {
        return None;
    }

    let mut out = [0u8; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let hi = bytes[i * 3];
        let lo = bytes[i * 3 + 1];
        if !hi.is_ascii_hexdigit() || !lo.is_ascii_hexdigit() {
            return None;
        }
        *slot = (hex_value(hi) << 4) | hex_value(lo);

        if i + 1 < N && !matches!(bytes[i * 3 + 2], b':' | b'-') {
            return None;
        }
    }
    Some(out)
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

fn write_groups(f: &mut fmt::Formatter<'_>, octets: &[u8]) -> fmt::Result {
    for (i, octet) in octets.iter().enumerate() {
        if i > 0 {
            f.write_str(":")?;
        }
        write!(f, "{:02X}", octet)?;
    }
    Ok(())
}
