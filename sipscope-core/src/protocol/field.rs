//! Header field values.
//!
//! Values borrow from the frame where possible (`Bytes`) so walking a frame
//! does not allocate.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Value of one decoded header field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'data> {
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Bool(bool),
    /// IP address (v4 or v6)
    IpAddr(IpAddr),
    /// MAC address (6 bytes)
    MacAddr([u8; 6]),
    /// Zero-copy reference into the frame.
    Bytes(&'data [u8]),
    /// Null/missing value
    Null,
}

impl<'data> FieldValue<'data> {
    /// Create a MAC address from bytes.
    pub fn mac(bytes: &[u8]) -> Self {
        match bytes.get(..6).and_then(|b| <[u8; 6]>::try_from(b).ok()) {
            Some(mac) => FieldValue::MacAddr(mac),
            None => FieldValue::Null,
        }
    }

    /// Create an IPv4 address from bytes.
    pub fn ipv4(bytes: &[u8]) -> Self {
        match bytes.get(..4).and_then(|b| <[u8; 4]>::try_from(b).ok()) {
            Some(octets) => FieldValue::IpAddr(IpAddr::V4(Ipv4Addr::from(octets))),
            None => FieldValue::Null,
        }
    }

    /// Create an IPv6 address from bytes.
    pub fn ipv6(bytes: &[u8]) -> Self {
        match bytes.get(..16).and_then(|b| <[u8; 16]>::try_from(b).ok()) {
            Some(octets) => FieldValue::IpAddr(IpAddr::V6(Ipv6Addr::from(octets))),
            None => FieldValue::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt8(v) => Some(*v as u64),
            FieldValue::UInt16(v) => Some(*v as u64),
            FieldValue::UInt32(v) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::UInt32(v) => Some(*v),
            FieldValue::UInt16(v) => Some(*v as u32),
            FieldValue::UInt8(v) => Some(*v as u32),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            FieldValue::UInt16(v) => Some(*v),
            FieldValue::UInt8(v) => Some(*v as u16),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            FieldValue::IpAddr(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'data [u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::UInt8(v) => write!(f, "{v}"),
            FieldValue::UInt16(v) => write!(f, "{v}"),
            FieldValue::UInt32(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::IpAddr(addr) => write!(f, "{addr}"),
            FieldValue::MacAddr(m) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            ),
            FieldValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}
