//! Typed SNMP values.

use super::Oid;

/// A varbind value as decoded from a response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    /// Hundredths of a second.
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// Whether this is one of the SNMPv2 exception values.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    /// Numeric view of integer-like values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => Some(i64::from(*v)),
            Self::Counter64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Non-negative numeric view; negative integers yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Counter64(v) => Some(*v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Text view of string-like values.
    ///
    /// Octet strings are decoded as UTF-8 (lossy) with trailing NULs removed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::OctetString(bytes) => {
                let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            Self::ObjectId(oid) => Some(oid.to_string()),
            Self::IpAddress(octets) => Some(std::net::Ipv4Addr::from(*octets).to_string()),
            Self::Integer(_)
            | Self::Counter32(_)
            | Self::Gauge32(_)
            | Self::TimeTicks(_)
            | Self::Counter64(_) => self.as_i64().map(|v| v.to_string()),
            _ => None,
        }
    }

    /// Render an identifier-like octet string.
    ///
    /// Printable ASCII is returned as text. Anything else (typically a MAC
    /// address) is rendered as colon-separated lowercase hex.
    pub fn as_identifier(&self) -> Option<String> {
        match self {
            Self::OctetString(bytes) => {
                if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
                {
                    Some(String::from_utf8_lossy(bytes).into_owned())
                } else {
                    Some(
                        bytes
                            .iter()
                            .map(|b| format!("{b:02x}"))
                            .collect::<Vec<_>>()
                            .join(":"),
                    )
                }
            }
            other => other.as_text(),
        }
    }
}
