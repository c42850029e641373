//! Packet parsing
//!
//! A packet parser turns raw packet bytes into a [`PacketDescriptor`]: an
//! ordered sequence of named field buffers plus the trailing payload. Header
//! parsers expose fields as raw bit ranges in their on-wire form and never
//! interpret their semantics; whatever a parser yields, plain concatenation
//! of the field buffers regenerates the original bytes.
//!
//! Per-protocol parsers implement [`HeaderParser`] and are composed into
//! stacks (e.g. IPv6 → UDP → CoAP) by [`StackParser`], which cross-checks
//! each layer's next-protocol hint against the configured stack.

mod coap;
mod ipv4;
mod ipv6;
mod sctp;
mod udp;

pub use coap::CoapParser;
pub use ipv4::Ipv4Parser;
pub use ipv6::Ipv6Parser;
pub use sctp::SctpParser;
pub use udp::UdpParser;

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::buffer::{Buffer, Padding};
use crate::error::{Result, SchcError};
use crate::field::{Direction, FieldDescriptor, PacketDescriptor};

// =============================================================================
// Protocols
// =============================================================================

/// Protocols the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolId {
    Ipv4,
    Ipv6,
    Udp,
    Sctp,
    Coap,
}

/// IP protocol number for UDP.
pub const IP_PROTO_UDP: u64 = 17;
/// IP protocol number for SCTP.
pub const IP_PROTO_SCTP: u64 = 132;
/// Default CoAP UDP port.
pub const COAP_PORT: u64 = 5683;

/// Result of parsing one header at a given bit offset.
#[derive(Debug)]
pub struct ParsedHeader {
    /// Parsed fields in on-wire order.
    pub fields: Vec<(FieldDescriptor, Buffer)>,
    /// Bits consumed from the offset.
    pub bits_consumed: usize,
    /// Hint about the protocol that follows, when the header carries one
    /// (IP next-header values, well-known ports).
    pub next_protocol: Option<ProtocolId>,
}

/// A per-protocol header parser.
///
/// `parse` decomposes the header starting at bit `offset` of `packet` into
/// raw field buffers without interpreting them, reporting how many bits it
/// consumed and, when the header says so, which protocol follows.
pub trait HeaderParser {
    fn id(&self) -> ProtocolId;

    fn parse(&self, packet: &Buffer, offset: usize) -> Result<ParsedHeader>;
}

/// Bounds check shared by the header parsers.
pub(crate) fn require(
    header: &'static str,
    packet: &Buffer,
    offset: usize,
    needed: usize,
) -> Result<()> {
    let available = packet.len().saturating_sub(offset);
    if available < needed {
        return Err(SchcError::Truncated {
            header,
            needed,
            available,
        });
    }
    Ok(())
}

// =============================================================================
// Stacks
// =============================================================================

/// Identifier of a protocol stack, the `parser_id` of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackId {
    Ipv6UdpCoap,
    Ipv4UdpCoap,
    Ipv6Udp,
    Ipv4Udp,
    Ipv6Sctp,
}

impl StackId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackId::Ipv6UdpCoap => "IPv6-UDP-CoAP",
            StackId::Ipv4UdpCoap => "IPv4-UDP-CoAP",
            StackId::Ipv6Udp => "IPv6-UDP",
            StackId::Ipv4Udp => "IPv4-UDP",
            StackId::Ipv6Sctp => "IPv6-SCTP",
        }
    }

    fn layers(&self) -> Vec<Box<dyn HeaderParser>> {
        match self {
            StackId::Ipv6UdpCoap => vec![
                Box::new(Ipv6Parser),
                Box::new(UdpParser),
                Box::new(CoapParser),
            ],
            StackId::Ipv4UdpCoap => vec![
                Box::new(Ipv4Parser),
                Box::new(UdpParser),
                Box::new(CoapParser),
            ],
            StackId::Ipv6Udp => vec![Box::new(Ipv6Parser), Box::new(UdpParser)],
            StackId::Ipv4Udp => vec![Box::new(Ipv4Parser), Box::new(UdpParser)],
            StackId::Ipv6Sctp => vec![Box::new(Ipv6Parser), Box::new(SctpParser)],
        }
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackId {
    type Err = SchcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IPv6-UDP-CoAP" => Ok(StackId::Ipv6UdpCoap),
            "IPv4-UDP-CoAP" => Ok(StackId::Ipv4UdpCoap),
            "IPv6-UDP" => Ok(StackId::Ipv6Udp),
            "IPv4-UDP" => Ok(StackId::Ipv4Udp),
            "IPv6-SCTP" => Ok(StackId::Ipv6Sctp),
            _ => Err(SchcError::RuleValidation(format!("unknown stack id: {s}"))),
        }
    }
}

impl Serialize for StackId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StackId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StackId::from_str(&s).map_err(D::Error::custom)
    }
}

/// Composes header parsers in stack order over a raw packet.
pub struct StackParser {
    id: StackId,
    layers: Vec<Box<dyn HeaderParser>>,
}

impl StackParser {
    pub fn new(id: StackId) -> Self {
        Self {
            id,
            layers: id.layers(),
        }
    }

    pub fn id(&self) -> StackId {
        self.id
    }

    /// Parse `bytes` into a packet descriptor; whatever bits the stack's
    /// headers do not cover become the payload.
    pub fn parse(&self, bytes: &[u8], direction: Direction) -> Result<PacketDescriptor> {
        let packet = Buffer::from_bytes(bytes, Padding::Right);
        let mut fields = Vec::new();
        let mut offset = 0usize;
        let mut hint: Option<ProtocolId> = None;

        for layer in &self.layers {
            if let Some(expected) = hint {
                if expected != layer.id() {
                    return Err(SchcError::Malformed {
                        header: "stack",
                        reason: format!(
                            "header chain announces {expected:?}, stack {} expects {:?}",
                            self.id,
                            layer.id()
                        ),
                    });
                }
            }
            let header = layer.parse(&packet, offset)?;
            offset += header.bits_consumed;
            hint = header.next_protocol;
            fields.extend(header.fields);
        }

        let payload = packet.slice(offset as isize, packet.len() as isize)?;
        Ok(PacketDescriptor {
            direction,
            fields,
            payload,
        })
    }
}
