//! Field identifiers and packet descriptors
//!
//! Field identifiers are a crate-wide enum rather than strings: comparisons
//! are zero-cost, field names are validated at compile time and no heap
//! allocation is needed to tag a field. Each identifier knows its protocol
//! and its default size in bits (`None` for variable-length fields).

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::buffer::Buffer;
use crate::error::{Result, SchcError};
use crate::parser::ProtocolId;

// =============================================================================
// Directions
// =============================================================================

/// Direction of a packet: device to application or the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "Up")]
    Up,
    #[serde(rename = "Dw")]
    Down,
}

/// Direction constraint of a field descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectionIndicator {
    #[serde(rename = "Up")]
    Up,
    #[serde(rename = "Dw")]
    Down,
    #[serde(rename = "Bi")]
    Bidirectional,
}

impl DirectionIndicator {
    /// Whether a descriptor with this indicator applies to a packet
    /// travelling in `direction`.
    pub fn matches(&self, direction: Direction) -> bool {
        match self {
            DirectionIndicator::Bidirectional => true,
            DirectionIndicator::Up => direction == Direction::Up,
            DirectionIndicator::Down => direction == Direction::Down,
        }
    }
}

// =============================================================================
// Field Identifiers
// =============================================================================

macro_rules! field_ids {
    ($( $variant:ident => ($name:literal, $protocol:ident, $size:expr) ),+ $(,)?) => {
        /// Identifier of one header field slot.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum FieldId {
            $( $variant, )+
        }

        impl FieldId {
            /// Canonical string form, e.g. `"IPV6.VER"`.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( FieldId::$variant => $name, )+
                }
            }

            /// Protocol this field belongs to.
            pub fn protocol(&self) -> ProtocolId {
                match self {
                    $( FieldId::$variant => ProtocolId::$protocol, )+
                }
            }

            /// Default field size in bits; `None` for variable-length fields.
            pub fn default_size_bits(&self) -> Option<u16> {
                match self {
                    $( FieldId::$variant => $size, )+
                }
            }
        }

        impl FromStr for FieldId {
            type Err = SchcError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $( $name => Ok(FieldId::$variant), )+
                    _ => Err(SchcError::RuleValidation(format!("unknown field id: {s}"))),
                }
            }
        }
    };
}

field_ids! {
    // IPv4 (RFC 791)
    Ipv4Ver       => ("IPV4.VER", Ipv4, Some(4)),
    Ipv4Ihl       => ("IPV4.IHL", Ipv4, Some(4)),
    Ipv4Tos       => ("IPV4.TOS", Ipv4, Some(8)),
    Ipv4Len       => ("IPV4.LEN", Ipv4, Some(16)),
    Ipv4Id        => ("IPV4.ID", Ipv4, Some(16)),
    Ipv4Flags     => ("IPV4.FLAGS", Ipv4, Some(3)),
    Ipv4FragOff   => ("IPV4.FRAG_OFF", Ipv4, Some(13)),
    Ipv4Ttl       => ("IPV4.TTL", Ipv4, Some(8)),
    Ipv4Proto     => ("IPV4.PROTO", Ipv4, Some(8)),
    Ipv4Chksum    => ("IPV4.CHKSUM", Ipv4, Some(16)),
    Ipv4Src       => ("IPV4.SRC", Ipv4, Some(32)),
    Ipv4Dst       => ("IPV4.DST", Ipv4, Some(32)),
    // IPv6 (RFC 8200)
    Ipv6Ver       => ("IPV6.VER", Ipv6, Some(4)),
    Ipv6Tc        => ("IPV6.TC", Ipv6, Some(8)),
    Ipv6Fl        => ("IPV6.FL", Ipv6, Some(20)),
    Ipv6Len       => ("IPV6.LEN", Ipv6, Some(16)),
    Ipv6Nxt       => ("IPV6.NXT", Ipv6, Some(8)),
    Ipv6HopLmt    => ("IPV6.HOP_LMT", Ipv6, Some(8)),
    Ipv6Src       => ("IPV6.SRC", Ipv6, Some(128)),
    Ipv6Dst       => ("IPV6.DST", Ipv6, Some(128)),
    // IPv6 extension headers (generic TLV view)
    ExtNxt        => ("EXT.NXT", Ipv6, Some(8)),
    ExtLen        => ("EXT.LEN", Ipv6, Some(8)),
    ExtData       => ("EXT.DATA", Ipv6, None),
    // UDP (RFC 768)
    UdpSrcPort    => ("UDP.SRC_PORT", Udp, Some(16)),
    UdpDstPort    => ("UDP.DST_PORT", Udp, Some(16)),
    UdpLen        => ("UDP.LEN", Udp, Some(16)),
    UdpCksum      => ("UDP.CKSUM", Udp, Some(16)),
    // SCTP (RFC 9260), common header + generic chunk view
    SctpSrcPort   => ("SCTP.SRC_PORT", Sctp, Some(16)),
    SctpDstPort   => ("SCTP.DST_PORT", Sctp, Some(16)),
    SctpVerTag    => ("SCTP.VER_TAG", Sctp, Some(32)),
    SctpCksum     => ("SCTP.CKSUM", Sctp, Some(32)),
    SctpChunkType => ("SCTP.CHUNK_TYPE", Sctp, Some(8)),
    SctpChunkFlags => ("SCTP.CHUNK_FLAGS", Sctp, Some(8)),
    SctpChunkLen  => ("SCTP.CHUNK_LEN", Sctp, Some(16)),
    SctpChunkValue => ("SCTP.CHUNK_VALUE", Sctp, None),
    SctpChunkPadding => ("SCTP.CHUNK_PADDING", Sctp, None),
    SctpDataTsn   => ("SCTP.DATA_TSN", Sctp, Some(32)),
    SctpDataStreamId => ("SCTP.DATA_STREAM_ID", Sctp, Some(16)),
    SctpDataStreamSeq => ("SCTP.DATA_STREAM_SEQ", Sctp, Some(16)),
    SctpDataPpid  => ("SCTP.DATA_PPID", Sctp, Some(32)),
    SctpDataPayload => ("SCTP.DATA_PAYLOAD", Sctp, None),
    // CoAP (RFC 7252), syntactic view
    CoapVer       => ("COAP.VER", Coap, Some(2)),
    CoapType      => ("COAP.TYPE", Coap, Some(2)),
    CoapTkl       => ("COAP.TKL", Coap, Some(4)),
    CoapCode      => ("COAP.CODE", Coap, Some(8)),
    CoapMid       => ("COAP.MID", Coap, Some(16)),
    CoapToken     => ("COAP.TOKEN", Coap, None),
    CoapOptDelta  => ("COAP.OPT_DELTA", Coap, Some(4)),
    CoapOptLen    => ("COAP.OPT_LEN", Coap, Some(4)),
    CoapOptDeltaExt => ("COAP.OPT_DELTA_EXT", Coap, None),
    CoapOptLenExt => ("COAP.OPT_LEN_EXT", Coap, None),
    CoapOptValue  => ("COAP.OPT_VALUE", Coap, None),
    CoapPayloadMarker => ("COAP.PAYLOAD_MARKER", Coap, Some(8)),
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldId::from_str(&s).map_err(D::Error::custom)
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// One field slot in a packet: identifier, actual length in bits, occurrence
/// position (disambiguates repeated ids, e.g. CoAP options) and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub length: u16,
    pub position: u8,
    pub direction: DirectionIndicator,
}

impl FieldDescriptor {
    pub fn new(id: FieldId, length: u16, position: u8) -> Self {
        Self {
            id,
            length,
            position,
            direction: DirectionIndicator::Bidirectional,
        }
    }
}

/// Ordered sequence of parsed field buffers plus the trailing payload.
/// Field order matches on-wire order, so serializing is plain concatenation.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketDescriptor {
    pub direction: Direction,
    pub fields: Vec<(FieldDescriptor, Buffer)>,
    pub payload: Buffer,
}

impl PacketDescriptor {
    /// Rebuild the on-wire bit stream: field buffers in order, then payload.
    pub fn serialize(&self) -> Buffer {
        let mut out = Buffer::empty(crate::buffer::Padding::Right);
        for (_, value) in &self.fields {
            out = out.concat(value);
        }
        out.concat(&self.payload).pad(crate::buffer::Padding::Right)
    }

    /// Rebuild the on-wire bytes. The headers of the supported stacks are
    /// byte-aligned, so no filler bits appear.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize().content()
    }

    /// Total header length in bits (payload excluded).
    pub fn header_length(&self) -> usize {
        self.fields.iter().map(|(_, value)| value.len()).sum()
    }
}
