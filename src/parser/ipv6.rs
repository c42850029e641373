//! IPv6 header parser
//!
//! Parses the IPv6 base header as defined in RFC 8200, plus any Hop-by-Hop
//! Options, Routing and Destination Options extension headers chained via
//! `next_header`. Extension headers are exposed as a generic TLV view
//! (`EXT.NXT` / `EXT.LEN` / `EXT.DATA`); Fragment headers are not parsed as
//! fragmentation is handled by SCHC-RF.

use crate::buffer::Buffer;
use crate::error::{Result, SchcError};
use crate::field::{FieldDescriptor, FieldId};
use crate::parser::{require, HeaderParser, ParsedHeader, ProtocolId, IP_PROTO_SCTP, IP_PROTO_UDP};

const BASE_HEADER_BITS: usize = 320;

const NEXT_HOP_BY_HOP: u64 = 0;
const NEXT_ROUTING: u64 = 43;
const NEXT_DEST_OPTIONS: u64 = 60;

pub struct Ipv6Parser;

impl HeaderParser for Ipv6Parser {
    fn id(&self) -> ProtocolId {
        ProtocolId::Ipv6
    }

    fn parse(&self, packet: &Buffer, offset: usize) -> Result<ParsedHeader> {
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |Version| Traffic Class |           Flow Label                  |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |         Payload Length        |  Next Header  |   Hop Limit   |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |                         Source Address                        |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |                      Destination Address                      |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        require("IPv6", packet, offset, BASE_HEADER_BITS)?;
        let o = offset as isize;

        let version = packet.slice(o, o + 4)?;
        if version.value_unsigned()? != 6 {
            return Err(SchcError::Malformed {
                header: "IPv6",
                reason: format!("version mismatch: {} != 6", version.value_unsigned()?),
            });
        }
        let traffic_class = packet.slice(o + 4, o + 12)?;
        let flow_label = packet.slice(o + 12, o + 32)?;
        let payload_length = packet.slice(o + 32, o + 48)?;
        let next_header = packet.slice(o + 48, o + 56)?;
        let hop_limit = packet.slice(o + 56, o + 64)?;
        let src_address = packet.slice(o + 64, o + 192)?;
        let dst_address = packet.slice(o + 192, o + 320)?;

        let mut next = next_header.value_unsigned()?;
        let mut fields = vec![
            (FieldDescriptor::new(FieldId::Ipv6Ver, 4, 0), version),
            (FieldDescriptor::new(FieldId::Ipv6Tc, 8, 0), traffic_class),
            (FieldDescriptor::new(FieldId::Ipv6Fl, 20, 0), flow_label),
            (FieldDescriptor::new(FieldId::Ipv6Len, 16, 0), payload_length),
            (FieldDescriptor::new(FieldId::Ipv6Nxt, 8, 0), next_header),
            (FieldDescriptor::new(FieldId::Ipv6HopLmt, 8, 0), hop_limit),
            (FieldDescriptor::new(FieldId::Ipv6Src, 128, 0), src_address),
            (FieldDescriptor::new(FieldId::Ipv6Dst, 128, 0), dst_address),
        ];

        // extension headers chain via next_header; each occurrence gets its
        // own position so repeated EXT.* ids stay unambiguous
        let mut cursor = offset + BASE_HEADER_BITS;
        let mut ext_position: u8 = 1;
        while matches!(next, NEXT_HOP_BY_HOP | NEXT_ROUTING | NEXT_DEST_OPTIONS) {
            require("IPv6 extension", packet, cursor, 16)?;
            let c = cursor as isize;
            let ext_next = packet.slice(c, c + 8)?;
            let ext_len = packet.slice(c + 8, c + 16)?;

            // total extension header size is (Hdr Ext Len + 1) * 8 octets
            let total_bits = (ext_len.value_unsigned()? as usize + 1) * 64;
            require("IPv6 extension", packet, cursor, total_bits)?;
            let data = packet.slice(c + 16, c + total_bits as isize)?;

            next = ext_next.value_unsigned()?;
            fields.push((
                FieldDescriptor::new(FieldId::ExtNxt, 8, ext_position),
                ext_next,
            ));
            fields.push((
                FieldDescriptor::new(FieldId::ExtLen, 8, ext_position),
                ext_len,
            ));
            fields.push((
                FieldDescriptor::new(FieldId::ExtData, (total_bits - 16) as u16, ext_position),
                data,
            ));
            cursor += total_bits;
            ext_position += 1;
        }

        let next_protocol = match next {
            IP_PROTO_UDP => Some(ProtocolId::Udp),
            IP_PROTO_SCTP => Some(ProtocolId::Sctp),
            _ => None,
        };

        Ok(ParsedHeader {
            fields,
            bits_consumed: cursor - offset,
            next_protocol,
        })
    }
}
