//! IPv4 header parser
//!
//! Parses the IPv4 header as defined in RFC 791. Options are not parsed; a
//! header with IHL > 5 is reported as malformed.

use crate::buffer::Buffer;
use crate::error::{Result, SchcError};
use crate::field::{FieldDescriptor, FieldId};
use crate::parser::{require, HeaderParser, ParsedHeader, ProtocolId, IP_PROTO_SCTP, IP_PROTO_UDP};

const HEADER_BITS: usize = 160;

pub struct Ipv4Parser;

impl HeaderParser for Ipv4Parser {
    fn id(&self) -> ProtocolId {
        ProtocolId::Ipv4
    }

    fn parse(&self, packet: &Buffer, offset: usize) -> Result<ParsedHeader> {
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |Version|  IHL  |Type of Service|          Total Length         |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |         Identification        |Flags|      Fragment Offset    |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |  Time to Live |    Protocol   |         Header Checksum       |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |                       Source Address                          |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |                    Destination Address                        |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        require("IPv4", packet, offset, HEADER_BITS)?;
        let o = offset as isize;

        let version = packet.slice(o, o + 4)?;
        if version.value_unsigned()? != 4 {
            return Err(SchcError::Malformed {
                header: "IPv4",
                reason: format!("version mismatch: {} != 4", version.value_unsigned()?),
            });
        }
        let header_length = packet.slice(o + 4, o + 8)?;
        let ihl = header_length.value_unsigned()?;
        if ihl != 5 {
            return Err(SchcError::Malformed {
                header: "IPv4",
                reason: format!("unsupported IHL {ihl}: options are not parsed"),
            });
        }
        let type_of_service = packet.slice(o + 8, o + 16)?;
        let total_length = packet.slice(o + 16, o + 32)?;
        let identification = packet.slice(o + 32, o + 48)?;
        let flags = packet.slice(o + 48, o + 51)?;
        let fragment_offset = packet.slice(o + 51, o + 64)?;
        let time_to_live = packet.slice(o + 64, o + 72)?;
        let protocol = packet.slice(o + 72, o + 80)?;
        let header_checksum = packet.slice(o + 80, o + 96)?;
        let src_address = packet.slice(o + 96, o + 128)?;
        let dst_address = packet.slice(o + 128, o + 160)?;

        let next_protocol = match protocol.value_unsigned()? {
            IP_PROTO_UDP => Some(ProtocolId::Udp),
            IP_PROTO_SCTP => Some(ProtocolId::Sctp),
            _ => None,
        };

        Ok(ParsedHeader {
            fields: vec![
                (FieldDescriptor::new(FieldId::Ipv4Ver, 4, 0), version),
                (FieldDescriptor::new(FieldId::Ipv4Ihl, 4, 0), header_length),
                (FieldDescriptor::new(FieldId::Ipv4Tos, 8, 0), type_of_service),
                (FieldDescriptor::new(FieldId::Ipv4Len, 16, 0), total_length),
                (FieldDescriptor::new(FieldId::Ipv4Id, 16, 0), identification),
                (FieldDescriptor::new(FieldId::Ipv4Flags, 3, 0), flags),
                (FieldDescriptor::new(FieldId::Ipv4FragOff, 13, 0), fragment_offset),
                (FieldDescriptor::new(FieldId::Ipv4Ttl, 8, 0), time_to_live),
                (FieldDescriptor::new(FieldId::Ipv4Proto, 8, 0), protocol),
                (FieldDescriptor::new(FieldId::Ipv4Chksum, 16, 0), header_checksum),
                (FieldDescriptor::new(FieldId::Ipv4Src, 32, 0), src_address),
                (FieldDescriptor::new(FieldId::Ipv4Dst, 32, 0), dst_address),
            ],
            bits_consumed: HEADER_BITS,
            next_protocol,
        })
    }
}
