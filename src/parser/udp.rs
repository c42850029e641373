//! UDP header parser
//!
//! Parses the UDP header as defined in RFC 768.

use crate::buffer::Buffer;
use crate::error::Result;
use crate::field::{FieldDescriptor, FieldId};
use crate::parser::{require, HeaderParser, ParsedHeader, ProtocolId, COAP_PORT};

const HEADER_BITS: usize = 64;

pub struct UdpParser;

impl HeaderParser for UdpParser {
    fn id(&self) -> ProtocolId {
        ProtocolId::Udp
    }

    fn parse(&self, packet: &Buffer, offset: usize) -> Result<ParsedHeader> {
        //  0      7 8     15 16    23 24    31
        // +--------+--------+--------+--------+
        // |     Source      |   Destination   |
        // |      Port       |      Port       |
        // +--------+--------+--------+--------+
        // |     Length      |    Checksum     |
        // +--------+--------+--------+--------+
        require("UDP", packet, offset, HEADER_BITS)?;
        let o = offset as isize;

        let source_port = packet.slice(o, o + 16)?;
        let destination_port = packet.slice(o + 16, o + 32)?;
        let length = packet.slice(o + 32, o + 48)?;
        let checksum = packet.slice(o + 48, o + 64)?;

        let src = source_port.value_unsigned()?;
        let dst = destination_port.value_unsigned()?;
        let next_protocol = (src == COAP_PORT || dst == COAP_PORT).then_some(ProtocolId::Coap);

        Ok(ParsedHeader {
            fields: vec![
                (FieldDescriptor::new(FieldId::UdpSrcPort, 16, 0), source_port),
                (FieldDescriptor::new(FieldId::UdpDstPort, 16, 0), destination_port),
                (FieldDescriptor::new(FieldId::UdpLen, 16, 0), length),
                (FieldDescriptor::new(FieldId::UdpCksum, 16, 0), checksum),
            ],
            bits_consumed: HEADER_BITS,
            next_protocol,
        })
    }
}
