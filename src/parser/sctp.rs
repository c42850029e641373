//! SCTP header parser
//!
//! Parses the SCTP common header as defined in RFC 9260 and iterates the
//! chunks that follow. Chunks are exposed through a generic raw view
//! (type / flags / length / value / padding); DATA chunks are additionally
//! split into TSN, stream identifier, stream sequence number, payload
//! protocol identifier and user data.

use crate::buffer::Buffer;
use crate::error::{Result, SchcError};
use crate::field::{FieldDescriptor, FieldId};
use crate::parser::{require, HeaderParser, ParsedHeader, ProtocolId};

const COMMON_HEADER_BITS: usize = 96;
const CHUNK_HEADER_BITS: usize = 32;
const DATA_CHUNK_FIXED_BITS: usize = 96;

const CHUNK_TYPE_DATA: u64 = 0;

pub struct SctpParser;

impl HeaderParser for SctpParser {
    fn id(&self) -> ProtocolId {
        ProtocolId::Sctp
    }

    fn parse(&self, packet: &Buffer, offset: usize) -> Result<ParsedHeader> {
        //  0                   1                   2                   3
        //  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |     Source Port Number        |     Destination Port Number   |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |                      Verification Tag                         |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |                           Checksum                            |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |                        Chunk #1 ... #n                        |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        require("SCTP", packet, offset, COMMON_HEADER_BITS)?;
        let o = offset as isize;

        let mut fields = vec![
            (
                FieldDescriptor::new(FieldId::SctpSrcPort, 16, 0),
                packet.slice(o, o + 16)?,
            ),
            (
                FieldDescriptor::new(FieldId::SctpDstPort, 16, 0),
                packet.slice(o + 16, o + 32)?,
            ),
            (
                FieldDescriptor::new(FieldId::SctpVerTag, 32, 0),
                packet.slice(o + 32, o + 64)?,
            ),
            (
                FieldDescriptor::new(FieldId::SctpCksum, 32, 0),
                packet.slice(o + 64, o + 96)?,
            ),
        ];

        let mut cursor = offset + COMMON_HEADER_BITS;
        let mut position: u8 = 0;
        while cursor < packet.len() {
            position += 1;
            cursor += parse_chunk(packet, cursor, position, &mut fields)?;
        }

        // chunks consume the remainder of the packet
        Ok(ParsedHeader {
            fields,
            bits_consumed: cursor - offset,
            next_protocol: None,
        })
    }
}

fn parse_chunk(
    packet: &Buffer,
    offset: usize,
    position: u8,
    fields: &mut Vec<(FieldDescriptor, Buffer)>,
) -> Result<usize> {
    require("SCTP chunk", packet, offset, CHUNK_HEADER_BITS)?;
    let o = offset as isize;

    let chunk_type = packet.slice(o, o + 8)?;
    let chunk_flags = packet.slice(o + 8, o + 16)?;
    let chunk_length = packet.slice(o + 16, o + 32)?;

    // chunk length counts the 4 header octets and excludes padding
    let length_bits = chunk_length.value_unsigned()? as usize * 8;
    if length_bits < CHUNK_HEADER_BITS {
        return Err(SchcError::Malformed {
            header: "SCTP chunk",
            reason: format!("chunk length {} below minimum 4", length_bits / 8),
        });
    }
    require("SCTP chunk", packet, offset, length_bits)?;

    let type_value = chunk_type.value_unsigned()?;
    fields.push((
        FieldDescriptor::new(FieldId::SctpChunkType, 8, position),
        chunk_type,
    ));
    fields.push((
        FieldDescriptor::new(FieldId::SctpChunkFlags, 8, position),
        chunk_flags,
    ));
    fields.push((
        FieldDescriptor::new(FieldId::SctpChunkLen, 16, position),
        chunk_length,
    ));

    let value_bits = length_bits - CHUNK_HEADER_BITS;
    if value_bits > 0 {
        let value = packet.slice(o + 32, o + 32 + value_bits as isize)?;
        if type_value == CHUNK_TYPE_DATA {
            parse_data_chunk(&value, position, fields)?;
        } else {
            fields.push((
                FieldDescriptor::new(FieldId::SctpChunkValue, value_bits as u16, position),
                value,
            ));
        }
    }

    let padding_bits = (32 - length_bits % 32) % 32;
    let mut consumed = length_bits;
    if padding_bits > 0 && offset + length_bits + padding_bits <= packet.len() {
        let padding = packet.slice(
            o + length_bits as isize,
            o + (length_bits + padding_bits) as isize,
        )?;
        fields.push((
            FieldDescriptor::new(FieldId::SctpChunkPadding, padding_bits as u16, position),
            padding,
        ));
        consumed += padding_bits;
    }
    Ok(consumed)
}

fn parse_data_chunk(
    value: &Buffer,
    position: u8,
    fields: &mut Vec<(FieldDescriptor, Buffer)>,
) -> Result<()> {
    if value.len() < DATA_CHUNK_FIXED_BITS {
        return Err(SchcError::Malformed {
            header: "SCTP chunk",
            reason: format!(
                "DATA chunk value too short: {} bits < {DATA_CHUNK_FIXED_BITS}",
                value.len()
            ),
        });
    }
    let user_data_bits = value.len() - DATA_CHUNK_FIXED_BITS;
    fields.push((
        FieldDescriptor::new(FieldId::SctpDataTsn, 32, position),
        value.slice(0, 32)?,
    ));
    fields.push((
        FieldDescriptor::new(FieldId::SctpDataStreamId, 16, position),
        value.slice(32, 48)?,
    ));
    fields.push((
        FieldDescriptor::new(FieldId::SctpDataStreamSeq, 16, position),
        value.slice(48, 64)?,
    ));
    fields.push((
        FieldDescriptor::new(FieldId::SctpDataPpid, 32, position),
        value.slice(64, 96)?,
    ));
    if user_data_bits > 0 {
        fields.push((
            FieldDescriptor::new(FieldId::SctpDataPayload, user_data_bits as u16, position),
            value.slice(96, value.len() as isize)?,
        ));
    }
    Ok(())
}
