//! CoAP header parser
//!
//! Parses the CoAP header as defined in RFC 7252. Options are split at the
//! syntactic level only: option delta, option length, their extended forms
//! and the option value are exposed as raw fields, without computing
//! absolute option numbers. Options inside a CoAP packet are not expected
//! to vary much for a device, so access to option semantics is not needed,
//! and the serializer can regenerate exactly what the parser yields.

use crate::buffer::Buffer;
use crate::error::{Result, SchcError};
use crate::field::{FieldDescriptor, FieldId};
use crate::parser::{require, HeaderParser, ParsedHeader, ProtocolId};

const BASE_HEADER_BITS: usize = 32;
const PAYLOAD_MARKER: u64 = 0xff;

const EXTENDED_8BITS: u64 = 13;
const EXTENDED_16BITS: u64 = 14;
const RESERVED: u64 = 15;

pub struct CoapParser;

impl HeaderParser for CoapParser {
    fn id(&self) -> ProtocolId {
        ProtocolId::Coap
    }

    fn parse(&self, packet: &Buffer, offset: usize) -> Result<ParsedHeader> {
        //  0                   1                   2                   3
        //  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |Ver| T |  TKL  |      Code     |          Message ID           |
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |   Token (if any, TKL bytes) ...
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |   Options (if any) ...
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |1 1 1 1 1 1 1 1|    Payload (if any) ...
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        require("CoAP", packet, offset, BASE_HEADER_BITS)?;
        let o = offset as isize;

        let version = packet.slice(o, o + 2)?;
        let msg_type = packet.slice(o + 2, o + 4)?;
        let token_length = packet.slice(o + 4, o + 8)?;
        let code = packet.slice(o + 8, o + 16)?;
        let message_id = packet.slice(o + 16, o + 32)?;

        let tkl = token_length.value_unsigned()? as usize;
        if tkl > 8 {
            return Err(SchcError::Malformed {
                header: "CoAP",
                reason: format!("reserved token length {tkl}"),
            });
        }

        let mut fields = vec![
            (FieldDescriptor::new(FieldId::CoapVer, 2, 0), version),
            (FieldDescriptor::new(FieldId::CoapType, 2, 0), msg_type),
            (FieldDescriptor::new(FieldId::CoapTkl, 4, 0), token_length),
            (FieldDescriptor::new(FieldId::CoapCode, 8, 0), code),
            (FieldDescriptor::new(FieldId::CoapMid, 16, 0), message_id),
        ];

        let mut cursor = offset + BASE_HEADER_BITS;
        if tkl > 0 {
            require("CoAP", packet, cursor, tkl * 8)?;
            let token = packet.slice(cursor as isize, (cursor + tkl * 8) as isize)?;
            fields.push((
                FieldDescriptor::new(FieldId::CoapToken, (tkl * 8) as u16, 0),
                token,
            ));
            cursor += tkl * 8;
        }

        // options follow until end of message or the 0xFF payload marker
        let mut position: u8 = 0;
        while cursor < packet.len() {
            let c = cursor as isize;
            require("CoAP option", packet, cursor, 8)?;
            let first = packet.slice(c, c + 8)?;
            if first.value_unsigned()? == PAYLOAD_MARKER {
                fields.push((FieldDescriptor::new(FieldId::CoapPayloadMarker, 8, 0), first));
                cursor += 8;
                break;
            }

            position += 1;
            let delta = packet.slice(c, c + 4)?;
            let length = packet.slice(c + 4, c + 8)?;
            let delta_value = delta.value_unsigned()?;
            let length_value = length.value_unsigned()?;
            if delta_value == RESERVED || length_value == RESERVED {
                return Err(SchcError::Malformed {
                    header: "CoAP",
                    reason: format!("reserved option nibble in option {position}"),
                });
            }
            fields.push((FieldDescriptor::new(FieldId::CoapOptDelta, 4, position), delta));
            fields.push((FieldDescriptor::new(FieldId::CoapOptLen, 4, position), length));
            cursor += 8;

            if delta_value == EXTENDED_8BITS || delta_value == EXTENDED_16BITS {
                let ext_bits = if delta_value == EXTENDED_8BITS { 8 } else { 16 };
                require("CoAP option", packet, cursor, ext_bits)?;
                let ext = packet.slice(cursor as isize, (cursor + ext_bits) as isize)?;
                fields.push((
                    FieldDescriptor::new(FieldId::CoapOptDeltaExt, ext_bits as u16, position),
                    ext,
                ));
                cursor += ext_bits;
            }

            let mut value_bytes = length_value as usize;
            if length_value == EXTENDED_8BITS || length_value == EXTENDED_16BITS {
                let ext_bits = if length_value == EXTENDED_8BITS { 8 } else { 16 };
                require("CoAP option", packet, cursor, ext_bits)?;
                let ext = packet.slice(cursor as isize, (cursor + ext_bits) as isize)?;
                value_bytes += ext.value_unsigned()? as usize;
                fields.push((
                    FieldDescriptor::new(FieldId::CoapOptLenExt, ext_bits as u16, position),
                    ext,
                ));
                cursor += ext_bits;
            }

            if value_bytes > 0 {
                require("CoAP option", packet, cursor, value_bytes * 8)?;
                let value = packet.slice(cursor as isize, (cursor + value_bytes * 8) as isize)?;
                fields.push((
                    FieldDescriptor::new(FieldId::CoapOptValue, (value_bytes * 8) as u16, position),
                    value,
                ));
                cursor += value_bytes * 8;
            }
        }

        Ok(ParsedHeader {
            fields,
            bits_consumed: cursor - offset,
            next_protocol: None,
        })
    }
}
