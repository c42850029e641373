//! Core engine entry points
//!
//! Composes the parser, ruler, compressor and decompressor into the four
//! operations external collaborators use, plus the `compress_packet`
//! convenience that chains the forward path.
//!
//! Data flow (compression): raw packet -> parse -> packet descriptor ->
//! match_rule -> rule -> compress -> SCHC packet. Decompression reverses
//! it: SCHC packet + context -> rule lookup -> decompress -> packet
//! descriptor -> serialize to bytes.

use tracing::debug;

use crate::buffer::Buffer;
use crate::compressor;
use crate::decompressor;
use crate::error::Result;
use crate::field::{Direction, PacketDescriptor};
use crate::parser::{StackId, StackParser};
use crate::rule::{Context, RuleDescriptor, RuleNature};
use crate::ruler::Ruler;

/// Parse raw packet bytes with the given protocol stack.
pub fn parse(bytes: &[u8], stack: StackId, direction: Direction) -> Result<PacketDescriptor> {
    StackParser::new(stack).parse(bytes, direction)
}

/// Select the first rule of the context matching the packet descriptor.
pub fn match_rule<'a>(
    packet: &PacketDescriptor,
    context: &'a Context,
) -> Result<&'a RuleDescriptor> {
    Ruler::new(&context.ruleset).match_packet_descriptor(packet)
}

/// Apply a matched rule's compression actions, producing the SCHC packet.
pub fn compress(packet: &PacketDescriptor, rule: &RuleDescriptor) -> Result<Buffer> {
    compressor::compress(packet, rule)
}

/// Decompress a SCHC packet against a context.
///
/// The buffer's meaningful length must span exactly the SCHC packet: the
/// trailing payload is delimited by it. Packets compressed with the default
/// or a no-compression rule are re-parsed with the context's stack.
pub fn decompress(
    schc: &Buffer,
    context: &Context,
    direction: Direction,
) -> Result<PacketDescriptor> {
    let ruler = Ruler::new(&context.ruleset);
    let rule = ruler.match_schc_packet(schc, context.rule_id_length())?;
    if rule.nature == RuleNature::NoCompression || rule.is_default() {
        debug!(rule = %rule.id, "uncompressed SCHC packet");
        let raw = schc.slice(context.rule_id_length() as isize, schc.len() as isize)?;
        return parse(&raw.content(), context.parser_id, direction);
    }
    decompressor::decompress(schc, rule, direction)
}

/// Parse, match and compress in one call.
pub fn compress_packet(bytes: &[u8], context: &Context, direction: Direction) -> Result<Buffer> {
    let packet = parse(bytes, context.parser_id, direction)?;
    let rule = match_rule(&packet, context)?;
    compress(&packet, rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Padding;
    use crate::error::SchcError;
    use crate::field::{DirectionIndicator, FieldId};
    use crate::rule::{
        CompressionAction, MatchingOperator, RuleFieldDescriptor, TargetValue,
    };

    fn udp_rule_fields() -> Vec<RuleFieldDescriptor> {
        let equal_not_sent = |id: FieldId, length: u16, value: u64| RuleFieldDescriptor {
            id,
            length,
            position: 0,
            direction: DirectionIndicator::Bidirectional,
            target_value: Some(TargetValue::Value(Buffer::from_value(value, length as usize))),
            matching_operator: MatchingOperator::Equal,
            compression_action: CompressionAction::NotSent,
        };
        let addr = |id: FieldId, last: u8| RuleFieldDescriptor {
            id,
            length: 128,
            position: 0,
            direction: DirectionIndicator::Bidirectional,
            target_value: Some(TargetValue::Value(Buffer::new(
                &[
                    0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, last,
                ],
                128,
                Padding::Left,
            )
            .unwrap())),
            matching_operator: MatchingOperator::Equal,
            compression_action: CompressionAction::NotSent,
        };
        vec![
            equal_not_sent(FieldId::Ipv6Ver, 4, 6),
            equal_not_sent(FieldId::Ipv6Tc, 8, 0),
            equal_not_sent(FieldId::Ipv6Fl, 20, 0),
            RuleFieldDescriptor {
                id: FieldId::Ipv6Len,
                length: 16,
                position: 0,
                direction: DirectionIndicator::Bidirectional,
                target_value: None,
                matching_operator: MatchingOperator::Ignore,
                compression_action: CompressionAction::Compute,
            },
            equal_not_sent(FieldId::Ipv6Nxt, 8, 17),
            equal_not_sent(FieldId::Ipv6HopLmt, 8, 64),
            addr(FieldId::Ipv6Src, 0x03),
            addr(FieldId::Ipv6Dst, 0x20),
            equal_not_sent(FieldId::UdpSrcPort, 16, 0xd100),
            equal_not_sent(FieldId::UdpDstPort, 16, 0x1633),
            RuleFieldDescriptor {
                id: FieldId::UdpLen,
                length: 16,
                position: 0,
                direction: DirectionIndicator::Bidirectional,
                target_value: None,
                matching_operator: MatchingOperator::Ignore,
                compression_action: CompressionAction::Compute,
            },
            RuleFieldDescriptor {
                id: FieldId::UdpCksum,
                length: 16,
                position: 0,
                direction: DirectionIndicator::Bidirectional,
                target_value: None,
                matching_operator: MatchingOperator::Ignore,
                compression_action: CompressionAction::Compute,
            },
        ]
    }

    fn context() -> Context {
        Context::new(
            "test",
            "lo0",
            StackId::Ipv6Udp,
            vec![
                crate::rule::RuleDescriptor {
                    id: Buffer::from_value(0b01, 2),
                    nature: crate::rule::RuleNature::Compression,
                    field_descriptors: udp_rule_fields(),
                },
                crate::rule::RuleDescriptor {
                    id: Buffer::from_value(0b11, 2),
                    nature: crate::rule::RuleNature::NoCompression,
                    field_descriptors: vec![],
                },
            ],
        )
        .unwrap()
    }

    fn packet_bytes(payload: &[u8]) -> Vec<u8> {
        let udp_len = 8 + payload.len() as u16;
        let mut bytes = vec![0x60, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&udp_len.to_be_bytes());
        bytes.extend_from_slice(&[0x11, 0x40]);
        bytes.extend_from_slice(&[
            0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x03,
        ]);
        bytes.extend_from_slice(&[
            0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x20,
        ]);
        bytes.extend_from_slice(&[0xd1, 0x00, 0x16, 0x33]);
        bytes.extend_from_slice(&udp_len.to_be_bytes());
        // true UDP checksum for this packet, so recomputation round-trips
        bytes.extend_from_slice(&checksum_for(payload));
        bytes.extend_from_slice(payload);
        bytes
    }

    fn checksum_for(payload: &[u8]) -> [u8; 2] {
        let udp_len = 8 + payload.len() as u32;
        let mut data = Vec::new();
        data.extend_from_slice(&[
            0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x03,
        ]);
        data.extend_from_slice(&[
            0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x20,
        ]);
        data.extend_from_slice(&udp_len.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 17]);
        data.extend_from_slice(&[0xd1, 0x00, 0x16, 0x33]);
        data.extend_from_slice(&(udp_len as u16).to_be_bytes());
        data.extend_from_slice(&[0, 0]);
        data.extend_from_slice(payload);
        let mut sum: u32 = 0;
        for chunk in data.chunks(2) {
            let word = if chunk.len() == 2 {
                u16::from_be_bytes([chunk[0], chunk[1]])
            } else {
                u16::from_be_bytes([chunk[0], 0])
            };
            sum += u32::from(word);
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        let checksum = !(sum as u16);
        (if checksum == 0 { 0xffff } else { checksum }).to_be_bytes()
    }

    #[test]
    fn test_compress_packet_fully_elides_headers() {
        let context = context();
        let bytes = packet_bytes(b"\x42\x43");
        let schc = compress_packet(&bytes, &context, Direction::Up).unwrap();
        // 2 bits rule id + zero residue bits + payload
        assert_eq!(schc.len(), 2 + 16);
    }

    #[test]
    fn test_round_trip_with_computed_fields() {
        let context = context();
        let bytes = packet_bytes(b"temperature=21");
        let schc = compress_packet(&bytes, &context, Direction::Up).unwrap();
        let packet = decompress(&schc, &context, Direction::Up).unwrap();
        assert_eq!(packet.to_bytes(), bytes);
    }

    #[test]
    fn test_unmatched_packet_without_default_fails() {
        let mut context = context();
        context.ruleset.pop();
        let mut bytes = packet_bytes(b"x");
        bytes[7] = 0x3f; // hop limit differs from rule target
        let err = compress_packet(&bytes, &context, Direction::Up).unwrap_err();
        assert!(matches!(err, SchcError::NoMatchingRule));
    }

    #[test]
    fn test_unmatched_packet_falls_back_to_no_compression() {
        let context = context();
        let mut bytes = packet_bytes(b"x");
        bytes[7] = 0x3f;
        let schc = compress_packet(&bytes, &context, Direction::Up).unwrap();
        assert_eq!(schc.len(), 2 + 8 * bytes.len());

        let packet = decompress(&schc, &context, Direction::Up).unwrap();
        assert_eq!(packet.to_bytes(), bytes);
    }

    #[test]
    fn test_decompress_unknown_rule_id_fails() {
        let context = context();
        // rule id 0b00 is not in the context
        let schc = Buffer::from_value(0b00_101010, 8);
        assert!(matches!(
            decompress(&schc, &context, Direction::Up),
            Err(SchcError::NoMatchingRule)
        ));
    }
}
