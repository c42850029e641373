//! End-to-end compression round trips
//!
//! These tests drive the full parse-match-compress-decompress pipeline with
//! real packet data, including the IPv6/UDP/CoAP reference capture used by
//! the original microschc test suite.

use schc_core::{
    compress_packet, decompress, parse, Buffer, CompressionAction, Context, Direction,
    DirectionIndicator, FieldId, MatchingOperator, Padding, RuleDescriptor, RuleFieldDescriptor,
    RuleNature, StackId, TargetValue,
};

/// 144-byte IPv6/UDP/CoAP observation: SenML report over CoAP, token length
/// 8, one option, 81-byte payload.
const REFERENCE_PACKET: [u8; 144] = [
    0x60, 0x00, 0xef, 0x2d, 0x00, 0x68, 0x11, 0x40, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0xd1, 0x00, 0x16, 0x33, 0x00,
    0x68, 0x5c, 0x21, 0x68, 0x45, 0x22, 0xf6, 0xb8, 0x30, 0x0e, 0xfe, 0xe6, 0x62, 0x91, 0x22,
    0xc1, 0x6e, 0xff, 0x5b, 0x7b, 0x22, 0x62, 0x6e, 0x22, 0x3a, 0x22, 0x2f, 0x36, 0x2f, 0x22,
    0x2c, 0x22, 0x6e, 0x22, 0x3a, 0x22, 0x30, 0x2f, 0x30, 0x22, 0x2c, 0x22, 0x76, 0x22, 0x3a,
    0x35, 0x34, 0x2e, 0x30, 0x7d, 0x2c, 0x7b, 0x22, 0x6e, 0x22, 0x3a, 0x22, 0x30, 0x2f, 0x31,
    0x22, 0x2c, 0x22, 0x76, 0x22, 0x3a, 0x34, 0x38, 0x2e, 0x30, 0x7d, 0x2c, 0x7b, 0x22, 0x6e,
    0x22, 0x3a, 0x22, 0x30, 0x2f, 0x35, 0x22, 0x2c, 0x22, 0x76, 0x22, 0x3a, 0x31, 0x36, 0x36,
    0x36, 0x32, 0x36, 0x33, 0x33, 0x33, 0x39, 0x7d, 0x5d,
];

fn field(
    id: FieldId,
    length: u16,
    direction: DirectionIndicator,
    target: Option<TargetValue>,
    mo: MatchingOperator,
    cda: CompressionAction,
) -> RuleFieldDescriptor {
    RuleFieldDescriptor {
        id,
        length,
        position: 0,
        direction,
        target_value: target,
        matching_operator: mo,
        compression_action: cda,
    }
}

fn value(content: &[u8], length: usize) -> Option<TargetValue> {
    Some(TargetValue::Value(
        Buffer::new(content, length, Padding::Left).unwrap(),
    ))
}

fn ignore_value_sent(id: FieldId, length: u16) -> RuleFieldDescriptor {
    field(
        id,
        length,
        DirectionIndicator::Bidirectional,
        None,
        MatchingOperator::Ignore,
        CompressionAction::ValueSent,
    )
}

/// The microschc reference rule: fully specified CoAP observation with an
/// MSB-compressed source address and a destination mapping.
fn reference_rule() -> RuleDescriptor {
    use CompressionAction::*;
    use DirectionIndicator::*;
    use MatchingOperator::*;

    let src_prefix = [
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];
    let dst = [
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x20,
    ];
    RuleDescriptor {
        id: Buffer::from_value(0b11, 2),
        nature: RuleNature::Compression,
        field_descriptors: vec![
            field(FieldId::Ipv6Ver, 4, Bidirectional, value(&[0x06], 4), Equal, NotSent),
            field(FieldId::Ipv6Tc, 8, Bidirectional, value(&[0x00], 8), Equal, NotSent),
            field(FieldId::Ipv6Fl, 20, Up, value(&[0x00, 0xef, 0x2d], 20), Equal, NotSent),
            ignore_value_sent(FieldId::Ipv6Len, 16),
            field(FieldId::Ipv6Nxt, 8, Bidirectional, value(&[0x11], 8), Equal, NotSent),
            field(FieldId::Ipv6HopLmt, 8, Bidirectional, value(&[0x40], 8), Equal, NotSent),
            field(FieldId::Ipv6Src, 128, Up, value(&src_prefix, 120), Msb(120), Lsb),
            field(
                FieldId::Ipv6Dst,
                128,
                Bidirectional,
                Some(TargetValue::Mapping(vec![
                    Buffer::new(&dst, 128, Padding::Left).unwrap()
                ])),
                MatchMapping,
                MappingSent,
            ),
            field(FieldId::UdpSrcPort, 16, Up, value(&[0xd1, 0x00], 16), Equal, NotSent),
            field(FieldId::UdpDstPort, 16, Up, value(&[0x16, 0x33], 16), Equal, NotSent),
            ignore_value_sent(FieldId::UdpLen, 16),
            ignore_value_sent(FieldId::UdpCksum, 16),
            field(FieldId::CoapVer, 2, Bidirectional, value(&[0x01], 2), Equal, NotSent),
            field(FieldId::CoapType, 2, Bidirectional, value(&[0x02], 2), Equal, NotSent),
            ignore_value_sent(FieldId::CoapTkl, 4),
            ignore_value_sent(FieldId::CoapCode, 8),
            ignore_value_sent(FieldId::CoapMid, 16),
            ignore_value_sent(FieldId::CoapToken, 0),
            field(FieldId::CoapOptDelta, 4, Up, value(&[0x0c], 4), Equal, NotSent),
            ignore_value_sent(FieldId::CoapOptLen, 4),
            ignore_value_sent(FieldId::CoapOptValue, 0),
            field(FieldId::CoapPayloadMarker, 8, Up, value(&[0xff], 8), Equal, NotSent),
        ],
    }
}

fn reference_context() -> Context {
    Context::new(
        "reference",
        "lpwan0",
        StackId::Ipv6UdpCoap,
        vec![
            reference_rule(),
            RuleDescriptor {
                id: Buffer::from_value(0b00, 2),
                nature: RuleNature::NoCompression,
                field_descriptors: vec![],
            },
        ],
    )
    .unwrap()
}

#[test]
fn reference_packet_parses_into_expected_fields() {
    let packet = parse(&REFERENCE_PACKET, StackId::Ipv6UdpCoap, Direction::Up).unwrap();
    let ids: Vec<FieldId> = packet.fields.iter().map(|(fd, _)| fd.id).collect();
    assert_eq!(
        ids,
        vec![
            FieldId::Ipv6Ver,
            FieldId::Ipv6Tc,
            FieldId::Ipv6Fl,
            FieldId::Ipv6Len,
            FieldId::Ipv6Nxt,
            FieldId::Ipv6HopLmt,
            FieldId::Ipv6Src,
            FieldId::Ipv6Dst,
            FieldId::UdpSrcPort,
            FieldId::UdpDstPort,
            FieldId::UdpLen,
            FieldId::UdpCksum,
            FieldId::CoapVer,
            FieldId::CoapType,
            FieldId::CoapTkl,
            FieldId::CoapCode,
            FieldId::CoapMid,
            FieldId::CoapToken,
            FieldId::CoapOptDelta,
            FieldId::CoapOptLen,
            FieldId::CoapOptValue,
            FieldId::CoapPayloadMarker,
        ]
    );
    assert_eq!(packet.payload.len(), 81 * 8);
    // parser idempotence: reserializing reproduces the capture
    assert_eq!(packet.to_bytes(), REFERENCE_PACKET.to_vec());
}

#[test]
fn reference_packet_round_trips() {
    let context = reference_context();
    let schc = compress_packet(&REFERENCE_PACKET, &context, Direction::Up).unwrap();

    // rule id 2 + IPv6 len 16 + src LSB 8 + UDP len/cksum 32 + TKL 4
    // + code 8 + mid 16 + token 4+64 + opt len 4 + opt value 4+8 = 170 bits
    // of header, then the 648-bit payload
    assert_eq!(schc.len(), 170 + 81 * 8);
    assert_eq!(
        schc.slice(0, 2).unwrap(),
        Buffer::from_value(0b11, 2)
    );

    let packet = decompress(&schc, &context, Direction::Up).unwrap();
    assert_eq!(packet.to_bytes(), REFERENCE_PACKET.to_vec());
}

#[test]
fn reference_packet_header_shrinks_below_a_quarter() {
    let context = reference_context();
    let schc = compress_packet(&REFERENCE_PACKET, &context, Direction::Up).unwrap();
    let header_bits = schc.len() - 81 * 8;
    assert!(header_bits * 4 < 48 * 8, "header still {header_bits} bits");
}

// =============================================================================
// Fully-specified 60-byte packet
// =============================================================================

fn small_packet() -> Vec<u8> {
    let payload = b"hello";
    let udp_len = (8 + 7 + payload.len()) as u16; // UDP header + CoAP + payload
    let mut bytes = vec![0x60, 0x00, 0x00, 0x00];
    bytes.extend_from_slice(&udp_len.to_be_bytes());
    bytes.extend_from_slice(&[0x11, 0x40]);
    bytes.extend_from_slice(&SRC);
    bytes.extend_from_slice(&DST);
    bytes.extend_from_slice(&[0xd1, 0x00, 0x16, 0x33]);
    bytes.extend_from_slice(&udp_len.to_be_bytes());
    bytes.extend_from_slice(&udp_checksum(udp_len, payload));
    bytes.extend_from_slice(&[0x62, 0x45, 0x22, 0xf6, 0xbe, 0xef, 0xff]);
    bytes.extend_from_slice(payload);
    bytes
}

const SRC: [u8; 16] = [
    0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x03,
];
const DST: [u8; 16] = [
    0x20, 0x01, 0x0d, 0xb8, 0x00, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x20,
];

fn udp_checksum(udp_len: u16, payload: &[u8]) -> [u8; 2] {
    let mut data = Vec::new();
    data.extend_from_slice(&SRC);
    data.extend_from_slice(&DST);
    data.extend_from_slice(&u32::from(udp_len).to_be_bytes());
    data.extend_from_slice(&[0, 0, 0, 17]);
    data.extend_from_slice(&[0xd1, 0x00, 0x16, 0x33]);
    data.extend_from_slice(&udp_len.to_be_bytes());
    data.extend_from_slice(&[0, 0]); // checksum zeroed
    data.extend_from_slice(&[0x62, 0x45, 0x22, 0xf6, 0xbe, 0xef, 0xff]);
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

/// Every field pinned by the rule; lengths and checksum recomputed. Only
/// the source address LSB travels.
fn small_rule() -> RuleDescriptor {
    use CompressionAction::*;
    use DirectionIndicator::*;
    use MatchingOperator::*;

    let compute = |id: FieldId| {
        field(id, 16, Bidirectional, None, Ignore, Compute)
    };
    RuleDescriptor {
        id: Buffer::from_value(0b101, 3),
        nature: RuleNature::Compression,
        field_descriptors: vec![
            field(FieldId::Ipv6Ver, 4, Bidirectional, value(&[0x06], 4), Equal, NotSent),
            field(FieldId::Ipv6Tc, 8, Bidirectional, value(&[0x00], 8), Equal, NotSent),
            field(FieldId::Ipv6Fl, 20, Bidirectional, value(&[0x00, 0x00, 0x00], 20), Equal, NotSent),
            compute(FieldId::Ipv6Len),
            field(FieldId::Ipv6Nxt, 8, Bidirectional, value(&[0x11], 8), Equal, NotSent),
            field(FieldId::Ipv6HopLmt, 8, Bidirectional, value(&[0x40], 8), Equal, NotSent),
            field(FieldId::Ipv6Src, 128, Bidirectional, value(&SRC, 128), Msb(120), Lsb),
            field(FieldId::Ipv6Dst, 128, Bidirectional, value(&DST, 128), Equal, NotSent),
            field(FieldId::UdpSrcPort, 16, Bidirectional, value(&[0xd1, 0x00], 16), Equal, NotSent),
            field(FieldId::UdpDstPort, 16, Bidirectional, value(&[0x16, 0x33], 16), Equal, NotSent),
            compute(FieldId::UdpLen),
            compute(FieldId::UdpCksum),
            field(FieldId::CoapVer, 2, Bidirectional, value(&[0x01], 2), Equal, NotSent),
            field(FieldId::CoapType, 2, Bidirectional, value(&[0x02], 2), Equal, NotSent),
            field(FieldId::CoapTkl, 4, Bidirectional, value(&[0x02], 4), Equal, NotSent),
            field(FieldId::CoapCode, 8, Bidirectional, value(&[0x45], 8), Equal, NotSent),
            field(FieldId::CoapMid, 16, Bidirectional, value(&[0x22, 0xf6], 16), Equal, NotSent),
            field(FieldId::CoapToken, 16, Bidirectional, value(&[0xbe, 0xef], 16), Equal, NotSent),
            field(FieldId::CoapPayloadMarker, 8, Bidirectional, value(&[0xff], 8), Equal, NotSent),
        ],
    }
}

#[test]
fn fully_specified_rule_compresses_to_a_few_residue_bits() {
    let bytes = small_packet();
    assert_eq!(bytes.len(), 60);

    let context = Context::new(
        "small",
        "lpwan0",
        StackId::Ipv6UdpCoap,
        vec![small_rule()],
    )
    .unwrap();

    let schc = compress_packet(&bytes, &context, Direction::Up).unwrap();
    // 3-bit rule id, 8 residue bits (source address LSB), then payload
    let residue_bits = schc.len() - 3 - 5 * 8;
    assert!(residue_bits <= 16, "residue is {residue_bits} bits");
    assert_eq!(schc.len(), 3 + 8 + 40);

    let packet = decompress(&schc, &context, Direction::Up).unwrap();
    assert_eq!(packet.to_bytes(), bytes);
}

#[test]
fn down_direction_filters_up_only_fields() {
    // the reference rule pins several fields to UP; a DOWN packet with a
    // different shape cannot take it and lands on the default rule
    let context = reference_context();
    let packet = parse(&REFERENCE_PACKET, StackId::Ipv6UdpCoap, Direction::Down).unwrap();
    let rule = schc_core::match_rule(&packet, &context).unwrap();
    assert!(rule.is_default());
}

#[test]
fn context_survives_json_round_trip_and_still_compresses() {
    let context = reference_context();
    let json = context.to_json().unwrap();
    let reloaded = Context::from_json(&json).unwrap();
    assert_eq!(context, reloaded);

    let schc = compress_packet(&REFERENCE_PACKET, &reloaded, Direction::Up).unwrap();
    let packet = decompress(&schc, &reloaded, Direction::Up).unwrap();
    assert_eq!(packet.to_bytes(), REFERENCE_PACKET.to_vec());
}
