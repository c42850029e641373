//! Computed field reconstruction
//!
//! `compute` fields carry nothing on the wire; the decompressor re-derives
//! them once every other field is known. Supported fields: IPv6 payload
//! length, IPv4 total length, IPv4 header checksum, UDP length and UDP
//! checksum (RFC 768 / RFC 2460 pseudo-header; a computed zero UDP checksum
//! is transmitted as 0xFFFF).
//!
//! Lengths are computed before checksums, innermost header first, so each
//! checksum sees final length values.

use crate::buffer::{Buffer, Padding};
use crate::error::{Result, SchcError};
use crate::field::{FieldDescriptor, FieldId};

/// A deferred compute action recorded by the decompressor: which field, at
/// which position of the reconstructed field list.
#[derive(Debug, Clone, Copy)]
pub struct ComputeEntry {
    pub position: usize,
    pub id: FieldId,
}

/// Whether a compute function exists for `id`.
pub fn supports(id: FieldId) -> bool {
    matches!(
        id,
        FieldId::Ipv6Len
            | FieldId::Ipv4Len
            | FieldId::Ipv4Chksum
            | FieldId::UdpLen
            | FieldId::UdpCksum
    )
}

/// Fill in all deferred fields of a reconstructed packet.
pub fn run_post_pass(
    fields: &mut [(FieldDescriptor, Buffer)],
    payload: &Buffer,
    entries: &[ComputeEntry],
) -> Result<()> {
    let mut ordered: Vec<&ComputeEntry> = entries.iter().collect();
    ordered.sort_by_key(|entry| (is_checksum(entry.id), std::cmp::Reverse(entry.position)));

    for entry in ordered {
        let value = match entry.id {
            FieldId::Ipv6Len => ipv6_payload_length(fields, payload, entry.position),
            FieldId::Ipv4Len => ipv4_total_length(fields, payload, entry.position)?,
            FieldId::Ipv4Chksum => ipv4_header_checksum(fields, entry.position)?,
            FieldId::UdpLen => udp_length(fields, payload, entry.position)?,
            FieldId::UdpCksum => udp_checksum(fields, payload, entry.position)?,
            other => {
                return Err(SchcError::RuleValidation(format!(
                    "no compute function for field {other}"
                )))
            }
        };
        fields[entry.position].0.length = value.len() as u16;
        fields[entry.position].1 = value;
    }
    Ok(())
}

fn is_checksum(id: FieldId) -> bool {
    matches!(id, FieldId::Ipv4Chksum | FieldId::UdpCksum)
}

/// Index of the first field of the header containing `position`, located by
/// walking back to the nearest occurrence of the header's leading field.
fn header_start(
    fields: &[(FieldDescriptor, Buffer)],
    position: usize,
    leading: FieldId,
) -> Result<usize> {
    fields[..=position]
        .iter()
        .rposition(|(descriptor, _)| descriptor.id == leading)
        .ok_or_else(|| {
            SchcError::RuleValidation(format!(
                "computed field at position {position} has no enclosing {leading} header"
            ))
        })
}

fn bits_from(fields: &[(FieldDescriptor, Buffer)], start: usize, payload: &Buffer) -> usize {
    fields[start..]
        .iter()
        .map(|(_, value)| value.len())
        .sum::<usize>()
        + payload.len()
}

/// IPv6 payload length: everything after the 40-byte base header. The four
/// base-header fields following the length field (next header, hop limit,
/// source and destination address) are skipped.
fn ipv6_payload_length(
    fields: &[(FieldDescriptor, Buffer)],
    payload: &Buffer,
    position: usize,
) -> Buffer {
    let start = (position + 5).min(fields.len());
    let bytes = bits_from(fields, start, payload).div_ceil(8);
    Buffer::from_value(bytes as u64, 16)
}

/// IPv4 total length: the IPv4 header and everything after it.
fn ipv4_total_length(
    fields: &[(FieldDescriptor, Buffer)],
    payload: &Buffer,
    position: usize,
) -> Result<Buffer> {
    let start = header_start(fields, position, FieldId::Ipv4Ver)?;
    let bytes = bits_from(fields, start, payload).div_ceil(8);
    Ok(Buffer::from_value(bytes as u64, 16))
}

/// UDP length: the UDP header and everything after it.
fn udp_length(
    fields: &[(FieldDescriptor, Buffer)],
    payload: &Buffer,
    position: usize,
) -> Result<Buffer> {
    let start = header_start(fields, position, FieldId::UdpSrcPort)?;
    let bytes = bits_from(fields, start, payload).div_ceil(8);
    Ok(Buffer::from_value(bytes as u64, 16))
}

/// IPv4 header checksum over the 20-byte header with the checksum field
/// zeroed (RFC 1071).
fn ipv4_header_checksum(fields: &[(FieldDescriptor, Buffer)], position: usize) -> Result<Buffer> {
    let start = header_start(fields, position, FieldId::Ipv4Ver)?;
    let mut header = Buffer::empty(Padding::Right);
    for (index, (descriptor, value)) in fields[start..].iter().enumerate() {
        if descriptor.id.protocol() != crate::parser::ProtocolId::Ipv4 {
            break;
        }
        if start + index == position {
            header = header.concat(&Buffer::zeros(value.len(), Padding::Left));
        } else {
            header = header.concat(value);
        }
    }
    Ok(Buffer::from_value(
        internet_checksum(&header.content()) as u64,
        16,
    ))
}

/// UDP checksum over the pseudo-header and the UDP segment, with the
/// checksum field zeroed. A computed zero is transmitted as all ones.
fn udp_checksum(
    fields: &[(FieldDescriptor, Buffer)],
    payload: &Buffer,
    position: usize,
) -> Result<Buffer> {
    let start = header_start(fields, position, FieldId::UdpSrcPort)?;
    let mut segment = Buffer::empty(Padding::Right);
    for (index, (_, value)) in fields[start..].iter().enumerate() {
        if start + index == position {
            segment = segment.concat(&Buffer::zeros(value.len(), Padding::Left));
        } else {
            segment = segment.concat(value);
        }
    }
    segment = segment.concat(payload);
    let segment_bytes = segment.content();

    let mut data = pseudo_header(fields, position, segment_bytes.len())?;
    data.extend_from_slice(&segment_bytes);
    let checksum = match internet_checksum(&data) {
        0 => 0xffff,
        value => value,
    };
    Ok(Buffer::from_value(checksum as u64, 16))
}

/// IPv4 or IPv6 pseudo-header for the UDP checksum, built from the nearest
/// preceding address fields.
fn pseudo_header(
    fields: &[(FieldDescriptor, Buffer)],
    position: usize,
    udp_length: usize,
) -> Result<Vec<u8>> {
    let find = |id: FieldId| {
        fields[..position]
            .iter()
            .rev()
            .find(|(descriptor, _)| descriptor.id == id)
            .map(|(_, value)| value.content())
    };

    let mut data = Vec::with_capacity(40);
    if let (Some(src), Some(dst)) = (find(FieldId::Ipv6Src), find(FieldId::Ipv6Dst)) {
        data.extend_from_slice(&src);
        data.extend_from_slice(&dst);
        data.extend_from_slice(&(udp_length as u32).to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, crate::parser::IP_PROTO_UDP as u8]);
    } else if let (Some(src), Some(dst)) = (find(FieldId::Ipv4Src), find(FieldId::Ipv4Dst)) {
        data.extend_from_slice(&src);
        data.extend_from_slice(&dst);
        data.extend_from_slice(&[0, crate::parser::IP_PROTO_UDP as u8]);
        data.extend_from_slice(&(udp_length as u16).to_be_bytes());
    } else {
        return Err(SchcError::RuleValidation(format!(
            "no IP addresses precede the UDP checksum at position {position}"
        )));
    }
    Ok(data)
}

/// RFC 1071 ones-complement sum; odd trailing byte is zero-padded.
fn internet_checksum(data: &[u8]) -> u16 {
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
    !(sum as u16)
}
