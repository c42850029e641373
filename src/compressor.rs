//! Compression logic
//!
//! Applies the per-field Compression-Decompression Actions of a matched
//! rule and assembles the SCHC packet:
//!
//! ```text
//! [ rule_id | residue_1 | residue_2 | ... | residue_n | payload ]
//! ```
//!
//! Residues are concatenated without separators in rule order. When a
//! variable-length field is transmitted, its residue is byte-aligned (zero
//! bits appended on the right) and preceded by a length prefix counting the
//! residue bytes: 4 bits for counts below 15, `0xF` + 8 bits below 255,
//! `0xF` + `0xFF` + 16 bits below 65535. This prefix format is fixed for
//! wire compatibility. The final byte of the stream is right-padded with
//! zeros to reach a byte boundary.

use tracing::debug;

use crate::buffer::{Buffer, Padding};
use crate::error::{Result, SchcError};
use crate::field::PacketDescriptor;
use crate::rule::{
    CompressionAction, MatchingOperator, RuleDescriptor, RuleFieldDescriptor, RuleNature,
    TargetValue,
};
use crate::ruler::Ruler;

// =============================================================================
// Compression
// =============================================================================

/// Compress a packet descriptor with a rule it matches.
///
/// Default and no-compression rules emit the rule ID followed by the packet
/// unchanged.
pub fn compress(packet: &PacketDescriptor, rule: &RuleDescriptor) -> Result<Buffer> {
    if rule.nature == RuleNature::NoCompression || rule.is_default() {
        return Ok(rule.id.concat(&packet.serialize()).pad(Padding::Right));
    }

    let rule_fields = Ruler::direction_fields(rule, packet.direction);
    if rule_fields.len() != packet.fields.len() {
        return Err(SchcError::RuleValidation(format!(
            "rule {} describes {} fields for this direction, packet has {}",
            rule.id,
            rule_fields.len(),
            packet.fields.len()
        )));
    }

    let mut schc = Buffer::empty(Padding::Left).concat(&rule.id);
    for ((descriptor, value), rule_field) in packet.fields.iter().zip(rule_fields) {
        match rule_field.compression_action {
            CompressionAction::NotSent | CompressionAction::Compute => {}
            CompressionAction::ValueSent => {
                schc = append_residue(schc, rule_field, value.clone())?;
            }
            CompressionAction::Lsb => {
                let MatchingOperator::Msb(bits) = rule_field.matching_operator else {
                    return Err(SchcError::RuleValidation(format!(
                        "field {}: LSB without MSB operator",
                        rule_field.id
                    )));
                };
                let residue = value.slice(bits as isize, value.len() as isize)?;
                schc = append_residue(schc, rule_field, residue)?;
            }
            CompressionAction::MappingSent => {
                let mapping = rule_field
                    .target_value
                    .as_ref()
                    .and_then(TargetValue::as_mapping)
                    .ok_or_else(|| {
                        SchcError::RuleValidation(format!(
                            "field {}: mapping-sent without mapping",
                            rule_field.id
                        ))
                    })?;
                let index = mapping
                    .iter()
                    .position(|target| target == value)
                    .ok_or_else(|| {
                        SchcError::RuleValidation(format!(
                            "field {} at position {}: value not in mapping",
                            rule_field.id, descriptor.position
                        ))
                    })?;
                let bits = mapping_index_bits(mapping.len());
                schc = schc.concat(&Buffer::from_value(index as u64, bits));
            }
        }
    }

    schc = schc.concat(&packet.payload);
    debug!(
        rule = %rule.id,
        header_bits = packet.header_length(),
        compressed_bits = schc.len() - packet.payload.len(),
        "packet compressed"
    );
    Ok(schc.pad(Padding::Right))
}

fn append_residue(
    schc: Buffer,
    rule_field: &RuleFieldDescriptor,
    residue: Buffer,
) -> Result<Buffer> {
    if rule_field.is_variable() {
        let aligned = byte_aligned(&residue);
        let prefix = encode_length(aligned.len() / 8, rule_field)?;
        Ok(schc.concat(&prefix).concat(&aligned))
    } else {
        Ok(schc.concat(&residue))
    }
}

/// Pad a residue with zero bits on the right up to a byte boundary.
fn byte_aligned(residue: &Buffer) -> Buffer {
    let filler = residue.padding_length();
    if filler == 0 {
        residue.clone()
    } else {
        residue.concat(&Buffer::zeros(filler, Padding::Left))
    }
}

/// Encode a variable-length residue byte count as the wire prefix.
pub(crate) fn encode_length(bytes: usize, rule_field: &RuleFieldDescriptor) -> Result<Buffer> {
    if bytes < 15 {
        Ok(Buffer::from_value(bytes as u64, 4))
    } else if bytes < 255 {
        Ok(Buffer::from_value(0xf, 4).concat(&Buffer::from_value(bytes as u64, 8)))
    } else if bytes < 65535 {
        Ok(Buffer::from_value(0xf, 4)
            .concat(&Buffer::from_value(0xff, 8))
            .concat(&Buffer::from_value(bytes as u64, 16)))
    } else {
        Err(SchcError::LengthPrefixInvalid { field: rule_field.id })
    }
}

/// Bits needed to index a mapping: `ceil(log2(n))`, 0 for a single entry.
pub(crate) fn mapping_index_bits(entries: usize) -> usize {
    if entries <= 1 {
        0
    } else {
        (usize::BITS - (entries - 1).leading_zeros()) as usize
    }
}
