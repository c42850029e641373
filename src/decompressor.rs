//! Decompression logic
//!
//! Consumes a SCHC packet bit by bit, reconstructing each field the inverse
//! way its Compression-Decompression Action produced the residue. Fields
//! with a `compute` action get zero-filled placeholders and are filled in by
//! the post-pass of [`crate::compute`] once every other field is known.
//! On any failure the packet is dropped; no partial output is produced.

use tracing::debug;

use crate::buffer::{Buffer, Padding};
use crate::compressor::mapping_index_bits;
use crate::compute::{self, ComputeEntry};
use crate::error::{Result, SchcError};
use crate::field::{Direction, FieldDescriptor, FieldId, PacketDescriptor};
use crate::rule::{
    CompressionAction, MatchingOperator, RuleDescriptor, RuleFieldDescriptor, RuleNature,
    TargetValue,
};
use crate::ruler::Ruler;

// =============================================================================
// Residue Reader
// =============================================================================

/// Bounded cursor over the residue bits of a SCHC packet.
struct ResidueReader<'a> {
    schc: &'a Buffer,
    position: usize,
}

impl<'a> ResidueReader<'a> {
    fn new(schc: &'a Buffer, position: usize) -> Self {
        Self { schc, position }
    }

    fn read(&mut self, bits: usize, field: FieldId) -> Result<Buffer> {
        let available = self.schc.len().saturating_sub(self.position);
        if bits > available {
            return Err(SchcError::ResidueUnderrun {
                field,
                needed: bits,
                available,
            });
        }
        let start = self.position as isize;
        let buffer = self.schc.slice(start, start + bits as isize)?;
        self.position += bits;
        Ok(buffer)
    }

    fn rest(self) -> Result<Buffer> {
        self.schc
            .slice(self.position as isize, self.schc.len() as isize)
    }
}

/// Decode a variable-length residue byte count from the stream head.
fn decode_length(reader: &mut ResidueReader<'_>, field: FieldId) -> Result<usize> {
    let nibble = reader.read(4, field)?.value_unsigned()?;
    if nibble < 15 {
        return Ok(nibble as usize);
    }
    let byte = reader.read(8, field)?.value_unsigned()?;
    if byte < 255 {
        return Ok(byte as usize);
    }
    let word = reader.read(16, field)?.value_unsigned()?;
    if word == 0xffff {
        return Err(SchcError::LengthPrefixInvalid { field });
    }
    Ok(word as usize)
}

// =============================================================================
// Decompression
// =============================================================================

/// Decompress a SCHC packet with a compression rule.
///
/// `schc` must span exactly the SCHC packet (rule ID, residues, payload);
/// its meaningful length delimits the payload. The rule fields applied are
/// those resolved for `direction`, symmetrically with compression.
pub fn decompress(
    schc: &Buffer,
    rule: &RuleDescriptor,
    direction: Direction,
) -> Result<PacketDescriptor> {
    if rule.nature != RuleNature::Compression || rule.is_default() {
        return Err(SchcError::RuleValidation(format!(
            "rule {} carries no compression actions to invert",
            rule.id
        )));
    }

    let mut reader = ResidueReader::new(schc, rule.id.len());
    let rule_fields = Ruler::direction_fields(rule, direction);
    let mut fields: Vec<(FieldDescriptor, Buffer)> = Vec::with_capacity(rule_fields.len());
    let mut compute_entries: Vec<ComputeEntry> = Vec::new();

    for rule_field in rule_fields {
        let value = match rule_field.compression_action {
            CompressionAction::NotSent => target_buffer(rule_field)?.clone(),
            CompressionAction::ValueSent => {
                if rule_field.is_variable() {
                    let bytes = decode_length(&mut reader, rule_field.id)?;
                    reader.read(bytes * 8, rule_field.id)?
                } else {
                    reader.read(rule_field.length as usize, rule_field.id)?
                }
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
                let bits = mapping_index_bits(mapping.len());
                let index = reader.read(bits, rule_field.id)?.value_unsigned()? as usize;
                mapping
                    .get(index)
                    .ok_or(SchcError::MappingOutOfRange {
                        field: rule_field.id,
                        index,
                        size: mapping.len(),
                    })?
                    .clone()
            }
            CompressionAction::Lsb => {
                let MatchingOperator::Msb(bits) = rule_field.matching_operator else {
                    return Err(SchcError::RuleValidation(format!(
                        "field {}: LSB without MSB operator",
                        rule_field.id
                    )));
                };
                let head = target_buffer(rule_field)?.slice(0, bits as isize)?;
                let residue = if rule_field.is_variable() {
                    let bytes = decode_length(&mut reader, rule_field.id)?;
                    reader.read(bytes * 8, rule_field.id)?
                } else {
                    reader.read((rule_field.length - bits) as usize, rule_field.id)?
                };
                head.concat(&residue)
            }
            CompressionAction::Compute => {
                compute_entries.push(ComputeEntry {
                    position: fields.len(),
                    id: rule_field.id,
                });
                Buffer::zeros(rule_field.length as usize, Padding::Left)
            }
        };
        fields.push((
            FieldDescriptor {
                id: rule_field.id,
                length: value.len() as u16,
                position: rule_field.position,
                direction: rule_field.direction,
            },
            value,
        ));
    }

    let payload = reader.rest()?;
    compute::run_post_pass(&mut fields, &payload, &compute_entries)?;
    debug!(
        rule = %rule.id,
        fields = fields.len(),
        computed = compute_entries.len(),
        "packet decompressed"
    );
    Ok(PacketDescriptor {
        direction,
        fields,
        payload,
    })
}

fn target_buffer(rule_field: &RuleFieldDescriptor) -> Result<&Buffer> {
    rule_field
        .target_value
        .as_ref()
        .and_then(TargetValue::as_value)
        .ok_or_else(|| {
            SchcError::RuleValidation(format!(
                "field {}: missing target value",
                rule_field.id
            ))
        })
}
