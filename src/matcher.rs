//! Field matching logic
//!
//! Matching Operators (MOs) as defined in section 7.3 of RFC 8724: `equal`,
//! `ignore`, `MSB(x)` and `match-mapping`. A packet field value is a raw bit
//! buffer; all comparisons are bit-equality over meaningful bits.

use crate::buffer::Buffer;
use crate::field::FieldDescriptor;
use crate::rule::{MatchingOperator, RuleFieldDescriptor, TargetValue};

// =============================================================================
// Matching Operators
// =============================================================================

/// `equal`: true if the packet value is bit-equal to the target value.
#[inline]
pub fn equal(value: &Buffer, target: &Buffer) -> bool {
    value == target
}

/// `ignore`: always true.
#[inline]
pub fn ignore(_value: &Buffer) -> bool {
    true
}

/// `MSB(x)`: true if the `bits` most significant bits of the packet value
/// equal the `bits` most significant bits of the pattern. Requires both to
/// be at least `bits` long.
#[inline]
pub fn most_significant_bits(value: &Buffer, bits: u16, pattern: &Buffer) -> bool {
    let bits = bits as usize;
    if value.len() < bits || pattern.len() < bits {
        return false;
    }
    match (value.slice(0, bits as isize), pattern.slice(0, bits as isize)) {
        (Ok(head), Ok(pattern_head)) => head == pattern_head,
        _ => false,
    }
}

/// `match-mapping`: true if the packet value equals some element of the
/// target list.
#[inline]
pub fn match_mapping(value: &Buffer, mapping: &[Buffer]) -> bool {
    mapping.iter().any(|target| target == value)
}

// =============================================================================
// Rule Field Matching
// =============================================================================

/// Apply a rule field's Matching Operator to one packet field.
pub fn field_match(
    (descriptor, value): &(FieldDescriptor, Buffer),
    rule_field: &RuleFieldDescriptor,
) -> bool {
    if descriptor.id != rule_field.id {
        return false;
    }
    match rule_field.matching_operator {
        MatchingOperator::Ignore => ignore(value),
        MatchingOperator::Equal => match rule_field.target_value.as_ref() {
            Some(TargetValue::Value(target)) => equal(value, target),
            _ => false,
        },
        MatchingOperator::Msb(bits) => match rule_field.target_value.as_ref() {
            Some(TargetValue::Value(pattern)) => most_significant_bits(value, bits, pattern),
            _ => false,
        },
        MatchingOperator::MatchMapping => match rule_field.target_value.as_ref() {
            Some(TargetValue::Mapping(mapping)) => match_mapping(value, mapping),
            _ => false,
        },
    }
}
