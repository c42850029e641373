//! The Ruler
//!
//! Implements the rule logic of RFC 8724: storing an ordered ruleset,
//! selecting the rule that applies to a packet descriptor on the
//! compression side, and looking a rule up by the rule ID carried at the
//! head of a SCHC packet on the decompression side.
//!
//! Selection is first-match in declaration order. The field descriptors of
//! a rule are assumed ordered like the target packet's fields, so after
//! direction resolution the two lists are zipped positionally.

use tracing::debug;

use crate::buffer::Buffer;
use crate::error::{Result, SchcError};
use crate::field::{Direction, PacketDescriptor};
use crate::matcher::field_match;
use crate::rule::{RuleDescriptor, RuleFieldDescriptor};

pub struct Ruler<'a> {
    rules: &'a [RuleDescriptor],
}

impl<'a> Ruler<'a> {
    pub fn new(rules: &'a [RuleDescriptor]) -> Self {
        Self { rules }
    }

    /// Rule field descriptors of `rule` that apply to packets travelling in
    /// `direction`.
    pub fn direction_fields(
        rule: &RuleDescriptor,
        direction: Direction,
    ) -> Vec<&RuleFieldDescriptor> {
        rule.field_descriptors
            .iter()
            .filter(|field| field.direction.matches(direction))
            .collect()
    }

    /// Find the first rule matching the packet descriptor.
    ///
    /// A rule matches when, after direction resolution, its field list and
    /// the packet's field list have equal length and every Matching Operator
    /// accepts its positional counterpart. The default rule matches
    /// unconditionally.
    pub fn match_packet_descriptor(
        &self,
        packet: &PacketDescriptor,
    ) -> Result<&'a RuleDescriptor> {
        for rule in self.rules {
            if rule.is_default() {
                debug!(rule = %rule.id, "default rule selected");
                return Ok(rule);
            }
            let rule_fields = Self::direction_fields(rule, packet.direction);
            if rule_fields.len() != packet.fields.len() {
                continue;
            }
            if packet
                .fields
                .iter()
                .zip(&rule_fields)
                .all(|(packet_field, rule_field)| field_match(packet_field, rule_field))
            {
                debug!(rule = %rule.id, "rule matched");
                return Ok(rule);
            }
        }
        Err(SchcError::NoMatchingRule)
    }

    /// Find the rule whose ID matches the head of a SCHC packet.
    /// `rule_id_length` is a property of the context.
    pub fn match_schc_packet(
        &self,
        schc_packet: &Buffer,
        rule_id_length: usize,
    ) -> Result<&'a RuleDescriptor> {
        if schc_packet.len() < rule_id_length {
            return Err(SchcError::NoMatchingRule);
        }
        let head = schc_packet.slice(0, rule_id_length as isize)?;
        self.rules
            .iter()
            .find(|rule| rule.id == head)
            .ok_or(SchcError::NoMatchingRule)
    }
}
