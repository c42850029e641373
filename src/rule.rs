//! SCHC rule structures and contexts
//!
//! Rules pair each expected header field with a target value, a Matching
//! Operator and a Compression-Decompression Action. The field descriptors of
//! a rule are an ordered sequence matching the on-wire field order of the
//! packets it targets: compression residues are concatenated in rule order
//! and must be demultiplexed in the same order at decompression.

use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::error::{Result, SchcError};
use crate::field::{DirectionIndicator, FieldId};
use crate::parser::StackId;

// =============================================================================
// Target Values
// =============================================================================

/// What a rule expects for a field: a single buffer, or a list of buffers
/// for `match-mapping` / `mapping-sent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetValue {
    Value(Buffer),
    Mapping(Vec<Buffer>),
}

impl TargetValue {
    pub fn as_value(&self) -> Option<&Buffer> {
        match self {
            TargetValue::Value(buffer) => Some(buffer),
            TargetValue::Mapping(_) => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[Buffer]> {
        match self {
            TargetValue::Mapping(values) => Some(values),
            TargetValue::Value(_) => None,
        }
    }
}

// =============================================================================
// Matching Operators and Compression Actions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchingOperator {
    #[serde(rename = "equal")]
    Equal,
    #[serde(rename = "ignore")]
    Ignore,
    #[serde(rename = "MSB")]
    Msb(u16),
    #[serde(rename = "match-mapping")]
    MatchMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAction {
    #[serde(rename = "not-sent")]
    NotSent,
    #[serde(rename = "value-sent")]
    ValueSent,
    #[serde(rename = "mapping-sent")]
    MappingSent,
    #[serde(rename = "LSB")]
    Lsb,
    #[serde(rename = "compute")]
    Compute,
}

// =============================================================================
// Rule Descriptors
// =============================================================================

/// One field slot of a rule: the field identity plus the target value,
/// matching operator and compression action that govern it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFieldDescriptor {
    pub id: FieldId,
    /// Expected field length in bits; 0 marks a variable-length field.
    pub length: u16,
    #[serde(default)]
    pub position: u8,
    pub direction: DirectionIndicator,
    #[serde(default)]
    pub target_value: Option<TargetValue>,
    pub matching_operator: MatchingOperator,
    pub compression_action: CompressionAction,
}

impl RuleFieldDescriptor {
    /// Whether this field carries no fixed length and its residues need a
    /// length prefix on the wire.
    pub fn is_variable(&self) -> bool {
        self.length == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleNature {
    #[serde(rename = "compression")]
    Compression,
    #[serde(rename = "no-compression")]
    NoCompression,
}

impl Default for RuleNature {
    fn default() -> Self {
        RuleNature::Compression
    }
}

/// A compression rule: right-aligned rule ID, nature and the ordered field
/// descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub id: Buffer,
    #[serde(default)]
    pub nature: RuleNature,
    #[serde(default)]
    pub field_descriptors: Vec<RuleFieldDescriptor>,
}

impl RuleDescriptor {
    /// The default rule has no field descriptors and matches any packet.
    pub fn is_default(&self) -> bool {
        self.field_descriptors.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SchcError::RuleValidation(
                "rule ID must be at least 1 bit".into(),
            ));
        }
        for field in &self.field_descriptors {
            validate_field(&self.id, field)?;
        }
        Ok(())
    }
}

fn validate_field(rule_id: &Buffer, field: &RuleFieldDescriptor) -> Result<()> {
    let label = |reason: String| {
        SchcError::RuleValidation(format!("rule {rule_id}, field {}: {reason}", field.id))
    };

    match field.matching_operator {
        MatchingOperator::Msb(bits) => {
            if bits == 0 {
                return Err(label("MSB(0) is meaningless".into()));
            }
            if field.length != 0 && bits > field.length {
                return Err(label(format!(
                    "MSB({bits}) exceeds field length ({} bits)",
                    field.length
                )));
            }
            let pattern = field
                .target_value
                .as_ref()
                .and_then(TargetValue::as_value)
                .ok_or_else(|| label("MSB requires a single target value".into()))?;
            if pattern.len() < bits as usize {
                return Err(label(format!(
                    "MSB({bits}) pattern is only {} bits",
                    pattern.len()
                )));
            }
        }
        MatchingOperator::MatchMapping => {
            let mapping = field
                .target_value
                .as_ref()
                .and_then(TargetValue::as_mapping)
                .ok_or_else(|| label("match-mapping requires a target value list".into()))?;
            if mapping.is_empty() {
                return Err(label("match-mapping target list is empty".into()));
            }
        }
        MatchingOperator::Equal => {
            if field
                .target_value
                .as_ref()
                .and_then(TargetValue::as_value)
                .is_none()
            {
                return Err(label("equal requires a single target value".into()));
            }
        }
        MatchingOperator::Ignore => {}
    }

    match field.compression_action {
        CompressionAction::NotSent => {
            if field.target_value.is_none() {
                return Err(label("not-sent requires a target value to restore".into()));
            }
        }
        CompressionAction::Lsb => {
            if !matches!(field.matching_operator, MatchingOperator::Msb(_)) {
                return Err(label("LSB pairs with the MSB matching operator".into()));
            }
        }
        CompressionAction::MappingSent => {
            if field.matching_operator != MatchingOperator::MatchMapping {
                return Err(label("mapping-sent pairs with match-mapping".into()));
            }
        }
        CompressionAction::Compute => {
            if !crate::compute::supports(field.id) {
                return Err(label("no compute function for this field".into()));
            }
        }
        CompressionAction::ValueSent => {}
    }
    Ok(())
}

// =============================================================================
// Contexts
// =============================================================================

/// A named ruleset bound to a parser stack and an interface.
///
/// The ruleset is an ordered list evaluated first-match; the default rule,
/// if present, must be last. All rule IDs share one bit length, which is the
/// number of bits the decompressor reads from the head of a SCHC packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub interface_id: String,
    pub parser_id: StackId,
    pub ruleset: Vec<RuleDescriptor>,
}

impl Context {
    pub fn new(
        id: impl Into<String>,
        interface_id: impl Into<String>,
        parser_id: StackId,
        ruleset: Vec<RuleDescriptor>,
    ) -> Result<Self> {
        let context = Self {
            id: id.into(),
            interface_id: interface_id.into(),
            parser_id,
            ruleset,
        };
        context.validate()?;
        Ok(context)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let context: Context = serde_json::from_str(json)?;
        context.validate()?;
        Ok(context)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Bit length of every rule ID in this context.
    pub fn rule_id_length(&self) -> usize {
        self.ruleset.first().map(|rule| rule.id.len()).unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        let Some(first) = self.ruleset.first() else {
            return Err(SchcError::RuleValidation(format!(
                "context {}: empty ruleset",
                self.id
            )));
        };
        let id_length = first.id.len();
        let last_index = self.ruleset.len() - 1;
        for (index, rule) in self.ruleset.iter().enumerate() {
            rule.validate()?;
            if rule.id.len() != id_length {
                return Err(SchcError::RuleValidation(format!(
                    "context {}: rule {} ID is {} bits, expected {id_length}",
                    self.id,
                    rule.id,
                    rule.id.len()
                )));
            }
            if rule.is_default() && index != last_index {
                return Err(SchcError::RuleValidation(format!(
                    "context {}: default rule {} must be last",
                    self.id, rule.id
                )));
            }
            if self.ruleset[..index].iter().any(|prior| prior.id == rule.id) {
                return Err(SchcError::RuleValidation(format!(
                    "context {}: duplicate rule ID {}",
                    self.id, rule.id
                )));
            }
        }
        Ok(())
    }
}
