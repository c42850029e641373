//! Error types for SCHC operations

use thiserror::Error;

use crate::field::FieldId;

#[derive(Error, Debug)]
pub enum SchcError {
    #[error("truncated {header} header: need {needed} bits, {available} available")]
    Truncated {
        header: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("malformed {header} header: {reason}")]
    Malformed {
        header: &'static str,
        reason: String,
    },

    #[error("no matching rule found")]
    NoMatchingRule,

    #[error("residue underrun at field {field}: need {needed} bits, {available} available")]
    ResidueUnderrun {
        field: FieldId,
        needed: usize,
        available: usize,
    },

    #[error("mapping index {index} out of range for field {field} ({size} entries)")]
    MappingOutOfRange {
        field: FieldId,
        index: usize,
        size: usize,
    },

    #[error("invalid length prefix for field {field}")]
    LengthPrefixInvalid { field: FieldId },

    #[error("bit index {index} out of range for buffer of {length} bits")]
    OutOfRange { index: isize, length: usize },

    #[error("buffer length mismatch: expected {expected} bits, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("value does not fit in {width} bits: buffer is {length} bits")]
    ValueOverflow { width: u32, length: usize },

    #[error("rule validation error: {0}")]
    RuleValidation(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchcError>;
