//! # SCHC Core - Static Context Header Compression
//!
//! Core engine for SCHC (RFC 8724) header compression on constrained IoT
//! networks: a bit-exact buffer primitive, per-protocol parsers composed
//! into stacks, rule matching, and the compressor/decompressor pair that
//! turns matched headers into compact residues and back.
//!
//! The engine is synchronous and single-threaded per instance; contexts and
//! rules are immutable once configured and can be shared freely.

pub mod error;
pub mod buffer;
pub mod field;
pub mod rule;

// Core functional modules
pub mod parser;
pub mod matcher;
pub mod ruler;
pub mod compressor;
pub mod decompressor;
pub mod compute;

// Integration layer
pub mod engine;

// Core error/result types
pub use error::{Result, SchcError};

pub use buffer::{Buffer, Padding};
pub use field::{Direction, DirectionIndicator, FieldDescriptor, FieldId, PacketDescriptor};
pub use parser::{HeaderParser, ParsedHeader, ProtocolId, StackId, StackParser};
pub use rule::{
    CompressionAction, Context, MatchingOperator, RuleDescriptor, RuleFieldDescriptor, RuleNature,
    TargetValue,
};
pub use ruler::Ruler;

// Main entry points
pub use engine::{compress, compress_packet, decompress, match_rule, parse};
