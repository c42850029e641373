//! Bit-exact buffer data model
//!
//! `Buffer` is the substrate every other subsystem manipulates: field values,
//! residues and the compressed stream are all buffers. A buffer is a sequence
//! of meaningful bits together with a padding side that states where the
//! filler bits sit when the sequence is materialized as bytes. Equality,
//! hashing, slicing, shifting and concatenation operate on the meaningful
//! bits only; the padding side is carried along as presentation metadata.

use std::fmt;
use std::hash::{Hash, Hasher};

use bitvec::prelude::*;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SchcError};

/// Side on which the filler bits sit in the byte representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Padding {
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
}

impl Default for Padding {
    fn default() -> Self {
        Padding::Left
    }
}

/// A sequence of meaningful bits plus a padding side.
///
/// Internally the meaningful bits are held in a `BitVec<u8, Msb0>`; bytes
/// with the declared filler side are materialized on demand by [`content`].
/// All operations produce new buffers.
///
/// [`content`]: Buffer::content
#[derive(Clone)]
pub struct Buffer {
    bits: BitVec<u8, Msb0>,
    padding: Padding,
}

impl Buffer {
    /// Empty buffer with the given padding side.
    pub fn empty(padding: Padding) -> Self {
        Self {
            bits: BitVec::new(),
            padding,
        }
    }

    /// Build a buffer from `content` bytes of which `length` bits are
    /// meaningful, the filler bits sitting on the `padding` side.
    pub fn new(content: &[u8], length: usize, padding: Padding) -> Result<Self> {
        if length > 8 * content.len() {
            return Err(SchcError::LengthMismatch {
                expected: length,
                actual: 8 * content.len(),
            });
        }
        let all = BitSlice::<u8, Msb0>::from_slice(content);
        let bits = match padding {
            Padding::Left => all[8 * content.len() - length..].to_bitvec(),
            Padding::Right => all[..length].to_bitvec(),
        };
        Ok(Self { bits, padding })
    }

    /// Buffer over all bits of `content`.
    pub fn from_bytes(content: &[u8], padding: Padding) -> Self {
        Self {
            bits: BitVec::from_slice(content),
            padding,
        }
    }

    /// Left-padded buffer holding the `length` low-order bits of `value`,
    /// most significant bit first.
    pub fn from_value(value: u64, length: usize) -> Self {
        debug_assert!(length <= 64);
        let mut bits = BitVec::with_capacity(length);
        for i in (0..length).rev() {
            bits.push((value >> i) & 1 == 1);
        }
        Self {
            bits,
            padding: Padding::Left,
        }
    }

    /// Buffer of `length` zero bits.
    pub fn zeros(length: usize, padding: Padding) -> Self {
        Self {
            bits: bitvec![u8, Msb0; 0; length],
            padding,
        }
    }

    /// Number of meaningful bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Number of filler bits in the byte representation.
    pub fn padding_length(&self) -> usize {
        (8 - self.bits.len() % 8) % 8
    }

    /// Materialize the byte representation: `ceil(len / 8)` bytes with zero
    /// filler bits on the declared padding side.
    pub fn content(&self) -> Vec<u8> {
        let pad = self.padding_length();
        let mut out: BitVec<u8, Msb0> = BitVec::with_capacity(self.bits.len() + pad);
        match self.padding {
            Padding::Left => {
                out.resize(pad, false);
                out.extend_from_bitslice(&self.bits);
            }
            Padding::Right => {
                out.extend_from_bitslice(&self.bits);
                out.resize(self.bits.len() + pad, false);
            }
        }
        out.into_vec()
    }

    fn resolve_index(&self, index: isize) -> Result<usize> {
        let length = self.bits.len();
        let resolved = if index < 0 {
            length as isize + index
        } else {
            index
        };
        if resolved < 0 || resolved as usize >= length {
            return Err(SchcError::OutOfRange { index, length });
        }
        Ok(resolved as usize)
    }

    fn resolve_bound(&self, bound: isize) -> Result<usize> {
        let length = self.bits.len();
        let resolved = if bound < 0 {
            length as isize + bound
        } else {
            bound
        };
        if resolved < 0 || resolved as usize > length {
            return Err(SchcError::OutOfRange {
                index: bound,
                length,
            });
        }
        Ok(resolved as usize)
    }

    /// Bit at `index` (0 = most significant meaningful bit, negative counts
    /// from the end).
    pub fn bit_at(&self, index: isize) -> Result<u8> {
        let i = self.resolve_index(index)?;
        Ok(u8::from(self.bits[i]))
    }

    /// Sub-buffer over bits `start..end`. Negative indices count from the
    /// end; the padding side is inherited.
    pub fn slice(&self, start: isize, end: isize) -> Result<Buffer> {
        let s = self.resolve_bound(start)?;
        let e = self.resolve_bound(end)?;
        if s > e {
            return Err(SchcError::OutOfRange {
                index: end,
                length: self.bits.len(),
            });
        }
        Ok(Buffer {
            bits: self.bits[s..e].to_bitvec(),
            padding: self.padding,
        })
    }

    /// Copy of `self` with bits `start..end` replaced by `src`, whose length
    /// must equal `end - start`.
    pub fn set_slice(&self, start: isize, end: isize, src: &Buffer) -> Result<Buffer> {
        let s = self.resolve_bound(start)?;
        let e = self.resolve_bound(end)?;
        if s > e {
            return Err(SchcError::OutOfRange {
                index: end,
                length: self.bits.len(),
            });
        }
        if src.len() != e - s {
            return Err(SchcError::LengthMismatch {
                expected: e - s,
                actual: src.len(),
            });
        }
        let mut bits = self.bits.clone();
        bits[s..e].copy_from_bitslice(&src.bits);
        Ok(Buffer {
            bits,
            padding: self.padding,
        })
    }

    /// Shift the meaningful bits within a window of fixed width. Negative
    /// `n` shifts left (MSB-ward), positive `n` shifts right; bits shifted
    /// off the window are discarded and zeros enter on the opposite side.
    pub fn shift(&self, n: isize) -> Buffer {
        let length = self.bits.len();
        let k = n.unsigned_abs().min(length);
        let mut bits: BitVec<u8, Msb0> = BitVec::with_capacity(length);
        if n < 0 {
            bits.extend_from_bitslice(&self.bits[k..]);
            bits.resize(length, false);
        } else {
            bits.resize(k, false);
            bits.extend_from_bitslice(&self.bits[..length - k]);
        }
        Buffer {
            bits,
            padding: self.padding,
        }
    }

    /// Length-extending shift: the window grows by `|n|` bits so no bit is
    /// discarded. Negative `n` appends zeros on the low-order side, positive
    /// `n` prepends zeros on the high-order side.
    pub fn shift_extend(&self, n: isize) -> Buffer {
        let k = n.unsigned_abs();
        let mut bits: BitVec<u8, Msb0> = BitVec::with_capacity(self.bits.len() + k);
        if n < 0 {
            bits.extend_from_bitslice(&self.bits);
            bits.resize(self.bits.len() + k, false);
        } else {
            bits.resize(k, false);
            bits.extend_from_bitslice(&self.bits);
        }
        Buffer {
            bits,
            padding: self.padding,
        }
    }

    /// Same bits, requested padding side.
    pub fn pad(&self, padding: Padding) -> Buffer {
        Buffer {
            bits: self.bits.clone(),
            padding,
        }
    }

    fn zip_bits(&self, other: &Buffer, f: impl Fn(bool, bool) -> bool) -> Result<Buffer> {
        if self.len() != other.len() {
            return Err(SchcError::LengthMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        let bits = self
            .bits
            .iter()
            .by_vals()
            .zip(other.bits.iter().by_vals())
            .map(|(a, b)| f(a, b))
            .collect();
        Ok(Buffer {
            bits,
            padding: self.padding,
        })
    }

    /// Bitwise AND; operands must share length, result takes `self`'s padding.
    pub fn and(&self, other: &Buffer) -> Result<Buffer> {
        self.zip_bits(other, |a, b| a & b)
    }

    /// Bitwise OR; operands must share length, result takes `self`'s padding.
    pub fn or(&self, other: &Buffer) -> Result<Buffer> {
        self.zip_bits(other, |a, b| a | b)
    }

    /// Bitwise XOR; operands must share length, result takes `self`'s padding.
    pub fn xor(&self, other: &Buffer) -> Result<Buffer> {
        self.zip_bits(other, |a, b| a ^ b)
    }

    /// Bitwise NOT over the meaningful bits.
    pub fn not(&self) -> Buffer {
        let bits = self.bits.iter().by_vals().map(|b| !b).collect();
        Buffer {
            bits,
            padding: self.padding,
        }
    }

    /// Concatenation: `self`'s bits most significant, then `other`'s.
    /// The result is left-padded.
    pub fn concat(&self, other: &Buffer) -> Buffer {
        let mut bits = BitVec::with_capacity(self.bits.len() + other.bits.len());
        bits.extend_from_bitslice(&self.bits);
        bits.extend_from_bitslice(&other.bits);
        Buffer {
            bits,
            padding: Padding::Left,
        }
    }

    /// Lazy sequence of `n`-bit sub-buffers taken MSB-first; the last chunk
    /// may be shorter.
    pub fn chunks(&self, n: usize) -> impl Iterator<Item = Buffer> + '_ {
        let step = n.max(1);
        (0..self.bits.len()).step_by(step).map(move |start| {
            let end = (start + n).min(self.bits.len());
            Buffer {
                bits: self.bits[start..end].to_bitvec(),
                padding: self.padding,
            }
        })
    }

    /// Meaningful bits read big-endian as an unsigned integer.
    pub fn value_unsigned(&self) -> Result<u64> {
        if self.bits.len() > 64 {
            return Err(SchcError::ValueOverflow {
                width: 64,
                length: self.bits.len(),
            });
        }
        Ok(self
            .bits
            .iter()
            .by_vals()
            .fold(0u64, |acc, bit| (acc << 1) | u64::from(bit)))
    }

    /// Meaningful bits read big-endian as a two's-complement integer, the
    /// most significant meaningful bit being the sign bit.
    pub fn value_signed(&self) -> Result<i64> {
        let length = self.bits.len();
        if length > 64 {
            return Err(SchcError::ValueOverflow { width: 64, length });
        }
        if length == 0 {
            return Ok(0);
        }
        let raw = self.value_unsigned()?;
        if length < 64 && self.bits[0] {
            Ok((raw | (u64::MAX << length)) as i64)
        } else {
            Ok(raw as i64)
        }
    }
}

impl PartialEq for Buffer {
    /// Buffers compare equal iff their meaningful bit sequences are equal,
    /// regardless of stored padding side.
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl Eq for Buffer {}

impl Hash for Buffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.len().hash(state);
        self.pad(Padding::Left).content().hash(state);
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]({})", hex::encode(self.content()), self.len())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]({}, {:?})",
            hex::encode(self.content()),
            self.len(),
            self.padding
        )
    }
}

#[derive(Serialize, Deserialize)]
struct BufferForm {
    content: String,
    length: usize,
    #[serde(default)]
    padding: Padding,
}

impl Serialize for Buffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        BufferForm {
            content: hex::encode(self.content()),
            length: self.len(),
            padding: self.padding,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Buffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let form = BufferForm::deserialize(deserializer)?;
        let content = hex::decode(&form.content).map_err(D::Error::custom)?;
        Buffer::new(&content, form.length, form.padding).map_err(D::Error::custom)
    }
}
