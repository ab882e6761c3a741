//! Packing of one accepted variant call into a single `i32` record.
//!
//! Layout (most significant first): 20 bits of bin-relative offset, 3 bits of
//! allele code, 8 bits of indel length. The sign bit is never set by
//! [`encode`], which leaves [`SENTINEL`] outside the legal range.

use thiserror::Error;

use crate::genomics::AlleleClass;

const OFFSET_BITS: u32 = 20;
const ALLELE_BITS: u32 = 3;
const LENGTH_BITS: u32 = 8;

const ALLELE_SHIFT: u32 = LENGTH_BITS;
const OFFSET_SHIFT: u32 = LENGTH_BITS + ALLELE_BITS;

const ALLELE_MASK: i32 = (1 << ALLELE_BITS) - 1;
const LENGTH_MASK: i32 = (1 << LENGTH_BITS) - 1;

/// Widest bin whose offsets still fit the record layout.
pub const MAX_BIN_WIDTH: u32 = 1 << OFFSET_BITS;
/// Longest indel length representable in a record.
pub const MAX_INDEL_LENGTH: u32 = (1 << LENGTH_BITS) - 1;
/// Terminates the record stream of every bin.
pub const SENTINEL: i32 = i32::MIN;

/// Errors while packing or unpacking records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Offset does not fit in the offset field.
    #[error("bin offset {0} exceeds {max}", max = MAX_BIN_WIDTH - 1)]
    OffsetOutOfRange(u32),
    /// Indel length does not fit in the length field.
    #[error("indel length {0} exceeds {max}", max = MAX_INDEL_LENGTH)]
    IndelTooLong(u32),
    /// Value is not a legal record (negative, sentinel or unknown allele code).
    #[error("invalid coded record {0:#010x}")]
    InvalidRecord(i32),
}

/// Unpacked content of a coded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodedVariant {
    /// Offset of the position from its bin start.
    pub offset: u32,
    /// Called allele.
    pub allele: AlleleClass,
    /// Indel length, zero for substitutions.
    pub indel_length: u32,
}

impl CodedVariant {
    /// Absolute position given the start of the bin the record belongs to.
    pub fn position(&self, bin_start: u32) -> u32 {
        bin_start + self.offset
    }
}

/// Pack a call into a record.
pub fn encode(offset: u32, allele: AlleleClass, indel_length: u32) -> Result<i32, CodecError> {
    if offset >= MAX_BIN_WIDTH {
        return Err(CodecError::OffsetOutOfRange(offset));
    }
    if indel_length > MAX_INDEL_LENGTH {
        return Err(CodecError::IndelTooLong(indel_length));
    }
    Ok(((offset as i32) << OFFSET_SHIFT)
        | (i32::from(allele.code()) << ALLELE_SHIFT)
        | indel_length as i32)
}

/// Unpack a record produced by [`encode`].
pub fn decode(record: i32) -> Result<CodedVariant, CodecError> {
    if record < 0 {
        return Err(CodecError::InvalidRecord(record));
    }
    let code = ((record >> ALLELE_SHIFT) & ALLELE_MASK) as u8;
    let allele = AlleleClass::from_code(code).ok_or(CodecError::InvalidRecord(record))?;
    Ok(CodedVariant {
        offset: (record >> OFFSET_SHIFT) as u32,
        allele,
        indel_length: (record & LENGTH_MASK) as u32,
    })
}
