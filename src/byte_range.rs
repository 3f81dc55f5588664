//! Byte ranges.
//!
//! A [`ByteRange`] is a contiguous end-exclusive span of file bytes to be
//! read in one unit. Ranges produced by a [`Selection`](crate::selection::Selection)
//! are file-absolute: the array's byte offset has already been applied.

use std::ops::Range;

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A contiguous byte range with an exclusive end.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ByteRange {
    /// The first byte of the range.
    pub start: ByteOffset,
    /// One past the last byte of the range.
    pub end: ByteOffset,
}

impl ByteRange {
    /// Create a new byte range.
    #[must_use]
    pub const fn new(start: ByteOffset, end: ByteOffset) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Return the length of the byte range.
    #[must_use]
    pub const fn length(&self) -> ByteLength {
        self.end - self.start
    }

    /// Convert the byte range to a [`Range<u64>`].
    #[must_use]
    pub const fn to_range(self) -> Range<u64> {
        self.start..self.end
    }

    /// Shift both endpoints of the byte range by `offset`.
    #[must_use]
    pub const fn offset(self, offset: ByteOffset) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

impl From<Range<u64>> for ByteRange {
    fn from(range: Range<u64>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Return the total length of `byte_ranges`.
#[must_use]
pub fn total_byte_length(byte_ranges: &[ByteRange]) -> ByteLength {
    byte_ranges.iter().map(ByteRange::length).sum()
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {_0} for bytes of length {_1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub const fn new(byte_range: ByteRange, bytes_len: u64) -> Self {
        Self(byte_range, bytes_len)
    }
}

/// Check that every byte range lies within a sequence of `bytes_len` bytes.
///
/// # Errors
/// Returns [`InvalidByteRangeError`] with the first offending range.
pub fn validate_byte_ranges(
    byte_ranges: &[ByteRange],
    bytes_len: u64,
) -> Result<(), InvalidByteRangeError> {
    for byte_range in byte_ranges {
        if byte_range.end > bytes_len {
            return Err(InvalidByteRangeError(*byte_range, bytes_len));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_ranges() {
        let byte_range = ByteRange::new(8, 24);
        assert_eq!(byte_range.length(), 16);
        assert_eq!(byte_range.to_range(), 8..24);
        assert_eq!(byte_range.offset(64), ByteRange::new(72, 88));
        assert_eq!(ByteRange::from(3..5), ByteRange::new(3, 5));
        assert_eq!(byte_range.to_string(), "8..24");
    }

    #[test]
    fn byte_range_totals() {
        let ranges = [ByteRange::new(0, 8), ByteRange::new(16, 40)];
        assert_eq!(total_byte_length(&ranges), 32);
        assert!(validate_byte_ranges(&ranges, 40).is_ok());
        let err = validate_byte_ranges(&ranges, 39).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid byte range 16..40 for bytes of length 39"
        );
    }
}
