//! Per-dimension selectors and their resolution to concrete indices.
//!
//! A [`Selector`] is a tagged per-dimension indexing method, decided once at
//! the API boundary. [`resolve_selectors`] turns a selector sequence into one
//! [`DimSelection`] per selector dimension, with every index bounds-checked
//! against the array shape. Dimensions beyond the selector length are
//! implicitly select-all and are handled by the
//! [`Selection`](crate::selection::Selection) built from the resolved output.

use derive_more::From;
use thiserror::Error;

use crate::array::ArrayIndices;

/// A per-dimension selector.
#[derive(Clone, Debug, PartialEq, From)]
pub enum Selector {
    /// A single index. Negative values address from the end of the dimension.
    ///
    /// Collapses the dimension in the result shape.
    Index(i64),
    /// A stepped half-open range. Unset fields default to the full dimension
    /// with unit step. Negative `start`/`stop` address from the end.
    #[from(ignore)]
    Slice {
        /// The first index, defaulting to `0`.
        start: Option<i64>,
        /// One past the last index, defaulting to the dimension size.
        stop: Option<i64>,
        /// The step, defaulting to `1`. Must be nonzero.
        step: Option<i64>,
    },
    /// An explicit list of indices, in caller order, duplicates permitted.
    /// Negative values address from the end.
    Indices(Vec<i64>),
    /// A boolean mask with one entry per element of the dimension. Selects
    /// the `true` positions in ascending order.
    Mask(Vec<bool>),
}

impl Selector {
    /// Create a [`Selector::Slice`] from optional `start`, `stop`, and `step`.
    pub fn slice(
        start: impl Into<Option<i64>>,
        stop: impl Into<Option<i64>>,
        step: impl Into<Option<i64>>,
    ) -> Self {
        Self::Slice {
            start: start.into(),
            stop: stop.into(),
            step: step.into(),
        }
    }

    /// Create a [`Selector::Slice`] selecting the entire dimension.
    #[must_use]
    pub const fn full() -> Self {
        Self::Slice {
            start: None,
            stop: None,
            step: None,
        }
    }
}

impl From<std::ops::Range<i64>> for Selector {
    fn from(range: std::ops::Range<i64>) -> Self {
        Self::slice(range.start, range.end, None)
    }
}

impl From<std::ops::RangeFrom<i64>> for Selector {
    fn from(range: std::ops::RangeFrom<i64>) -> Self {
        Self::slice(range.start, None, None)
    }
}

impl From<std::ops::RangeTo<i64>> for Selector {
    fn from(range: std::ops::RangeTo<i64>) -> Self {
        Self::slice(None, range.end, None)
    }
}

impl From<std::ops::RangeFull> for Selector {
    fn from(_: std::ops::RangeFull) -> Self {
        Self::full()
    }
}

impl From<&[i64]> for Selector {
    fn from(indices: &[i64]) -> Self {
        Self::Indices(indices.to_vec())
    }
}

impl From<&[bool]> for Selector {
    fn from(mask: &[bool]) -> Self {
        Self::Mask(mask.to_vec())
    }
}

/// The resolved indices of one selector dimension.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DimSelection {
    /// Concrete, bounds-checked indices into the dimension. Never empty.
    pub indices: ArrayIndices,
    /// Whether the dimension contributes a size to the result shape.
    pub keep_dim: bool,
}

/// A selector resolution error.
#[derive(Clone, Debug, Error)]
pub enum SelectorError {
    /// An index is out of bounds of its dimension, after from-end wraparound.
    #[error("index {index} is out of bounds of dimension {dim} with size {size}")]
    IndexOutOfBounds {
        /// The index as given.
        index: i64,
        /// The dimension of the selector.
        dim: usize,
        /// The size of the dimension.
        size: u64,
    },
    /// A selector resolves to zero indices.
    #[error("selector of dimension {dim} selects no elements")]
    EmptySelection {
        /// The dimension of the selector.
        dim: usize,
    },
    /// A boolean mask does not match its dimension size.
    #[error("boolean mask of length {mask_len} does not match dimension {dim} with size {size}")]
    MaskLengthMismatch {
        /// The dimension of the selector.
        dim: usize,
        /// The length of the mask.
        mask_len: usize,
        /// The size of the dimension.
        size: u64,
    },
    /// A slice step of zero.
    #[error("slice of dimension {dim} has a step of zero")]
    ZeroStep {
        /// The dimension of the selector.
        dim: usize,
    },
    /// More selector dimensions than array dimensions.
    #[error("too many indices: {got} selector dimensions for a {dimensionality} dimensional array")]
    TooManyIndices {
        /// The number of selector dimensions.
        got: usize,
        /// The dimensionality of the array.
        dimensionality: usize,
    },
    /// An empty selector sequence.
    #[error("selector sequence is empty")]
    EmptySelector,
}

/// Resolve a single from-end-wrapping index against a dimension size.
fn resolve_index(index: i64, dim: usize, size: u64) -> Result<u64, SelectorError> {
    let mut resolved = i128::from(index);
    if resolved < 0 {
        resolved += i128::from(size);
    }
    if (0..i128::from(size)).contains(&resolved) {
        Ok(resolved as u64)
    } else {
        Err(SelectorError::IndexOutOfBounds { index, dim, size })
    }
}

impl Selector {
    /// Resolve the selector against dimension `dim` with `size` elements.
    ///
    /// # Errors
    /// Returns a [`SelectorError`] if any index is out of bounds, a mask has
    /// the wrong length, a slice step is zero, or nothing is selected.
    pub fn resolve(&self, dim: usize, size: u64) -> Result<DimSelection, SelectorError> {
        match self {
            Self::Index(index) => Ok(DimSelection {
                indices: vec![resolve_index(*index, dim, size)?],
                keep_dim: false,
            }),
            Self::Slice { start, stop, step } => {
                let step = step.unwrap_or(1);
                if step == 0 {
                    return Err(SelectorError::ZeroStep { dim });
                }
                let size = i128::from(size);
                let mut start = i128::from(start.unwrap_or(0));
                if start < 0 {
                    start += size;
                }
                let mut stop = stop.map_or(size, i128::from);
                if stop < 0 {
                    stop += size;
                }
                let start = start.clamp(0, size);
                let stop = stop.clamp(0, size);
                let mut indices = ArrayIndices::new();
                if step > 0 {
                    let mut index = start;
                    while index < stop {
                        indices.push(index as u64);
                        index += i128::from(step);
                    }
                } else {
                    // Descending: the first index must itself be in bounds.
                    let mut index = start.min(size - 1);
                    while index > stop {
                        indices.push(index as u64);
                        index += i128::from(step);
                    }
                }
                if indices.is_empty() {
                    return Err(SelectorError::EmptySelection { dim });
                }
                Ok(DimSelection {
                    indices,
                    keep_dim: true,
                })
            }
            Self::Indices(input) => {
                if input.is_empty() {
                    return Err(SelectorError::EmptySelection { dim });
                }
                let indices = input
                    .iter()
                    .map(|index| resolve_index(*index, dim, size))
                    .collect::<Result<ArrayIndices, SelectorError>>()?;
                Ok(DimSelection {
                    indices,
                    keep_dim: true,
                })
            }
            Self::Mask(mask) => {
                if mask.len() as u64 != size {
                    return Err(SelectorError::MaskLengthMismatch {
                        dim,
                        mask_len: mask.len(),
                        size,
                    });
                }
                let indices: ArrayIndices = mask
                    .iter()
                    .enumerate()
                    .filter_map(|(index, selected)| selected.then_some(index as u64))
                    .collect();
                if indices.is_empty() {
                    return Err(SelectorError::EmptySelection { dim });
                }
                Ok(DimSelection {
                    indices,
                    keep_dim: true,
                })
            }
        }
    }
}

/// Resolve a selector sequence against an array shape.
///
/// Produces one [`DimSelection`] per selector dimension. Trailing dimensions
/// beyond the selector length are left to the caller as fully selected.
///
/// # Errors
/// Returns [`SelectorError::EmptySelector`] if `selectors` is empty,
/// [`SelectorError::TooManyIndices`] if it is longer than `shape`, and
/// otherwise any error of [`Selector::resolve`].
pub fn resolve_selectors(
    selectors: &[Selector],
    shape: &[u64],
) -> Result<Vec<DimSelection>, SelectorError> {
    if selectors.is_empty() {
        return Err(SelectorError::EmptySelector);
    }
    if selectors.len() > shape.len() {
        return Err(SelectorError::TooManyIndices {
            got: selectors.len(),
            dimensionality: shape.len(),
        });
    }
    std::iter::zip(selectors, shape)
        .enumerate()
        .map(|(dim, (selector, size))| selector.resolve(dim, *size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_index() {
        let selection = Selector::Index(3).resolve(0, 10).unwrap();
        assert_eq!(selection.indices, vec![3]);
        assert!(!selection.keep_dim);

        // Negative indices address from the end.
        for index in -10..0 {
            let selection = Selector::Index(index).resolve(0, 10).unwrap();
            assert_eq!(selection.indices, vec![(index + 10) as u64]);
        }
        assert!(matches!(
            Selector::Index(-11).resolve(0, 10),
            Err(SelectorError::IndexOutOfBounds { index: -11, .. })
        ));
        assert!(matches!(
            Selector::Index(10).resolve(0, 10),
            Err(SelectorError::IndexOutOfBounds { index: 10, .. })
        ));
    }

    #[test]
    fn selector_slice() {
        let selection = Selector::full().resolve(0, 4).unwrap();
        assert_eq!(selection.indices, vec![0, 1, 2, 3]);
        assert!(selection.keep_dim);

        let selection = Selector::from(1..3).resolve(0, 4).unwrap();
        assert_eq!(selection.indices, vec![1, 2]);

        let selection = Selector::slice(None, None, 2).resolve(0, 5).unwrap();
        assert_eq!(selection.indices, vec![0, 2, 4]);

        // Negative endpoints wrap, out-of-range endpoints clamp.
        let selection = Selector::from(-3..-1).resolve(0, 10).unwrap();
        assert_eq!(selection.indices, vec![7, 8]);
        let selection = Selector::from(8..100).resolve(0, 10).unwrap();
        assert_eq!(selection.indices, vec![8, 9]);

        // Descending slices need an explicit stop.
        let selection = Selector::slice(5, 1, -1).resolve(0, 10).unwrap();
        assert_eq!(selection.indices, vec![5, 4, 3, 2]);
        let selection = Selector::slice(100, 7, -1).resolve(0, 10).unwrap();
        assert_eq!(selection.indices, vec![9, 8]);

        assert!(matches!(
            Selector::from(3..3).resolve(0, 10),
            Err(SelectorError::EmptySelection { .. })
        ));
        assert!(matches!(
            Selector::slice(None, None, 0).resolve(0, 10),
            Err(SelectorError::ZeroStep { .. })
        ));
    }

    #[test]
    fn selector_indices() {
        let selection = Selector::Indices(vec![4, -1, 4]).resolve(0, 10).unwrap();
        // Caller order and duplicates are preserved.
        assert_eq!(selection.indices, vec![4, 9, 4]);
        assert!(selection.keep_dim);

        assert!(matches!(
            Selector::Indices(vec![0, 10]).resolve(0, 10),
            Err(SelectorError::IndexOutOfBounds { index: 10, .. })
        ));
        assert!(matches!(
            Selector::Indices(vec![]).resolve(0, 10),
            Err(SelectorError::EmptySelection { .. })
        ));
    }

    #[test]
    fn selector_mask() {
        let selection = Selector::Mask(vec![true, false, false, true])
            .resolve(0, 4)
            .unwrap();
        assert_eq!(selection.indices, vec![0, 3]);
        assert!(selection.keep_dim);

        // A mismatched mask fails regardless of content.
        assert!(matches!(
            Selector::Mask(vec![true; 3]).resolve(0, 4),
            Err(SelectorError::MaskLengthMismatch {
                mask_len: 3,
                size: 4,
                ..
            })
        ));
        assert!(matches!(
            Selector::Mask(vec![false; 4]).resolve(0, 4),
            Err(SelectorError::EmptySelection { .. })
        ));
    }

    #[test]
    fn selector_sequence() {
        let selections = resolve_selectors(&[Selector::Index(3)], &[10, 4]).unwrap();
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].indices, vec![3]);

        assert!(matches!(
            resolve_selectors(&[], &[10, 4]),
            Err(SelectorError::EmptySelector)
        ));
        assert!(matches!(
            resolve_selectors(
                &[Selector::Index(0), Selector::Index(0), Selector::Index(0)],
                &[10, 4]
            ),
            Err(SelectorError::TooManyIndices {
                got: 3,
                dimensionality: 2
            })
        ));
    }
}
