//! Resolved selections and their compilation to byte ranges.
//!
//! A [`Selection`] pairs the resolved per-dimension indices of a selector
//! sequence with the shape of the array it selects from. It can produce the
//! shape of the selected region and the minimal ordered set of
//! [`ByteRange`]s needed to fill a row-major output buffer.
//!
//! Byte ranges are minimised by merging runs of consecutive indices along
//! the last selected dimension, the only axis on which adjacent elements are
//! adjacent on disk. Outer dimensions multiply the range set by their index
//! lists instead.

use itertools::Itertools;

use crate::{
    array::ArrayShape,
    byte_range::{ByteOffset, ByteRange},
    selector::{resolve_selectors, DimSelection, Selector, SelectorError},
};

/// A resolved selection over an array shape.
#[derive(Clone, Debug)]
pub struct Selection {
    dims: Vec<DimSelection>,
    shape: ArrayShape,
}

impl Selection {
    /// Resolve `selectors` against `shape`.
    ///
    /// # Errors
    /// Returns a [`SelectorError`] if the selector sequence is empty or too
    /// long, or if any selector fails to resolve (see [`Selector::resolve`]).
    pub fn new(selectors: &[Selector], shape: &[u64]) -> Result<Self, SelectorError> {
        let dims = resolve_selectors(selectors, shape)?;
        Ok(Self {
            dims,
            shape: shape.to_vec(),
        })
    }

    /// Return the resolved per-dimension selections.
    #[must_use]
    pub fn dims(&self) -> &[DimSelection] {
        &self.dims
    }

    /// Return the shape of the selected region.
    ///
    /// Collapsed dimensions are omitted; trailing dimensions beyond the
    /// selector length are included at full size. An empty shape denotes a
    /// scalar.
    #[must_use]
    pub fn result_shape(&self) -> ArrayShape {
        let kept = self
            .dims
            .iter()
            .filter(|dim| dim.keep_dim)
            .map(|dim| dim.indices.len() as u64);
        let trailing = self.shape[self.dims.len()..].iter().copied();
        kept.chain(trailing).collect()
    }

    /// Return the number of selected elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.result_shape().iter().product()
    }

    /// Return true if every dimension collapses and no trailing dimensions
    /// remain, i.e. the selection is a single element.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.dims.len() == self.shape.len() && self.dims.iter().all(|dim| !dim.keep_dim)
    }

    /// Compile the selection to file byte ranges.
    ///
    /// Ranges are produced in the order needed to fill a row-major output
    /// buffer sequentially, with `offset` applied to both endpoints. Runs of
    /// consecutive indices along the last selected dimension are merged into
    /// single ranges.
    #[must_use]
    pub fn byte_ranges(&self, element_size: usize, offset: ByteOffset) -> Vec<ByteRange> {
        // One index step along the last selected dimension spans the element
        // size times the full extent of any trailing unselected dimensions.
        let mut stride =
            element_size as u64 * self.shape[self.dims.len()..].iter().product::<u64>();

        let last = &self.dims[self.dims.len() - 1].indices;
        let mut byte_ranges: Vec<ByteRange> = merge_consecutive_runs(last)
            .into_iter()
            .map(|(start, length)| ByteRange::new(start * stride, (start + length) * stride))
            .collect();

        for dim in (0..self.dims.len() - 1).rev() {
            stride *= self.shape[dim + 1];
            byte_ranges = self.dims[dim]
                .indices
                .iter()
                .cartesian_product(&byte_ranges)
                .map(|(index, byte_range)| byte_range.offset(index * stride))
                .collect();
        }

        byte_ranges
            .into_iter()
            .map(|byte_range| byte_range.offset(offset))
            .collect()
    }
}

/// Merge maximal runs of consecutive indices into `(start, length)` pairs.
///
/// Indices are taken in the order given; only forward steps of exactly one
/// merge, so descending or caller-ordered index lists round-trip unchanged.
fn merge_consecutive_runs(indices: &[u64]) -> Vec<(u64, u64)> {
    let mut runs = Vec::new();
    let mut iter = indices.iter().copied();
    let Some(mut run_start) = iter.next() else {
        return runs;
    };
    let mut run_length = 1;
    for index in iter {
        if index == run_start + run_length {
            run_length += 1;
        } else {
            runs.push((run_start, run_length));
            run_start = index;
            run_length = 1;
        }
    }
    runs.push((run_start, run_length));
    runs
}
