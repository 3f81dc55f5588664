//! The [`DirectArray`] view.
//!
//! A [`DirectArray`] presents a flat binary file as an N-dimensional
//! row-major array of a fixed [`DataType`](crate::data_type::DataType).
//! [`DirectArray::read`] accepts a [`Selector`] sequence, computes the byte
//! ranges of the selection, and fills a freshly allocated buffer through the
//! backend.
//!
//! Reads may run concurrently from any number of threads; each read holds a
//! shared guard on the backend handle for its duration, and [`DirectArray::close`]
//! only succeeds once no reads are outstanding.

use parking_lot::RwLock;
use thiserror::Error;

use std::path::{Path, PathBuf};

use crate::{
    backend::{BackendError, DirectIoBackend, DirectIoFile, DirectIoHandle},
    byte_range::total_byte_length,
    data_type::DataType,
    selection::Selection,
    selector::{Selector, SelectorError},
};

/// An alias for array indices.
pub type ArrayIndices = Vec<u64>;

/// An alias for an array shape.
pub type ArrayShape = Vec<u64>;

/// An array creation error.
#[derive(Debug, Error)]
pub enum ArrayCreateError {
    /// The shape is empty or has a zero-size dimension.
    #[error("invalid array shape {_0:?}, dimensions must be nonempty and positive")]
    InvalidShape(ArrayShape),
    /// The byte size of the array exceeds [`u64::MAX`].
    #[error("array of shape {shape:?} at offset {offset} overflows a byte length")]
    SizeOverflow {
        /// The shape of the array.
        shape: ArrayShape,
        /// The byte offset of the array within the backing file.
        offset: u64,
    },
    /// The backend could not open the backing file.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// An array read error.
#[derive(Debug, Error)]
pub enum ArrayReadError {
    /// A selector failed to resolve.
    #[error(transparent)]
    Selector(#[from] SelectorError),
    /// A backend error during the fill.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The array has been closed.
    #[error("the array has been closed")]
    Closed,
    /// The requested element type does not match the byte length of the
    /// result.
    #[error(transparent)]
    IncompatibleElementType(#[from] IncompatibleElementTypeError),
    /// The compiled byte ranges do not account for the result buffer.
    #[error("byte ranges total {byte_ranges} bytes for a result of {expected} bytes")]
    Internal {
        /// The total length of the compiled byte ranges.
        byte_ranges: u64,
        /// The length of the result buffer.
        expected: u64,
    },
}

/// An array close error.
#[derive(Debug, Error)]
pub enum ArrayCloseError {
    /// Reads are outstanding. The array remains open; close can be retried
    /// once they finish.
    #[error("the array is still in use")]
    Busy,
    /// The array was already closed.
    #[error("the array has already been closed")]
    AlreadyClosed,
    /// The backend failed to release its resources.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// An incompatible element type error.
#[derive(Copy, Clone, Debug, Error)]
#[error("bytes of length {_0} are incompatible with elements of size {_1}")]
pub struct IncompatibleElementTypeError(usize, usize);

/// The bytes of a read, with the shape of the selected region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArrayBytes {
    bytes: Vec<u8>,
    shape: ArrayShape,
}

impl ArrayBytes {
    /// Return the underlying bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the underlying bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Return the shape of the selected region. Empty for a scalar.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return true if the result is a single scalar element.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Copy the bytes into a `Vec<T>`.
    ///
    /// # Errors
    /// Returns [`IncompatibleElementTypeError`] if the byte length is not
    /// `num_elements * size_of::<T>()`.
    pub fn elements<T: bytemuck::Pod>(&self) -> Result<Vec<T>, IncompatibleElementTypeError> {
        let element_size = core::mem::size_of::<T>();
        if self.bytes.len() as u64 == self.num_elements() * element_size as u64 {
            Ok(bytemuck::allocation::pod_collect_to_vec(&self.bytes))
        } else {
            Err(IncompatibleElementTypeError(self.bytes.len(), element_size))
        }
    }
}

/// An N-dimensional row-major array view over a flat binary file, read with
/// direct I/O.
pub struct DirectArray {
    path: PathBuf,
    shape: ArrayShape,
    data_type: DataType,
    offset: u64,
    num_elements: u64,
    /// The access guard. The lock's reader count tracks in-flight reads and
    /// [`None`] marks the view closed, so a read can only begin against an
    /// open handle and close only succeeds with no readers outstanding.
    handle: RwLock<Option<Box<dyn DirectIoHandle>>>,
}

impl DirectArray {
    /// Open a view over the file at `path` holding an array of `shape` and
    /// `data_type`, starting `offset` bytes into the file, with the default
    /// [`DirectIoFile`] backend.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if the shape is invalid, `offset`
    /// plus the array byte size overflows, the file cannot be opened for
    /// direct I/O, or the file is smaller than `offset` plus the array byte
    /// size.
    pub fn open(
        path: impl AsRef<Path>,
        shape: ArrayShape,
        data_type: DataType,
        offset: u64,
    ) -> Result<Self, ArrayCreateError> {
        Self::open_with(&DirectIoFile::new(), path, shape, data_type, offset)
    }

    /// Open a view with a caller-provided backend.
    ///
    /// # Errors
    /// See [`DirectArray::open`].
    pub fn open_with(
        backend: &dyn DirectIoBackend,
        path: impl AsRef<Path>,
        shape: ArrayShape,
        data_type: DataType,
        offset: u64,
    ) -> Result<Self, ArrayCreateError> {
        let path = path.as_ref().to_path_buf();
        if shape.is_empty() || shape.iter().any(|size| *size == 0) {
            return Err(ArrayCreateError::InvalidShape(shape));
        }
        let num_elements = shape
            .iter()
            .try_fold(1u64, |count, size| count.checked_mul(*size));
        let total_size = num_elements
            .and_then(|count| count.checked_mul(data_type.size() as u64))
            .and_then(|nbytes| nbytes.checked_add(offset));
        let (Some(num_elements), Some(total_size)) = (num_elements, total_size) else {
            return Err(ArrayCreateError::SizeOverflow { shape, offset });
        };
        let handle = backend.open(&path, total_size)?;
        Ok(Self {
            path,
            shape,
            data_type,
            offset,
            num_elements,
            handle: RwLock::new(Some(handle)),
        })
    }

    /// Return the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the shape of the array.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the data type of the array.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Return the dimensionality of the array.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Return the byte offset of the array within the backing file.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Return the number of elements of the array.
    #[must_use]
    pub const fn num_elements(&self) -> u64 {
        self.num_elements
    }

    /// Return the size in bytes of an element.
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.data_type.size()
    }

    /// Return the size in bytes of the array payload.
    #[must_use]
    pub const fn nbytes(&self) -> u64 {
        self.num_elements * self.data_type.size() as u64
    }

    /// Return the byte offset plus the array payload size, the minimum
    /// backing file size.
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.offset + self.nbytes()
    }

    /// Read the elements selected by `selectors` into a freshly allocated
    /// buffer.
    ///
    /// Dimensions beyond the selector length are fully selected. A selector
    /// of all single indices over every dimension yields a scalar (an empty
    /// result shape).
    ///
    /// # Errors
    /// Returns an [`ArrayReadError`] if a selector fails to resolve, the
    /// array is closed, or the backend fails.
    ///
    /// # Panics
    /// Panics if the result byte size exceeds [`usize::MAX`].
    pub fn read(&self, selectors: &[Selector]) -> Result<ArrayBytes, ArrayReadError> {
        // Scoped acquisition: the shared guard is dropped on every exit
        // path, and only gates close, not other reads.
        let guard = self.handle.read();
        let handle = guard.as_ref().ok_or(ArrayReadError::Closed)?;

        let selection = Selection::new(selectors, &self.shape)?;
        let byte_ranges = selection.byte_ranges(self.element_size(), self.offset);
        let expected = selection.num_elements() * self.element_size() as u64;
        let byte_ranges_len = total_byte_length(&byte_ranges);
        if byte_ranges_len != expected {
            return Err(ArrayReadError::Internal {
                byte_ranges: byte_ranges_len,
                expected,
            });
        }

        let mut bytes = vec![0u8; usize::try_from(expected).unwrap()];
        handle.fill(&mut bytes, &byte_ranges)?;
        Ok(ArrayBytes {
            bytes,
            shape: selection.result_shape(),
        })
    }

    /// Read the elements selected by `selectors` as a `Vec<T>`, with the
    /// shape of the selected region.
    ///
    /// # Errors
    /// As [`DirectArray::read`], and
    /// [`ArrayReadError::IncompatibleElementType`] if `size_of::<T>()` does
    /// not match the element size of the data type.
    pub fn read_elements<T: bytemuck::Pod>(
        &self,
        selectors: &[Selector],
    ) -> Result<(Vec<T>, ArrayShape), ArrayReadError> {
        let array_bytes = self.read(selectors)?;
        let elements = array_bytes.elements()?;
        Ok((elements, array_bytes.shape))
    }

    /// Close the view, releasing the backend handle.
    ///
    /// # Errors
    /// Returns [`ArrayCloseError::Busy`] while reads are outstanding (the
    /// view stays open and close can be retried) and
    /// [`ArrayCloseError::AlreadyClosed`] on a second close. Of concurrent
    /// closes, at most one succeeds.
    pub fn close(&self) -> Result<(), ArrayCloseError> {
        let Some(mut guard) = self.handle.try_write() else {
            return Err(ArrayCloseError::Busy);
        };
        let handle = guard.take().ok_or(ArrayCloseError::AlreadyClosed)?;
        handle.close()?;
        Ok(())
    }
}

impl Drop for DirectArray {
    /// Best-effort close. Reads cannot be outstanding here, since dropping
    /// requires exclusive access; a backend failure is logged rather than
    /// raised, so explicit [`DirectArray::close`] remains the deterministic
    /// error-signaling path.
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            if let Err(err) = handle.close() {
                log::warn!("error closing array over {}: {err}", self.path.display());
            }
        }
    }
}

impl core::fmt::Debug for DirectArray {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DirectArray")
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("data_type", &self.data_type)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
