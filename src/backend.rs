//! The backend I/O engine.
//!
//! [`DirectIoBackend`] opens a backing file and yields a [`DirectIoHandle`]
//! that fills caller buffers from byte ranges. The core of this crate only
//! consumes these traits; [`DirectIoFile`] is the default implementation,
//! reading through `O_DIRECT` so random-access workloads bypass the page
//! cache.
//!
//! Direct I/O needs support from the operating system (currently only Linux)
//! and the file system. [`DirectIoFileOptions::direct_io`] can disable it,
//! falling back to ordinary buffered reads.

use bytes::BytesMut;
use thiserror::Error;

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

#[cfg(target_os = "linux")]
use libc::O_DIRECT;
#[cfg(target_os = "linux")]
use std::os::unix::fs::OpenOptionsExt;

use crate::byte_range::{total_byte_length, validate_byte_ranges, ByteRange};

/// A backend I/O error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The file could not be opened, or the storage does not support the
    /// required I/O mode.
    #[error("unable to open {path}: {source}")]
    Open {
        /// The path of the backing file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The file is smaller than the array requires.
    #[error("file {path} is {file_size} bytes, expected at least {expected}")]
    TooSmall {
        /// The path of the backing file.
        path: PathBuf,
        /// The size of the file.
        file_size: u64,
        /// The minimum required size.
        expected: u64,
    },
    /// The file became inaccessible after it was opened.
    #[error("file {path} became inaccessible: {source}")]
    Inaccessible {
        /// The path of the backing file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The file shrank below the size it was opened with.
    #[error("file {path} shrank to {file_size} bytes, expected at least {expected}")]
    Shrunk {
        /// The path of the backing file.
        path: PathBuf,
        /// The current size of the file.
        file_size: u64,
        /// The minimum required size.
        expected: u64,
    },
}

/// Opens backing files for [`DirectArray`](crate::array::DirectArray)s.
pub trait DirectIoBackend: Send + Sync {
    /// Open the file at `path` for reading, validating that it holds at
    /// least `total_size` bytes.
    ///
    /// # Errors
    /// Returns [`BackendError::Open`] if the file cannot be opened in the
    /// required I/O mode and [`BackendError::TooSmall`] if it is smaller
    /// than `total_size`.
    fn open(&self, path: &Path, total_size: u64) -> Result<Box<dyn DirectIoHandle>, BackendError>;
}

/// An open backing file.
pub trait DirectIoHandle: Send + Sync {
    /// Read each of `byte_ranges` into the corresponding contiguous region
    /// of `buf`, in range order.
    ///
    /// The length of `buf` must equal the total length of `byte_ranges`, and
    /// every range must lie within the size the handle was opened with.
    ///
    /// # Errors
    /// Returns [`BackendError::Inaccessible`] if the file cannot be accessed
    /// and [`BackendError::Shrunk`] if it no longer holds the requested
    /// ranges.
    fn fill(&self, buf: &mut [u8], byte_ranges: &[ByteRange]) -> Result<(), BackendError>;

    /// Release the handle.
    ///
    /// Consumes the handle, so a double release is unrepresentable.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if backend resources cannot be released.
    fn close(self: Box<Self>) -> Result<(), BackendError>;
}

/// For `O_DIRECT`, we need a buffer that is aligned to the page size and is a
/// multiple of the page size.
fn bytes_aligned(size: usize) -> BytesMut {
    let align = page_size::get();
    let mut bytes = BytesMut::with_capacity(size + 2 * align);
    let offset = bytes.as_ptr().align_offset(align);
    bytes.split_off(offset)
}

/// Options for use with [`DirectIoFile`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct DirectIoFileOptions {
    direct_io: bool,
}

impl Default for DirectIoFileOptions {
    fn default() -> Self {
        Self { direct_io: true }
    }
}

impl DirectIoFileOptions {
    /// Set whether or not to enable direct I/O. Enabled by default; disable
    /// it on operating systems or file systems without `O_DIRECT` support.
    pub fn direct_io(&mut self, direct_io: bool) -> &mut Self {
        self.direct_io = direct_io;
        self
    }
}

/// The default [`DirectIoBackend`], reading files with positioned reads
/// through `O_DIRECT`.
#[derive(Debug, Clone, Default)]
pub struct DirectIoFile {
    options: DirectIoFileOptions,
}

impl DirectIoFile {
    /// Create a backend with default options (direct I/O enabled).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with `options`.
    #[must_use]
    pub fn new_with_options(options: DirectIoFileOptions) -> Self {
        Self { options }
    }
}

impl DirectIoBackend for DirectIoFile {
    fn open(&self, path: &Path, total_size: u64) -> Result<Box<dyn DirectIoHandle>, BackendError> {
        let direct_io = cfg!(target_os = "linux") && self.options.direct_io;

        let mut flags = OpenOptions::new();
        flags.read(true);
        #[cfg(target_os = "linux")]
        if direct_io {
            flags.custom_flags(O_DIRECT);
        }

        let file = flags.open(path).map_err(|source| BackendError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let file_size = file
            .metadata()
            .map_err(|source| BackendError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if file_size < total_size {
            return Err(BackendError::TooSmall {
                path: path.to_path_buf(),
                file_size,
                expected: total_size,
            });
        }

        Ok(Box::new(DirectIoFileHandle {
            file,
            path: path.to_path_buf(),
            total_size,
            direct_io,
            #[cfg(not(any(unix, windows)))]
            cursor: parking_lot::Mutex::new(()),
        }))
    }
}

/// An open file of a [`DirectIoFile`] backend.
#[derive(Debug)]
struct DirectIoFileHandle {
    file: File,
    path: PathBuf,
    total_size: u64,
    direct_io: bool,
    /// Serialises the shared seek cursor on targets without positioned
    /// reads.
    #[cfg(not(any(unix, windows)))]
    cursor: parking_lot::Mutex<()>,
}

impl DirectIoFileHandle {
    fn inaccessible(&self, source: std::io::Error) -> BackendError {
        BackendError::Inaccessible {
            path: self.path.clone(),
            source,
        }
    }

    /// Positioned read, leaving the file cursor untouched so concurrent
    /// fills do not race on a shared seek position. Targets without
    /// positioned reads fall back to seek + read under a lock.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        #[cfg(unix)]
        {
            std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)
        }
        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let _cursor = self.cursor.lock();
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))?;
            file.read(buf)
        }
    }

    /// Read bytes `[span_start, span_start + buf.len())` of the file,
    /// stopping early only at end of file. Returns the bytes read.
    fn read_span(&self, buf: &mut [u8], span_start: u64) -> Result<usize, BackendError> {
        let mut nread = 0;
        while nread < buf.len() {
            let n = self
                .read_at(&mut buf[nread..], span_start + nread as u64)
                .map_err(|err| self.inaccessible(err))?;
            if n == 0 {
                break;
            }
            nread += n;
        }
        Ok(nread)
    }
}

impl DirectIoHandle for DirectIoFileHandle {
    fn fill(&self, buf: &mut [u8], byte_ranges: &[ByteRange]) -> Result<(), BackendError> {
        debug_assert_eq!(buf.len() as u64, total_byte_length(byte_ranges));
        debug_assert!(validate_byte_ranges(byte_ranges, self.total_size).is_ok());

        // Re-check the file size on every fill so an externally truncated
        // file is reported rather than read past end of file.
        let file_size = self
            .file
            .metadata()
            .map_err(|err| self.inaccessible(err))?
            .len();
        if file_size < self.total_size {
            return Err(BackendError::Shrunk {
                path: self.path.clone(),
                file_size,
                expected: self.total_size,
            });
        }

        let page = page_size::get() as u64;
        let mut out_offset = 0usize;
        for byte_range in byte_ranges {
            let range_len = usize::try_from(byte_range.length()).unwrap();
            let out = &mut buf[out_offset..out_offset + range_len];
            if self.direct_io {
                // `O_DIRECT` reads must be page aligned in offset and
                // length, so read the covering span into an aligned scratch
                // buffer and copy the requested bytes out.
                let span_start = byte_range.start / page * page;
                let span_end = byte_range.end.next_multiple_of(page);
                let span_len = usize::try_from(span_end - span_start).unwrap();
                let mut scratch = bytes_aligned(span_len);
                scratch.resize(span_len, 0);
                let nread = self.read_span(&mut scratch, span_start)?;
                let skip = usize::try_from(byte_range.start - span_start).unwrap();
                if nread < skip + range_len {
                    return Err(BackendError::Shrunk {
                        path: self.path.clone(),
                        file_size: span_start + nread as u64,
                        expected: self.total_size,
                    });
                }
                out.copy_from_slice(&scratch[skip..skip + range_len]);
            } else {
                let nread = self.read_span(out, byte_range.start)?;
                if nread < range_len {
                    return Err(BackendError::Shrunk {
                        path: self.path.clone(),
                        file_size: byte_range.start + nread as u64,
                        expected: self.total_size,
                    });
                }
            }
            out_offset += range_len;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), BackendError> {
        // Dropping the file releases the descriptor.
        Ok(())
    }
}
