//! A logical array view over a flat binary file, read with direct I/O.
//!
//! A [`DirectArray`](array::DirectArray) presents a file as an N-dimensional
//! row-major array of a fixed [`DataType`](data_type::DataType) and reads it
//! through `O_DIRECT`, bypassing the operating system's page cache. Heavy
//! random-access read workloads are then not penalised by sequential-read
//! caching heuristics, and random-read throughput scales with the number of
//! concurrent reading threads.
//!
//! Reads are indexed with per-dimension [`Selector`](selector::Selector)s
//! (single indices, stepped ranges, explicit index lists, boolean masks).
//! Each read resolves the selectors, compiles them to the minimal set of
//! byte ranges by merging consecutive elements along the innermost
//! dimension, and fills a freshly allocated buffer through the
//! [`backend`].
//!
//! The view is read-only: writes, caching, and prefetching are out of scope.
//!
//! ## Example
//! ```rust,no_run
//! use direct_array::array::DirectArray;
//! use direct_array::data_type::DataType;
//! use direct_array::selector::Selector;
//!
//! // A (10, 4) array of uint64, 64 bytes into the file.
//! let array = DirectArray::open("data.bin", vec![10, 4], DataType::UInt64, 64)?;
//!
//! // Rows 2..5 of column 1.
//! let (column, shape) =
//!     array.read_elements::<u64>(&[Selector::from(2..5), Selector::Index(1)])?;
//! assert_eq!(shape, vec![3]);
//!
//! array.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]

pub mod array;
pub mod backend;
pub mod byte_range;
pub mod data_type;
pub mod selection;
pub mod selector;
