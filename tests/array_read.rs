use direct_array::array::{ArrayCloseError, ArrayReadError, DirectArray};
use direct_array::backend::{
    BackendError, DirectIoBackend, DirectIoFile, DirectIoFileOptions, DirectIoHandle,
};
use direct_array::byte_range::ByteRange;
use direct_array::data_type::DataType;
use direct_array::selector::Selector;

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};

/// Write a (10, 4) array of uint64 with element values `row * 4 + col`,
/// preceded by `offset` padding bytes.
fn write_test_file(offset: usize) -> Result<(tempfile::TempDir, PathBuf), Box<dyn Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.bin");
    let mut file = std::fs::File::create(&path)?;
    file.write_all(&vec![0xFFu8; offset])?;
    for i in 0..40u64 {
        file.write_all(&i.to_le_bytes())?;
    }
    Ok((dir, path))
}

fn buffered() -> DirectIoFile {
    let mut options = DirectIoFileOptions::default();
    options.direct_io(false);
    DirectIoFile::new_with_options(options)
}

#[test]
fn read_end_to_end() -> Result<(), Box<dyn Error>> {
    let (_dir, path) = write_test_file(64)?;
    let array = DirectArray::open_with(&buffered(), &path, vec![10, 4], DataType::UInt64, 64)?;
    assert_eq!(array.total_size(), 64 + 10 * 4 * 8);

    // Rows 2..5 of column 1.
    let (elements, shape) =
        array.read_elements::<u64>(&[Selector::from(2..5), Selector::Index(1)])?;
    assert_eq!(shape, vec![3]);
    assert_eq!(elements, vec![2 * 4 + 1, 3 * 4 + 1, 4 * 4 + 1]);

    // A full row, one contiguous range.
    let (elements, shape) = array.read_elements::<u64>(&[Selector::Index(3)])?;
    assert_eq!(shape, vec![4]);
    assert_eq!(elements, vec![12, 13, 14, 15]);

    // Explicit row list with a run to merge, full trailing dimension.
    let (elements, shape) =
        array.read_elements::<u64>(&[Selector::Indices(vec![2, 3, 7])])?;
    assert_eq!(shape, vec![3, 4]);
    assert_eq!(
        elements,
        [2u64, 3, 7]
            .iter()
            .flat_map(|row| (row * 4..row * 4 + 4))
            .collect::<Vec<_>>()
    );

    // Boolean mask over rows, strided columns.
    let mut mask = vec![false; 10];
    mask[1] = true;
    mask[8] = true;
    let (elements, shape) = array
        .read_elements::<u64>(&[Selector::Mask(mask), Selector::slice(None, None, 2)])?;
    assert_eq!(shape, vec![2, 2]);
    assert_eq!(elements, vec![4, 6, 32, 34]);

    // A scalar from negative indices.
    let result = array.read(&[Selector::Index(-1), Selector::Index(-1)])?;
    assert!(result.is_scalar());
    assert_eq!(result.elements::<u64>()?, vec![39]);

    array.close()?;
    Ok(())
}

#[test]
fn read_selector_errors() -> Result<(), Box<dyn Error>> {
    let (_dir, path) = write_test_file(0)?;
    let array = DirectArray::open_with(&buffered(), &path, vec![10, 4], DataType::UInt64, 0)?;

    assert!(matches!(array.read(&[]), Err(ArrayReadError::Selector(_))));
    assert!(matches!(
        array.read(&[Selector::Index(0), Selector::Index(0), Selector::Index(0)]),
        Err(ArrayReadError::Selector(_))
    ));
    assert!(matches!(
        array.read(&[Selector::Index(10)]),
        Err(ArrayReadError::Selector(_))
    ));
    assert!(matches!(
        array.read(&[Selector::Mask(vec![true; 9])]),
        Err(ArrayReadError::Selector(_))
    ));
    Ok(())
}

#[test]
fn open_errors() -> Result<(), Box<dyn Error>> {
    let (_dir, path) = write_test_file(0)?;
    // 320 bytes of payload cannot hold offset 1.
    let result = DirectArray::open_with(&buffered(), &path, vec![10, 4], DataType::UInt64, 1);
    assert!(result.is_err());

    let missing = _dir.path().join("missing.bin");
    let result = DirectArray::open_with(&buffered(), &missing, vec![10, 4], DataType::UInt64, 0);
    assert!(result.is_err());
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn read_direct_io() -> Result<(), Box<dyn Error>> {
    let (_dir, path) = write_test_file(0)?;
    // Not all file systems support O_DIRECT (notably tmpfs); fall through
    // when the open itself is refused.
    let array = match DirectArray::open(&path, vec![10, 4], DataType::UInt64, 0) {
        Ok(array) => array,
        Err(_) => return Ok(()),
    };
    let (elements, shape) =
        array.read_elements::<u64>(&[Selector::from(2..5), Selector::Index(1)])?;
    assert_eq!(shape, vec![3]);
    assert_eq!(elements, vec![9, 13, 17]);
    array.close()?;
    Ok(())
}

/// A backend whose fills block on a pair of barriers, to hold reads in
/// flight while close attempts run.
struct GatedBackend {
    in_flight: Arc<Barrier>,
    release: Arc<Barrier>,
}

struct GatedHandle {
    in_flight: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl DirectIoBackend for GatedBackend {
    fn open(&self, _path: &Path, _total_size: u64) -> Result<Box<dyn DirectIoHandle>, BackendError> {
        Ok(Box::new(GatedHandle {
            in_flight: self.in_flight.clone(),
            release: self.release.clone(),
        }))
    }
}

impl DirectIoHandle for GatedHandle {
    fn fill(&self, buf: &mut [u8], _byte_ranges: &[ByteRange]) -> Result<(), BackendError> {
        self.in_flight.wait();
        self.release.wait();
        buf.fill(0);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
}

#[test]
fn close_busy_while_read_outstanding() {
    let in_flight = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let backend = GatedBackend {
        in_flight: in_flight.clone(),
        release: release.clone(),
    };
    let array =
        DirectArray::open_with(&backend, "test.bin", vec![10, 4], DataType::UInt64, 0).unwrap();

    std::thread::scope(|scope| {
        let reader = scope.spawn(|| array.read(&[Selector::Index(0)]).unwrap());

        // The read is now holding the guard inside the backend fill.
        in_flight.wait();
        assert!(matches!(array.close(), Err(ArrayCloseError::Busy)));

        release.wait();
        let result = reader.join().unwrap();
        assert_eq!(result.shape(), &[4]);
    });

    // With the reader finished, the same close succeeds exactly once.
    array.close().unwrap();
    assert!(matches!(array.close(), Err(ArrayCloseError::AlreadyClosed)));
    assert!(matches!(
        array.read(&[Selector::Index(0)]),
        Err(ArrayReadError::Closed)
    ));
}

#[test]
fn concurrent_reads() -> Result<(), Box<dyn Error>> {
    let (_dir, path) = write_test_file(0)?;
    let array = Arc::new(DirectArray::open_with(
        &buffered(),
        &path,
        vec![10, 4],
        DataType::UInt64,
        0,
    )?);

    let mut threads = Vec::new();
    for row in 0..10u64 {
        let array = array.clone();
        threads.push(std::thread::spawn(move || {
            for _ in 0..100 {
                let (elements, _) = array
                    .read_elements::<u64>(&[Selector::Index(row as i64)])
                    .unwrap();
                assert_eq!(elements[0], row * 4);
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    Arc::try_unwrap(array).ok().unwrap().close()?;
    Ok(())
}
