//! Sample sources: sequential byte streams of raw C8 data
//!
//! The replay thread only needs `read`; opening is done by a `SourceOpener`
//! so the control surface can validate the file before any pipeline exists
//! and reopen it on a loop restart.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sequential reader of raw sample bytes
pub trait SampleSource: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` signals end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Short description for log lines
    fn describe(&self) -> String {
        "sample source".to_string()
    }
}

/// Opens sample sources by path
pub trait SourceOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn SampleSource>>;
}

/// Any `Read` as a sample source (in-memory data, pipes)
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read + Send> SampleSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// C8 waveform file on the storage medium
pub struct FileSource {
    path: PathBuf,
    file: File,
}

impl FileSource {
    /// Open `path` for reading; directories and missing files are rejected here
    pub fn open(path: &Path) -> Result<Self> {
        let open_error = |source: io::Error| Error::SourceOpen {
            path: path.to_path_buf(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(open_error)?;
        if !metadata.is_file() {
            return Err(open_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let file = File::open(path).map_err(open_error)?;
        debug!("Opened sample file {} ({} bytes)", path.display(), metadata.len());

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Opens `FileSource`s
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl SourceOpener for FileOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn SampleSource>> {
        Ok(Box::new(FileSource::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_file_source_reads_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("LWF.C8");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[1, 2, 3, 4, 5])
            .unwrap();

        let mut source = FileOpener.open(&path).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &[1, 2, 3, 4, 5]);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.describe(), path.display().to_string());
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.C8");

        match FileSource::open(&path) {
            Err(Error::SourceOpen { path: p, source }) => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("Expected SourceOpen, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_directory_is_open_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            FileSource::open(dir.path()),
            Err(Error::SourceOpen { .. })
        ));
    }
}
