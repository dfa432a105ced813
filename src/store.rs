//! Storage provider contract for frame and metadata access
//!
//! The engine never touches `std::fs` directly; any provider satisfying
//! stat/read/open can back a playback unit (local disk, archive mounts,
//! test fixtures).

use std::fs;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

/// Minimal info from `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub is_dir: bool,
    pub len: u64,
}

/// Seekable read stream handed to the image decoder.
pub trait DecodeStream: Read + Seek + Send {}
impl<T: Read + Seek + Send> DecodeStream for T {}

/// Filesystem-like provider: the three operations the engine consumes.
pub trait Store: Send + Sync {
    /// `None` when the entry does not exist.
    fn stat(&self, path: &Path) -> Option<EntryInfo>;

    /// Whole-file read (metadata records, small frames).
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Open a stream suitable for incremental decode.
    fn open(&self, path: &Path) -> io::Result<Box<dyn DecodeStream>>;

    /// Directory listing, unordered. Default errors for providers without
    /// enumeration support.
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let _ = dir;
        Err(io::Error::new(io::ErrorKind::Unsupported, "listing not supported"))
    }
}

/// Local-disk provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl Store for FsStore {
    fn stat(&self, path: &Path) -> Option<EntryInfo> {
        fs::metadata(path).ok().map(|m| EntryInfo {
            is_dir: m.is_dir(),
            len: m.len(),
        })
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn DecodeStream>> {
        Ok(Box::new(BufReader::new(fs::File::open(path)?)))
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                out.push(entry.path());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::File::create(&path).unwrap().write_all(b"abc").unwrap();

        let store = FsStore;
        let info = store.stat(&path).unwrap();
        assert!(!info.is_dir);
        assert_eq!(info.len, 3);
        assert_eq!(store.read(&path).unwrap(), b"abc");
        assert!(store.stat(&dir.path().join("missing")).is_none());

        let listed = store.list(dir.path()).unwrap();
        assert_eq!(listed, vec![path]);
    }
}
