//! Scratch files with guaranteed cleanup.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A throwaway file deleted when the guard drops, on every exit path of the
/// enclosing operation. Used for in-memory byte capture (a backend may not
/// support piping binary data to stdout) and for Variant C's generated
/// script.
pub struct ScratchFile {
    inner: NamedTempFile,
}

impl ScratchFile {
    /// Create a new empty scratch file with the given suffix.
    pub fn new(suffix: &str) -> std::io::Result<Self> {
        let inner = tempfile::Builder::new()
            .prefix("fetch-mux-")
            .suffix(suffix)
            .tempfile()?;
        Ok(Self { inner })
    }

    /// Create a scratch file pre-populated with `contents`.
    pub fn with_contents(suffix: &str, contents: &str) -> std::io::Result<Self> {
        let mut scratch = Self::new(suffix)?;
        scratch.inner.write_all(contents.as_bytes())?;
        scratch.inner.flush()?;
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.inner.path().to_path_buf()
    }

    /// Read the file back as raw bytes.
    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.inner.path())
    }
}

// Deletion is best-effort and silent: NamedTempFile's Drop ignores removal
// errors, which is exactly the contract here.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_on_drop() {
        let path = {
            let scratch = ScratchFile::new(".bin").unwrap();
            assert!(scratch.path().exists());
            scratch.path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_deleted_on_panic_unwind() {
        let path_holder = std::sync::Mutex::new(None::<PathBuf>);
        let result = std::panic::catch_unwind(|| {
            let scratch = ScratchFile::new(".tmp").unwrap();
            *path_holder.lock().unwrap() = Some(scratch.path_buf());
            panic!("boom");
        });
        assert!(result.is_err());
        let path = path_holder.lock().unwrap().take().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_contents_round_trip() {
        let scratch = ScratchFile::with_contents(".ps1", "Write-Output hi\n").unwrap();
        assert_eq!(scratch.read_bytes().unwrap(), b"Write-Output hi\n");
        assert!(scratch.path().to_string_lossy().ends_with(".ps1"));
    }
}
