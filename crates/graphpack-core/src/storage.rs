use crate::error::ProjectError;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub fn read_archive(path: &Path) -> Result<Vec<u8>, ProjectError> {
    debug!(path = %path.display(), "reading archive");
    let bytes = fs::read(path)?;
    info!(bytes = bytes.len(), "archive read");
    Ok(bytes)
}

/// Writes a sibling `.tmp` file, then renames it over `path`.
pub fn write_archive(path: &Path, bytes: &[u8]) -> Result<(), ProjectError> {
    debug!(path = %path.display(), bytes = bytes.len(), "writing archive");
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("project.zip");
        write_archive(&path, b"first").unwrap();
        write_archive(&path, b"second").unwrap();
        assert_eq!(read_archive(&path).unwrap(), b"second");
        assert!(!dir.path().join("project.tmp").exists());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_archive(&dir.path().join("absent.zip")).unwrap_err();
        assert!(matches!(err, ProjectError::Io(_)));
    }
}
