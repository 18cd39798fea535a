//! GGUF model file checks
//!
//! Verifies that a weights file looks like a GGUF container before it is
//! handed to llama.cpp, so a missing or foreign file surfaces as a clear
//! error instead of a backend abort.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Magic bytes at the start of every GGUF file
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// Oldest and newest GGUF container versions llama.cpp still reads
pub const MIN_GGUF_VERSION: u32 = 1;
pub const MAX_GGUF_VERSION: u32 = 3;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("Invalid GGUF magic in {0}")]
    BadMagic(PathBuf),
    #[error("Unsupported GGUF version {version} in {path}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("Truncated GGUF header in {0}")]
    Truncated(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Header fields read from a GGUF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufMetadata {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
    pub file_size: u64,
}

/// Check that `path` is a readable GGUF file and return its header.
pub fn validate_gguf(path: impl AsRef<Path>) -> Result<GgufMetadata, ModelError> {
    let path = path.as_ref();

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ModelError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(ModelError::NotAFile(path.to_path_buf()));
    }

    let mut file = File::open(path)?;

    let mut magic = [0u8; 4];
    read_exact_or_truncated(&mut file, &mut magic, path)?;
    if magic != GGUF_MAGIC {
        return Err(ModelError::BadMagic(path.to_path_buf()));
    }

    let version = u32::from_le_bytes(read_array(&mut file, path)?);
    if !(MIN_GGUF_VERSION..=MAX_GGUF_VERSION).contains(&version) {
        return Err(ModelError::UnsupportedVersion {
            path: path.to_path_buf(),
            version,
        });
    }

    // v1 stored the counts as u32, later versions as u64
    let (tensor_count, metadata_kv_count) = if version == 1 {
        (
            u32::from_le_bytes(read_array(&mut file, path)?) as u64,
            u32::from_le_bytes(read_array(&mut file, path)?) as u64,
        )
    } else {
        (
            u64::from_le_bytes(read_array(&mut file, path)?),
            u64::from_le_bytes(read_array(&mut file, path)?),
        )
    };

    Ok(GgufMetadata {
        version,
        tensor_count,
        metadata_kv_count,
        file_size: meta.len(),
    })
}

fn read_array<const N: usize>(file: &mut File, path: &Path) -> Result<[u8; N], ModelError> {
    let mut buf = [0u8; N];
    read_exact_or_truncated(file, &mut buf, path)?;
    Ok(buf)
}

fn read_exact_or_truncated(file: &mut File, buf: &mut [u8], path: &Path) -> Result<(), ModelError> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ModelError::Truncated(path.to_path_buf())
        } else {
            ModelError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_header(version: u32, tensors: u64, kvs: u64) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&GGUF_MAGIC).unwrap();
        file.write_all(&version.to_le_bytes()).unwrap();
        file.write_all(&tensors.to_le_bytes()).unwrap();
        file.write_all(&kvs.to_le_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_valid_v3_header() {
        let file = write_header(3, 291, 24);
        let meta = validate_gguf(file.path()).unwrap();
        assert_eq!(meta.version, 3);
        assert_eq!(meta.tensor_count, 291);
        assert_eq!(meta.metadata_kv_count, 24);
        assert_eq!(meta.file_size, 24);
    }

    #[test]
    fn test_v1_header_uses_u32_counts() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&GGUF_MAGIC).unwrap();
        file.write_all(&1u32.to_le_bytes()).unwrap();
        file.write_all(&7u32.to_le_bytes()).unwrap();
        file.write_all(&3u32.to_le_bytes()).unwrap();
        file.flush().unwrap();

        let meta = validate_gguf(file.path()).unwrap();
        assert_eq!(meta.tensor_count, 7);
        assert_eq!(meta.metadata_kv_count, 3);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_gguf(dir.path().join("model_quantized.q4.gguf")).unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_gguf(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::NotAFile(_)));
    }

    #[test]
    fn test_bad_magic() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04 definitely not gguf").unwrap();
        file.flush().unwrap();
        let err = validate_gguf(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::BadMagic(_)));
    }

    #[test]
    fn test_unsupported_version() {
        let file = write_header(42, 1, 1);
        let err = validate_gguf(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::UnsupportedVersion { version: 42, .. }
        ));
    }

    #[test]
    fn test_truncated_header() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&GGUF_MAGIC).unwrap();
        file.write_all(&3u32.to_le_bytes()).unwrap();
        file.flush().unwrap();
        let err = validate_gguf(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::Truncated(_)));
    }
}
