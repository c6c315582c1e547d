//! Artifact descriptors for files that cross stage boundaries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// A single file permitted to cross a stage boundary.
///
/// The descriptor records where the artifact lives inside its stage's
/// snapshot along with its size and content digest, so transfers and
/// reproducibility checks can reason about it without re-reading the
/// producing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Image-internal path of the artifact within the producing snapshot.
    pub path: PathBuf,

    /// The stage that produced the artifact.
    pub from_stage: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// SHA-256 digest of the contents, hex-encoded.
    pub sha256: String,

    /// When the descriptor was captured (ISO 8601).
    pub captured_at: String,
}

impl Artifact {
    /// Describes the file at `host_path` as an artifact at image-internal
    /// `path` produced by `from_stage`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn describe(
        host_path: &Path,
        path: impl Into<PathBuf>,
        from_stage: impl Into<String>,
    ) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(host_path)?;
        Ok(Self {
            path: path.into(),
            from_stage: from_stage.into(),
            size_bytes: metadata.len(),
            sha256: sha256_file(host_path)?,
            captured_at: crate::utils::iso_timestamp(),
        })
    }
}

/// Computes the hex-encoded SHA-256 digest of a file's contents.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sha256_file_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("payload.bin");
        std::fs::write(&file, b"abc").unwrap();

        // SHA-256("abc")
        assert_eq!(
            sha256_file(&file).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_describe_captures_size_and_digest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("libengine.so");
        std::fs::write(&file, vec![0u8; 128]).unwrap();

        let artifact = Artifact::describe(&file, "opt/engine/libengine.so", "builder").unwrap();
        assert_eq!(artifact.size_bytes, 128);
        assert_eq!(artifact.from_stage, "builder");
        assert_eq!(artifact.path, PathBuf::from("opt/engine/libengine.so"));
        assert_eq!(artifact.sha256.len(), 64);
    }

    #[test]
    fn test_identical_contents_identical_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.so");
        let b = dir.path().join("b.so");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        assert_eq!(sha256_file(&a).unwrap(), sha256_file(&b).unwrap());
    }
}
