//! Filesystem operations for stage workspaces and snapshots.
//!
//! All image-internal paths are normalized to relative paths before they
//! touch the host filesystem; a path may never escape its stage root.

use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Error indicating an image-internal path tried to escape its root.
#[derive(Debug, Clone)]
pub struct PathEscapeError {
    /// The offending path.
    pub path: String,
}

impl std::fmt::Display for PathEscapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Path '{}' escapes the stage filesystem root",
            self.path
        )
    }
}

impl std::error::Error for PathEscapeError {}

/// Normalizes an image-internal path to a relative path under the stage
/// root.
///
/// Leading `/` is treated as the image root; `.` components are dropped.
/// `..` components are rejected outright rather than resolved.
///
/// # Errors
///
/// Returns `PathEscapeError` if the path contains `..` or a non-normal
/// component.
pub fn normalize_image_path(path: impl AsRef<Path>) -> Result<PathBuf, PathEscapeError> {
    let path = path.as_ref();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathEscapeError {
                    path: path.display().to_string(),
                });
            }
        }
    }

    Ok(normalized)
}

/// Recursively copies a directory tree, returning the number of files
/// copied.
///
/// Symlinks are not followed; they are skipped.
///
/// # Errors
///
/// Returns the first I/O error encountered.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<u64> {
    let mut copied = 0;

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
        // Symlinks are intentionally skipped.
    }

    Ok(copied)
}

/// Copies a single file to `dest`, creating parent directories as needed.
///
/// If `dest` names an existing directory, the file keeps its source file
/// name inside it.
///
/// # Errors
///
/// Returns the first I/O error encountered.
pub fn copy_file_into(src: &Path, dest: &Path) -> io::Result<PathBuf> {
    let target = if dest.is_dir() {
        match src.file_name() {
            Some(name) => dest.join(name),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("source '{}' has no file name", src.display()),
                ))
            }
        }
    } else {
        dest.to_path_buf()
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, &target)?;
    Ok(target)
}
