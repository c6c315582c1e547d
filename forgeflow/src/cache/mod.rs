//! Dependency-layer cache.
//!
//! The one optimization in the staged-build model: a stage's manifest
//! copies and cached runs form a "dependency layer" whose filesystem can
//! be reused across invocations. The cache key is derived from the base
//! reference, the manifest file contents, and the cached commands -
//! never from source copies - so source-only edits keep the key stable.
//!
//! The store is append-only and read-shared: each invocation computes
//! its own key and never mutates an existing entry, so no locking
//! discipline is needed across processes.

use crate::core::sha256_file;
use crate::errors::BuildError;
use crate::pipeline::{CopyLayer, StageSpec, Step};
use crate::utils::copy_tree;
use dashmap::DashMap;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Metadata stored alongside each cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LayerMeta {
    key: String,
    base: String,
    created_at: String,
}

/// An on-disk, append-only store of dependency-layer filesystems.
#[derive(Debug)]
pub struct LayerCache {
    root: PathBuf,
    index: DashMap<String, PathBuf>,
}

impl LayerCache {
    /// Opens (or creates) a cache rooted at `root`, indexing any
    /// existing entries.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root cannot be created or scanned.
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let index = DashMap::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() && path.join("meta.json").is_file() {
                if let Some(key) = entry.file_name().to_str() {
                    index.insert(key.to_string(), path);
                }
            }
        }

        Ok(Self { root, index })
    }

    /// Computes the dependency-layer key for a stage.
    ///
    /// Returns `None` when the stage has no cacheable layer. The key is
    /// an md5 over the base reference, the digests of manifest copy-in
    /// contents (an absent optional input hashes as absent), and the
    /// argv of cached runs.
    ///
    /// # Errors
    ///
    /// Returns `SourceNotFound` if a required manifest input is missing.
    pub fn key_for(stage: &StageSpec) -> Result<Option<String>, BuildError> {
        if !stage.has_dependency_layer() {
            return Ok(None);
        }

        let mut hasher = Md5::new();
        hasher.update(stage.base.to_string().as_bytes());

        for step in stage.layer_prefix() {
            match step {
                Step::Workdir { path } => {
                    hasher.update(b"\x1fworkdir\x1f");
                    hasher.update(path.to_string_lossy().as_bytes());
                }
                Step::CopyIn {
                    sources,
                    dest,
                    layer: CopyLayer::Manifest,
                } => {
                    hasher.update(b"\x1fmanifest\x1f");
                    hasher.update(dest.to_string_lossy().as_bytes());
                    for copy in sources {
                        hasher.update(copy.source.to_string_lossy().as_bytes());
                        hasher.update(b"=");
                        hasher.update(digest_host_path(stage, copy.optional, &copy.source)?);
                    }
                }
                Step::Run { argv, cached: true } => {
                    hasher.update(b"\x1frun\x1f");
                    hasher.update(argv.join("\x1f").as_bytes());
                }
                _ => {}
            }
        }

        Ok(Some(hex::encode(hasher.finalize())))
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true if an entry exists for the key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Restores a cached layer filesystem into `dest_fs`.
    ///
    /// Returns false (and copies nothing) when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the copy fails.
    pub fn restore(&self, key: &str, dest_fs: &Path) -> Result<bool, BuildError> {
        let Some(entry) = self.index.get(key).map(|e| e.value().clone()) else {
            return Ok(false);
        };

        copy_tree(&entry.join("fs"), dest_fs)?;
        debug!(key, "Restored dependency layer from cache");
        Ok(true)
    }

    /// Stores a layer filesystem under `key`.
    ///
    /// Append-only: if the key already exists the existing entry is kept
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the copy fails.
    pub fn store(&self, key: &str, base: &str, fs_root: &Path) -> Result<(), BuildError> {
        if self.index.contains_key(key) {
            return Ok(());
        }

        let entry = self.root.join(key);
        copy_tree(fs_root, &entry.join("fs"))?;

        let meta = LayerMeta {
            key: key.to_string(),
            base: base.to_string(),
            created_at: crate::utils::iso_timestamp(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|err| BuildError::Serialization(err.to_string()))?;
        std::fs::write(entry.join("meta.json"), meta_json)?;

        self.index.insert(key.to_string(), entry);
        debug!(key, "Stored dependency layer in cache");
        Ok(())
    }
}

/// Hashes a manifest input's contents: a file digests directly, a
/// directory digests every file in sorted order, and an absent optional
/// input digests as a fixed marker.
fn digest_host_path(
    stage: &StageSpec,
    optional: bool,
    path: &Path,
) -> Result<Vec<u8>, BuildError> {
    if path.is_file() {
        return Ok(sha256_file(path)?.into_bytes());
    }

    if path.is_dir() {
        let mut combined = Vec::new();
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        for file in files {
            combined.extend_from_slice(sha256_file(&file)?.as_bytes());
        }
        return Ok(combined);
    }

    if optional {
        return Ok(b"absent".to_vec());
    }

    Err(BuildError::SourceNotFound {
        stage: stage.name.clone(),
        path: path.to_path_buf(),
    })
}
