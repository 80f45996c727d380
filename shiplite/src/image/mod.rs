//! Runtime image layout and metadata.
//!
//! An image is a plain directory tree with fixed, well-known paths:
//!
//! ```text
//! <image root>/
//! ├── packages/        installed package trees (one dir per package)
//! ├── app/             service source tree
//! ├── lib/             runtime-only shared library subset
//! └── image.json       build id, manifest digest, timestamps
//! ```
//!
//! Images are created whole into a staging directory and swapped into place
//! by rename; an existing image is destroyed and replaced, never patched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "image.json";
pub const PACKAGES_DIR: &str = "packages";
pub const APP_DIR: &str = "app";
pub const LIB_DIR: &str = "lib";

/// Path accessors for one image root (staged or final).
#[derive(Debug, Clone)]
pub struct ImageLayout {
    root: PathBuf,
}

impl ImageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join(PACKAGES_DIR)
    }

    pub fn app_dir(&self) -> PathBuf {
        self.root.join(APP_DIR)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join(LIB_DIR)
    }

    pub fn requirement_list_path(&self) -> PathBuf {
        self.root.join(crate::manifest::REQUIREMENT_LIST_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Create the directory skeleton.
    pub fn prepare(&self) -> ShipliteResult<()> {
        std::fs::create_dir_all(self.packages_dir())?;
        std::fs::create_dir_all(self.app_dir())?;
        std::fs::create_dir_all(self.lib_dir())?;
        Ok(())
    }

    /// Reject any top-level entry outside the fixed layout.
    ///
    /// The build toolchain never writes into the staging tree, so anything
    /// unexpected here is a builder defect and fails the build.
    pub fn verify_minimal(&self) -> ShipliteResult<()> {
        const ALLOWED: [&str; 5] = [
            PACKAGES_DIR,
            APP_DIR,
            LIB_DIR,
            METADATA_FILE,
            crate::manifest::REQUIREMENT_LIST_FILE,
        ];

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !ALLOWED.contains(&name.as_ref()) {
                return Err(ShipliteError::Internal(format!(
                    "unexpected entry {} in runtime image",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Persisted image record, written once at assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub build_id: String,
    pub service_name: String,
    pub created_at: DateTime<Utc>,
    pub manifest_digest: String,
    pub package_count: usize,
}

impl ImageMetadata {
    pub fn load(path: &Path) -> ShipliteResult<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ShipliteError::Internal(format!("invalid image metadata: {}", e)))
    }

    pub fn store(&self, path: &Path) -> ShipliteResult<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ShipliteError::Internal(format!("cannot encode image metadata: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// A finished, openable runtime image.
#[derive(Debug, Clone)]
pub struct RuntimeImage {
    layout: ImageLayout,
    metadata: ImageMetadata,
}

impl RuntimeImage {
    /// Open an image directory, reading its metadata record.
    pub fn open(root: impl Into<PathBuf>) -> ShipliteResult<Self> {
        let layout = ImageLayout::new(root);
        let metadata_path = layout.metadata_path();
        if !metadata_path.is_file() {
            return Err(ShipliteError::Config(format!(
                "{} is not a runtime image (no {})",
                layout.root().display(),
                METADATA_FILE
            )));
        }
        let metadata = ImageMetadata::load(&metadata_path)?;
        Ok(Self { layout, metadata })
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prepare_creates_fixed_layout() {
        let temp = TempDir::new().unwrap();
        let layout = ImageLayout::new(temp.path().join("image"));
        layout.prepare().unwrap();
        assert!(layout.packages_dir().is_dir());
        assert!(layout.app_dir().is_dir());
        assert!(layout.lib_dir().is_dir());
        layout.verify_minimal().unwrap();
    }

    #[test]
    fn verify_minimal_rejects_stray_entries() {
        let temp = TempDir::new().unwrap();
        let layout = ImageLayout::new(temp.path().join("image"));
        layout.prepare().unwrap();
        std::fs::create_dir(layout.root().join("toolchain")).unwrap();
        let err = layout.verify_minimal().unwrap_err();
        assert!(err.to_string().contains("toolchain"));
    }

    #[test]
    fn metadata_round_trips_through_open() {
        let temp = TempDir::new().unwrap();
        let layout = ImageLayout::new(temp.path().join("image"));
        layout.prepare().unwrap();

        let metadata = ImageMetadata {
            build_id: "01J0000000000000000000XYZ".into(),
            service_name: "orgsvc".into(),
            created_at: Utc::now(),
            manifest_digest: "abc123".into(),
            package_count: 3,
        };
        metadata.store(&layout.metadata_path()).unwrap();

        let image = RuntimeImage::open(layout.root()).unwrap();
        assert_eq!(image.metadata().service_name, "orgsvc");
        assert_eq!(image.metadata().package_count, 3);
    }

    #[test]
    fn open_rejects_bare_directories() {
        let temp = TempDir::new().unwrap();
        let err = RuntimeImage::open(temp.path()).unwrap_err();
        assert!(matches!(err, ShipliteError::Config(_)));
    }
}
