//! Local package store.
//!
//! The store is a flat directory of `<name>-<version>.tar.gz` archives. Each
//! archive carries the package's file tree plus a `pkg.json` descriptor at
//! the archive root. The descriptor stays in place after installation and is
//! what image assembly reads back to verify the frozen requirement list
//! verbatim.
//!
//! Native packages declare a build command in their descriptor; the builder
//! runs it with the toolchain on PATH after unpacking.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Descriptor file name, both inside archives and in installed trees.
pub const DESCRIPTOR_FILE: &str = "pkg.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    #[default]
    Pure,
    /// Requires the build toolchain; never installable without one.
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub kind: PackageKind,
    /// Build command for native packages, run from the unpacked package
    /// directory with the toolchain prepended to PATH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Vec<String>>,
}

impl PackageDescriptor {
    pub fn load(path: &Path) -> ShipliteResult<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ShipliteError::Internal(format!(
                "invalid package descriptor {}: {}",
                path.display(),
                e
            ))
        })
    }
}

pub struct PackageStore {
    root: PathBuf,
}

impl PackageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{}-{}.tar.gz", name, version))
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.archive_path(name, version).is_file()
    }

    /// Unpack an archive into `dest` and return its descriptor.
    pub fn unpack(&self, name: &str, version: &str, dest: &Path) -> ShipliteResult<PackageDescriptor> {
        let archive_path = self.archive_path(name, version);
        let file = File::open(&archive_path).map_err(|e| {
            ShipliteError::Resolution(format!(
                "package archive {} is not in the store: {}",
                archive_path.display(),
                e
            ))
        })?;

        std::fs::create_dir_all(dest)?;
        let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        archive.unpack(dest)?;

        let descriptor_path = dest.join(DESCRIPTOR_FILE);
        if !descriptor_path.is_file() {
            return Err(ShipliteError::Resolution(format!(
                "package archive {} carries no {} descriptor",
                archive_path.display(),
                DESCRIPTOR_FILE
            )));
        }
        PackageDescriptor::load(&descriptor_path)
    }

    /// Package a directory tree into the store under the descriptor's
    /// name and version. The descriptor is written into the archive root,
    /// replacing any `pkg.json` already in the tree.
    pub fn publish(&self, descriptor: &PackageDescriptor, tree: &Path) -> ShipliteResult<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let archive_path = self.archive_path(&descriptor.name, &descriptor.version);

        let file = File::create(&archive_path)?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.append_dir_all(".", tree)?;

        let json = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| ShipliteError::Internal(format!("cannot encode descriptor: {}", e)))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(json.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, DESCRIPTOR_FILE, json.as_slice())?;

        builder.into_inner()?.finish()?;
        Ok(archive_path)
    }
}
