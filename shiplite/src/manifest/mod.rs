//! Dependency manifest, lock file, and the flattened requirement list.
//!
//! The manifest (`shiplite.toml`) declares direct dependencies with version
//! constraints. The lock file (`shiplite.lock.json`) pins exact versions for
//! the whole transitive set and records the digest of the manifest it was
//! derived from. Resolution refuses to proceed unless the pair is mutually
//! consistent - a stale or edited manifest invalidates the lock.
//!
//! The requirement list is the flattened `name==version` form consumed by
//! image assembly. It is generated from the lock alone, sorted by package
//! name, so a fixed manifest+lock pair always produces byte-identical output.

use crate::store::PackageKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Current lock file format version.
pub const LOCK_VERSION: u32 = 1;

/// File name of the flattened requirement list artifact.
pub const REQUIREMENT_LIST_FILE: &str = "requirements.lock";

/// Declared dependency set with version constraints.
///
/// `dependencies` is a BTreeMap so iteration order is the declaration's
/// canonical (sorted) order regardless of how the TOML was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Service name; becomes part of the image metadata and export name.
    pub name: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// A manifest together with the content digest of the bytes it was read
/// from. The digest is what ties a lock file to one exact manifest state.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub digest: String,
}

impl Manifest {
    pub fn load(path: &Path) -> ShipliteResult<LoadedManifest> {
        let bytes = std::fs::read(path).map_err(|e| {
            ShipliteError::Config(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        let manifest: Manifest = toml::from_str(
            std::str::from_utf8(&bytes)
                .map_err(|e| ShipliteError::Config(format!("manifest is not UTF-8: {}", e)))?,
        )
        .map_err(|e| ShipliteError::Config(format!("invalid manifest: {}", e)))?;

        if manifest.name.is_empty() {
            return Err(ShipliteError::Config("manifest has an empty name".into()));
        }

        Ok(LoadedManifest {
            manifest,
            digest: content_digest(&bytes),
        })
    }
}

/// SHA-256 over raw content bytes, hex-encoded.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// One pinned package in the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub kind: PackageKind,
    /// True if this package is declared in the manifest (as opposed to a
    /// transitive dependency pulled in by one that is).
    #[serde(default)]
    pub direct: bool,
}

/// Pinned transitive dependency set derived from one manifest state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    pub version: u32,
    pub manifest_digest: String,
    pub packages: Vec<LockedPackage>,
}

impl LockFile {
    pub fn load(path: &Path) -> ShipliteResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ShipliteError::Config(format!("cannot read lock file {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ShipliteError::Config(format!("invalid lock file: {}", e)))
    }

    /// Check the lock against the manifest it claims to pin.
    ///
    /// Fails if the lock format is unsupported, the manifest changed since
    /// the lock was written, a declared dependency is missing or pinned
    /// outside its constraint, or the lock carries a direct entry the
    /// manifest no longer declares.
    pub fn verify(&self, loaded: &LoadedManifest) -> ShipliteResult<()> {
        if self.version != LOCK_VERSION {
            return Err(ShipliteError::Resolution(format!(
                "lock file format {} is not supported (expected {})",
                self.version, LOCK_VERSION
            )));
        }

        if self.manifest_digest != loaded.digest {
            return Err(ShipliteError::Resolution(
                "lock file is stale: manifest changed since the lock was written".into(),
            ));
        }

        let mut seen = HashSet::new();
        for pkg in &self.packages {
            if !seen.insert(pkg.name.as_str()) {
                return Err(ShipliteError::Resolution(format!(
                    "lock file pins {} more than once",
                    pkg.name
                )));
            }
        }

        for (name, constraint) in &loaded.manifest.dependencies {
            let Some(pinned) = self.packages.iter().find(|p| &p.name == name) else {
                return Err(ShipliteError::Resolution(format!(
                    "declared dependency {} is missing from the lock file",
                    name
                )));
            };
            if !pinned.direct {
                return Err(ShipliteError::Resolution(format!(
                    "lock file marks declared dependency {} as transitive",
                    name
                )));
            }
            if !constraint_satisfied(constraint, &pinned.version) {
                return Err(ShipliteError::Resolution(format!(
                    "locked {} {} does not satisfy declared constraint {}",
                    name, pinned.version, constraint
                )));
            }
        }

        for pkg in &self.packages {
            if pkg.direct && !loaded.manifest.dependencies.contains_key(&pkg.name) {
                return Err(ShipliteError::Resolution(format!(
                    "lock file pins {} as direct but the manifest does not declare it",
                    pkg.name
                )));
            }
        }

        Ok(())
    }
}

/// Version constraint check.
///
/// Three forms: `=X.Y.Z` matches exactly, `*` matches anything, and a bare
/// prefix like `2.1` matches any version in that series (`2.1`, `2.1.4`,
/// but not `2.10`).
pub fn constraint_satisfied(constraint: &str, version: &str) -> bool {
    if constraint == "*" {
        return true;
    }
    if let Some(exact) = constraint.strip_prefix('=') {
        return exact == version;
    }
    version == constraint
        || version
            .strip_prefix(constraint)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Flattened `name==version` install list, sorted by package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementList {
    entries: Vec<(String, String)>,
}

impl RequirementList {
    pub fn from_lock(lock: &LockFile) -> Self {
        let mut entries: Vec<(String, String)> = lock
            .packages
            .iter()
            .map(|p| (p.name.clone(), p.version.clone()))
            .collect();
        entries.sort();
        Self { entries }
    }

    pub fn parse(bytes: &[u8]) -> ShipliteResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ShipliteError::InstallMismatch("requirement list is not UTF-8".into()))?;
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((name, version)) = line.split_once("==") else {
                return Err(ShipliteError::InstallMismatch(format!(
                    "malformed requirement line: {}",
                    line
                )));
            };
            entries.push((name.to_string(), version.to_string()));
        }
        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (name, version) in &self.entries {
            out.push_str(name);
            out.push_str("==");
            out.push_str(version);
            out.push('\n');
        }
        out.into_bytes()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lock(digest: &str) -> LockFile {
        LockFile {
            version: LOCK_VERSION,
            manifest_digest: digest.to_string(),
            packages: vec![
                LockedPackage {
                    name: "orm".into(),
                    version: "2.1.4".into(),
                    kind: PackageKind::Pure,
                    direct: true,
                },
                LockedPackage {
                    name: "textutils".into(),
                    version: "0.9.1".into(),
                    kind: PackageKind::Pure,
                    direct: false,
                },
            ],
        }
    }

    fn sample_manifest() -> LoadedManifest {
        let toml = "name = \"orgsvc\"\n\n[dependencies]\norm = \"2.1\"\n";
        LoadedManifest {
            manifest: toml::from_str(toml).unwrap(),
            digest: content_digest(toml.as_bytes()),
        }
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(content_digest(b"abc"), content_digest(b"abc"));
        assert_ne!(content_digest(b"abc"), content_digest(b"abd"));
    }

    #[test]
    fn constraint_forms() {
        assert!(constraint_satisfied("*", "9.9.9"));
        assert!(constraint_satisfied("=1.4.2", "1.4.2"));
        assert!(!constraint_satisfied("=1.4.2", "1.4.3"));
        assert!(constraint_satisfied("2.1", "2.1.4"));
        assert!(constraint_satisfied("2.1", "2.1"));
        assert!(!constraint_satisfied("2.1", "2.10"));
    }

    #[test]
    fn verify_accepts_consistent_pair() {
        let loaded = sample_manifest();
        sample_lock(&loaded.digest).verify(&loaded).unwrap();
    }

    #[test]
    fn verify_rejects_stale_digest() {
        let loaded = sample_manifest();
        let err = sample_lock("deadbeef").verify(&loaded).unwrap_err();
        assert!(matches!(err, ShipliteError::Resolution(_)));
        assert!(err.to_string().contains("stale"));
    }

    #[test]
    fn verify_rejects_missing_dependency() {
        let loaded = sample_manifest();
        let mut lock = sample_lock(&loaded.digest);
        lock.packages.remove(0);
        let err = lock.verify(&loaded).unwrap_err();
        assert!(err.to_string().contains("missing from the lock"));
    }

    #[test]
    fn verify_rejects_undeclared_direct_entry() {
        let loaded = sample_manifest();
        let mut lock = sample_lock(&loaded.digest);
        lock.packages[1].direct = true;
        let err = lock.verify(&loaded).unwrap_err();
        assert!(err.to_string().contains("does not declare"));
    }

    #[test]
    fn verify_rejects_constraint_violation() {
        let loaded = sample_manifest();
        let mut lock = sample_lock(&loaded.digest);
        lock.packages[0].version = "3.0.0".into();
        let err = lock.verify(&loaded).unwrap_err();
        assert!(err.to_string().contains("does not satisfy"));
    }

    #[test]
    fn requirement_list_is_sorted_and_round_trips() {
        let loaded = sample_manifest();
        let mut lock = sample_lock(&loaded.digest);
        lock.packages.reverse();
        let list = RequirementList::from_lock(&lock);
        let bytes = list.to_bytes();
        assert_eq!(bytes, b"orm==2.1.4\ntextutils==0.9.1\n".to_vec());
        assert_eq!(RequirementList::parse(&bytes).unwrap(), list);
    }

    #[test]
    fn requirement_list_bytes_are_deterministic() {
        let loaded = sample_manifest();
        let lock = sample_lock(&loaded.digest);
        let mut shuffled = lock.clone();
        shuffled.packages.reverse();
        assert_eq!(
            RequirementList::from_lock(&lock).to_bytes(),
            RequirementList::from_lock(&shuffled).to_bytes()
        );
    }
}
