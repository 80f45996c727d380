//! Type definitions for the build pipeline.

use crate::config::BuildConfig;
use crate::image::{ImageLayout, RuntimeImage};
use crate::manifest::{LockedPackage, RequirementList};
use std::path::PathBuf;

/// RAII guard for cleanup on build failure.
///
/// Removes the staging tree if dropped without being disarmed, so a failed
/// build can never leave a half-assembled image behind.
pub struct CleanupGuard {
    staging: Option<PathBuf>,
    armed: bool,
}

impl CleanupGuard {
    pub fn new() -> Self {
        Self {
            staging: None,
            armed: true,
        }
    }

    /// Register the staging tree for cleanup on failure.
    pub fn set_staging(&mut self, staging: PathBuf) {
        self.staging = Some(staging);
    }

    /// Disarm the guard (call on success).
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Default for CleanupGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(ref staging) = self.staging
            && staging.exists()
        {
            tracing::warn!(staging = %staging.display(), "build failed, removing staging tree");
            if let Err(e) = std::fs::remove_dir_all(staging) {
                tracing::warn!("failed to remove staging tree during cleanup: {}", e);
            }
        }
    }
}

/// Shared build pipeline context.
///
/// Stores the immutable inputs plus the typed outputs each task leaves for
/// the ones after it.
pub struct BuildPipelineContext {
    pub config: BuildConfig,
    pub build_id: String,
    pub guard: CleanupGuard,
    pub resolve_output: Option<ResolveOutput>,
    pub materialize_output: Option<MaterializeOutput>,
    pub base_output: Option<BasePrepOutput>,
    pub assemble_output: Option<AssembleOutput>,
    pub export_output: Option<ExportOutput>,
}

impl BuildPipelineContext {
    pub fn new(config: BuildConfig, build_id: String) -> Self {
        Self {
            config,
            build_id,
            guard: CleanupGuard::new(),
            resolve_output: None,
            materialize_output: None,
            base_output: None,
            assemble_output: None,
            export_output: None,
        }
    }
}

// ============================================================================
// TASK OUTPUT TYPES
// ============================================================================

/// Output from the resolve task.
pub struct ResolveOutput {
    pub service_name: String,
    pub manifest_digest: String,
    pub packages: Vec<LockedPackage>,
    pub requirement_list: RequirementList,
    /// Builder-stage artifact consumed by assembly; never part of the
    /// image's live state.
    pub requirement_list_path: PathBuf,
}

/// Output from the materialize task.
pub struct MaterializeOutput {
    /// Installed package tree under the build root.
    pub package_tree: PathBuf,
    pub native_built: usize,
}

/// Output from the base preparation task.
pub struct BasePrepOutput {
    /// Fresh staging layout with the runtime library subset in place.
    pub staging: ImageLayout,
}

/// Output from the assemble task.
pub struct AssembleOutput {
    pub image: RuntimeImage,
}

/// Output from the export task.
pub struct ExportOutput {
    pub archive: PathBuf,
}
