//! Task: Assemble - frozen-list install into the staging base, then swap.
//!
//! Copies the materialized package tree, the requirement list, and the
//! service source into the staging base; verifies the frozen list installs
//! verbatim; writes image metadata; discards the requirement list; and
//! replaces the previous image wholesale by rename.

use super::{BuildCtx, log_task_error, task_start};
use crate::build::types::{AssembleOutput, BasePrepOutput, MaterializeOutput, ResolveOutput};
use crate::config::BuildConfig;
use crate::image::{ImageLayout, ImageMetadata, RuntimeImage};
use crate::manifest::RequirementList;
use crate::pipeline::StageTask;
use crate::store::{DESCRIPTOR_FILE, PackageDescriptor};
use crate::util::fs::copy_tree;
use async_trait::async_trait;
use chrono::Utc;
use shiplite_shared::errors::{ShipliteError, ShipliteResult};

pub struct AssembleTask;

#[async_trait]
impl StageTask<BuildCtx> for AssembleTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipliteResult<()> {
        let task_name = self.name();
        let build_id = task_start(&ctx, task_name).await;

        let (config, resolve, materialize, base) = {
            let mut ctx = ctx.lock().await;
            let resolve = ctx
                .resolve_output
                .take()
                .ok_or_else(|| ShipliteError::Internal("resolve task must run first".into()))?;
            let materialize = ctx
                .materialize_output
                .take()
                .ok_or_else(|| ShipliteError::Internal("materialize task must run first".into()))?;
            let base = ctx
                .base_output
                .take()
                .ok_or_else(|| ShipliteError::Internal("base_prep task must run first".into()))?;
            (ctx.config.clone(), resolve, materialize, base)
        };

        let output = run_assemble(&config, &build_id, resolve, materialize, base)
            .inspect_err(|e| log_task_error(&build_id, task_name, e))?;

        ctx.lock().await.assemble_output = Some(output);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "assemble"
    }
}

fn run_assemble(
    config: &BuildConfig,
    build_id: &str,
    resolve: ResolveOutput,
    materialize: MaterializeOutput,
    base: BasePrepOutput,
) -> ShipliteResult<AssembleOutput> {
    let staging = base.staging;

    // Builder output is copied, never rebuilt here.
    copy_tree(&materialize.package_tree, &staging.packages_dir())?;
    std::fs::copy(&resolve.requirement_list_path, staging.requirement_list_path())?;
    copy_tree(&config.app_dir, &staging.app_dir())?;

    install_from_frozen(&staging)?;

    let package_count = resolve.requirement_list.len();
    let metadata = ImageMetadata {
        build_id: build_id.to_string(),
        service_name: resolve.service_name,
        created_at: Utc::now(),
        manifest_digest: resolve.manifest_digest,
        package_count,
    };
    metadata.store(&staging.metadata_path())?;
    staging.verify_minimal()?;

    // The frozen list never becomes live image state.
    std::fs::remove_file(staging.requirement_list_path())?;

    // Wholesale replace: destroy the previous image, rename the new one in.
    if config.image_root.exists() {
        std::fs::remove_dir_all(&config.image_root)?;
    }
    if let Some(parent) = config.image_root.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(staging.root(), &config.image_root)?;

    let image = RuntimeImage::open(&config.image_root)?;
    tracing::info!(
        image = %image.root().display(),
        build_id,
        packages = package_count,
        "runtime image assembled"
    );

    Ok(AssembleOutput { image })
}

/// Install strictly from the frozen list.
///
/// Every pinned entry must be present at exactly its pinned version, and
/// nothing may be installed beyond the list. Any deviation fails the build
/// here rather than surfacing at boot.
fn install_from_frozen(staging: &ImageLayout) -> ShipliteResult<()> {
    let bytes = std::fs::read(staging.requirement_list_path())?;
    let list = RequirementList::parse(&bytes)?;

    for (name, version) in list.entries() {
        let descriptor_path = staging.packages_dir().join(name).join(DESCRIPTOR_FILE);
        if !descriptor_path.is_file() {
            return Err(ShipliteError::InstallMismatch(format!(
                "{} {} is pinned but not installed",
                name, version
            )));
        }
        let descriptor = PackageDescriptor::load(&descriptor_path)?;
        if &descriptor.version != version {
            return Err(ShipliteError::InstallMismatch(format!(
                "{} is pinned at {} but {} is installed",
                name, version, descriptor.version
            )));
        }
    }

    for entry in std::fs::read_dir(staging.packages_dir())? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !list.contains(&name) {
            return Err(ShipliteError::InstallMismatch(format!(
                "installed package {} is not in the frozen list",
                name
            )));
        }
    }

    Ok(())
}
