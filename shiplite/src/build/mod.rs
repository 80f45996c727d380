//! Runtime image construction.
//!
//! ## Architecture
//!
//! Building is table-driven with an execution plan selected from the build
//! target:
//!
//! ```text
//! Tree (default):
//!   1. Resolve              (manifest+lock → frozen requirement list)
//!   2. Materialize ─┬─      (unpack packages, build native ones)
//!      BasePrep     ─┘      (fresh staging base + runtime lib subset)
//!   3. Assemble             (frozen-list install, metadata, atomic swap)
//!
//! Archive:
//!   1-3 as above
//!   4. Export               (tar.gz of the finished image)
//! ```
//!
//! Resolution and the toolchain only ever touch the build root; the staging
//! base receives copies. `CleanupGuard` removes a half-assembled staging
//! tree if any task fails.

mod tasks;
mod types;

use crate::config::BuildConfig;
use crate::image::RuntimeImage;
use crate::pipeline::{ExecutionPlan, PlanMetrics, Stage, run_plan};
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use tasks::{AssembleTask, BasePrepTask, BuildCtx, ExportTask, MaterializeTask, ResolveTask};
use types::BuildPipelineContext;

/// What the build should leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// The image directory tree only.
    Tree,
    /// The image tree plus a tar.gz export beside it.
    Archive,
}

/// Get execution plan based on build target.
fn get_execution_plan(target: BuildTarget) -> ExecutionPlan<BuildCtx> {
    let mut stages: Vec<Stage<BuildCtx>> = vec![
        Stage::sequential(vec![Box::new(ResolveTask)]),
        // Package materialization and base preparation are independent.
        Stage::parallel(vec![Box::new(MaterializeTask), Box::new(BasePrepTask)]),
        Stage::sequential(vec![Box::new(AssembleTask)]),
    ];
    if target == BuildTarget::Archive {
        stages.push(Stage::sequential(vec![Box::new(ExportTask)]));
    }
    ExecutionPlan::new(stages)
}

/// Result of a finished build.
#[derive(Debug)]
pub struct BuildReport {
    pub image: RuntimeImage,
    pub archive: Option<PathBuf>,
    pub metrics: PlanMetrics,
}

/// Builds the runtime image from a locked dependency set.
///
/// # Example
///
/// ```ignore
/// let report = ImageBuilder::new(config, BuildTarget::Tree)?
///     .build()
///     .await?;
/// println!("image at {}", report.image.root().display());
/// ```
pub struct ImageBuilder {
    config: BuildConfig,
    target: BuildTarget,
}

impl ImageBuilder {
    pub fn new(config: BuildConfig, target: BuildTarget) -> ShipliteResult<Self> {
        config.sanitize()?;
        Ok(Self { config, target })
    }

    /// Run the full build plan.
    ///
    /// Rerunning with an identical manifest+lock pair produces an identical
    /// requirement list and declared version set; only the build id and
    /// timestamps differ.
    pub async fn build(self) -> ShipliteResult<BuildReport> {
        let build_id = ulid::Ulid::new().to_string();
        tracing::debug!(build_id = %build_id, target = ?self.target, "starting image build");

        let ctx = Arc::new(Mutex::new(BuildPipelineContext::new(self.config, build_id)));

        let metrics = run_plan(get_execution_plan(self.target), Arc::clone(&ctx)).await?;

        let mut ctx = ctx.lock().await;
        ctx.guard.disarm();

        let image = ctx
            .assemble_output
            .take()
            .ok_or_else(|| ShipliteError::Internal("assemble task must run first".into()))?
            .image;
        let archive = ctx.export_output.take().map(|o| o.archive);

        metrics.log_summary();

        Ok(BuildReport {
            image,
            archive,
            metrics,
        })
    }
}
