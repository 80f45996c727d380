//! Build pipeline tasks.

mod assemble;
mod base_prep;
mod export;
mod materialize;
mod resolve;

pub(crate) use assemble::AssembleTask;
pub(crate) use base_prep::BasePrepTask;
pub(crate) use export::ExportTask;
pub(crate) use materialize::MaterializeTask;
pub(crate) use resolve::ResolveTask;

use crate::build::types::BuildPipelineContext;
use shiplite_shared::errors::ShipliteError;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) type BuildCtx = Arc<Mutex<BuildPipelineContext>>;

/// Log task start and hand back the build id for later log lines.
pub(crate) async fn task_start(ctx: &BuildCtx, task_name: &str) -> String {
    let ctx = ctx.lock().await;
    tracing::debug!(build_id = %ctx.build_id, task = task_name, "task start");
    ctx.build_id.clone()
}

pub(crate) fn log_task_error(build_id: &str, task_name: &str, err: &ShipliteError) {
    tracing::error!(build_id = %build_id, task = task_name, error = %err, "task failed");
}
