//! Task: Export - package the finished image as a tarball.

use super::{BuildCtx, log_task_error, task_start};
use crate::build::types::ExportOutput;
use crate::image::RuntimeImage;
use crate::pipeline::StageTask;
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::fs::File;
use std::path::PathBuf;

pub struct ExportTask;

#[async_trait]
impl StageTask<BuildCtx> for ExportTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipliteResult<()> {
        let task_name = self.name();
        let build_id = task_start(&ctx, task_name).await;

        let image = {
            let ctx = ctx.lock().await;
            ctx.assemble_output
                .as_ref()
                .ok_or_else(|| ShipliteError::Internal("assemble task must run first".into()))?
                .image
                .clone()
        };

        let archive =
            run_export(&image).inspect_err(|e| log_task_error(&build_id, task_name, e))?;

        ctx.lock().await.export_output = Some(ExportOutput { archive });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "export"
    }
}

fn run_export(image: &RuntimeImage) -> ShipliteResult<PathBuf> {
    let metadata = image.metadata();
    let parent = image
        .root()
        .parent()
        .ok_or_else(|| ShipliteError::Internal("image root has no parent directory".into()))?;
    let archive_path = parent.join(format!(
        "{}-{}.tar.gz",
        metadata.service_name, metadata.build_id
    ));

    let file = File::create(&archive_path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(".", image.root())?;
    builder.into_inner()?.finish()?;

    tracing::info!(archive = %archive_path.display(), "image exported");
    Ok(archive_path)
}
