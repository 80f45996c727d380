//! Task: Base preparation - fresh minimal staging base.
//!
//! Creates the staging layout next to the final image location and copies
//! the runtime shared-library subset into it. A library missing from the
//! host is an install mismatch surfaced here, at build time, never at boot.

use super::{BuildCtx, log_task_error, task_start};
use crate::build::types::BasePrepOutput;
use crate::config::BuildConfig;
use crate::image::ImageLayout;
use crate::pipeline::StageTask;
use async_trait::async_trait;
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::path::{Path, PathBuf};

pub struct BasePrepTask;

#[async_trait]
impl StageTask<BuildCtx> for BasePrepTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipliteResult<()> {
        let task_name = self.name();
        let build_id = task_start(&ctx, task_name).await;

        let (config, staging_root) = {
            let mut ctx = ctx.lock().await;
            let staging_root = staging_path(&ctx.config.image_root)?;
            // Register before creating anything so a failure part-way
            // through still gets cleaned up.
            ctx.guard.set_staging(staging_root.clone());
            (ctx.config.clone(), staging_root)
        };

        let output = run_base_prep(&config, &staging_root)
            .inspect_err(|e| log_task_error(&build_id, task_name, e))?;

        ctx.lock().await.base_output = Some(output);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "base_prep"
    }
}

/// Staging tree sits beside the final image: `image` → `.image.staging`.
fn staging_path(image_root: &Path) -> ShipliteResult<PathBuf> {
    let name = image_root
        .file_name()
        .ok_or_else(|| ShipliteError::Config("image_root has no directory name".into()))?;
    Ok(image_root.with_file_name(format!(".{}.staging", name.to_string_lossy())))
}

fn run_base_prep(config: &BuildConfig, staging_root: &Path) -> ShipliteResult<BasePrepOutput> {
    // Leftover from a crashed build; the staging base must start empty.
    if staging_root.exists() {
        std::fs::remove_dir_all(staging_root)?;
    }

    let staging = ImageLayout::new(staging_root);
    staging.prepare()?;

    for lib in &config.runtime_libs {
        if !lib.is_file() {
            return Err(ShipliteError::InstallMismatch(format!(
                "runtime shared library {} is missing",
                lib.display()
            )));
        }
        let file_name = lib.file_name().ok_or_else(|| {
            ShipliteError::Config(format!("runtime library path {} has no file name", lib.display()))
        })?;
        std::fs::copy(lib, staging.lib_dir().join(file_name))?;
    }

    tracing::debug!(
        staging = %staging_root.display(),
        runtime_libs = config.runtime_libs.len(),
        "staging base prepared"
    );

    Ok(BasePrepOutput { staging })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_sits_beside_the_image() {
        let staging = staging_path(Path::new("/var/lib/shiplite/image")).unwrap();
        assert_eq!(staging, Path::new("/var/lib/shiplite/.image.staging"));
    }
}
