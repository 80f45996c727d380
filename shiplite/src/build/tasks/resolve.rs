//! Task: Resolve - check the manifest+lock pair and freeze the install list.
//!
//! Verifies mutual consistency, confirms every pinned package is available
//! in the store, and writes the flattened requirement list into the build
//! root. Nothing is installed yet.

use super::{BuildCtx, log_task_error, task_start};
use crate::build::types::ResolveOutput;
use crate::config::BuildConfig;
use crate::manifest::{LockFile, Manifest, REQUIREMENT_LIST_FILE, RequirementList};
use crate::pipeline::StageTask;
use crate::store::PackageStore;
use async_trait::async_trait;
use shiplite_shared::errors::{ShipliteError, ShipliteResult};

pub struct ResolveTask;

#[async_trait]
impl StageTask<BuildCtx> for ResolveTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipliteResult<()> {
        let task_name = self.name();
        let build_id = task_start(&ctx, task_name).await;

        let config = {
            let ctx = ctx.lock().await;
            ctx.config.clone()
        };

        let output =
            run_resolve(&config).inspect_err(|e| log_task_error(&build_id, task_name, e))?;

        tracing::info!(
            build_id = %build_id,
            service = %output.service_name,
            packages = output.packages.len(),
            "dependency set resolved"
        );

        ctx.lock().await.resolve_output = Some(output);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "resolve"
    }
}

fn run_resolve(config: &BuildConfig) -> ShipliteResult<ResolveOutput> {
    let loaded = Manifest::load(&config.manifest)?;
    let lock = LockFile::load(&config.lock)?;
    lock.verify(&loaded)?;

    let store = PackageStore::new(&config.store);
    for pkg in &lock.packages {
        if !store.contains(&pkg.name, &pkg.version) {
            return Err(ShipliteError::Resolution(format!(
                "{} {} is not available in the package store",
                pkg.name, pkg.version
            )));
        }
    }

    let requirement_list = RequirementList::from_lock(&lock);
    std::fs::create_dir_all(&config.build_root)?;
    let requirement_list_path = config.build_root.join(REQUIREMENT_LIST_FILE);
    std::fs::write(&requirement_list_path, requirement_list.to_bytes())?;

    Ok(ResolveOutput {
        service_name: loaded.manifest.name,
        manifest_digest: loaded.digest,
        packages: lock.packages,
        requirement_list,
        requirement_list_path,
    })
}
