//! Task: Materialize - install the pinned packages into the build root.
//!
//! Unpacks every locked package from the store and runs native build
//! commands with the toolchain on PATH. The resulting package tree is
//! immutable for the rest of the build; image assembly copies it, never
//! regenerates it.

use super::{BuildCtx, log_task_error, task_start};
use crate::build::types::MaterializeOutput;
use crate::config::BuildConfig;
use crate::manifest::LockedPackage;
use crate::pipeline::StageTask;
use crate::store::{PackageDescriptor, PackageKind, PackageStore};
use crate::util::process::exit_status_code;
use async_trait::async_trait;
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;

pub struct MaterializeTask;

#[async_trait]
impl StageTask<BuildCtx> for MaterializeTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipliteResult<()> {
        let task_name = self.name();
        let build_id = task_start(&ctx, task_name).await;

        let (config, packages) = {
            let ctx = ctx.lock().await;
            let packages = ctx
                .resolve_output
                .as_ref()
                .ok_or_else(|| ShipliteError::Internal("resolve task must run first".into()))?
                .packages
                .clone();
            (ctx.config.clone(), packages)
        };

        let output = run_materialize(&config, &packages)
            .await
            .inspect_err(|e| log_task_error(&build_id, task_name, e))?;

        ctx.lock().await.materialize_output = Some(output);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "materialize"
    }
}

/// Native packages need a toolchain; refuse up front rather than half-way
/// through the install.
fn preflight_toolchain(config: &BuildConfig, packages: &[LockedPackage]) -> ShipliteResult<()> {
    if !packages.iter().any(|p| p.kind == PackageKind::Native) {
        return Ok(());
    }
    match &config.toolchain_dir {
        None => Err(ShipliteError::Compilation(
            "lock pins native packages but no toolchain is configured".into(),
        )),
        Some(dir) if !dir.is_dir() => Err(ShipliteError::Compilation(format!(
            "toolchain {} is not available",
            dir.display()
        ))),
        Some(_) => Ok(()),
    }
}

async fn run_materialize(
    config: &BuildConfig,
    packages: &[LockedPackage],
) -> ShipliteResult<MaterializeOutput> {
    preflight_toolchain(config, packages)?;

    let store = PackageStore::new(&config.store);
    let package_tree = config.build_root.join("packages");
    if package_tree.exists() {
        std::fs::remove_dir_all(&package_tree)?;
    }
    std::fs::create_dir_all(&package_tree)?;

    let mut native_built = 0;
    for pkg in packages {
        let dest = package_tree.join(&pkg.name);
        let descriptor = store.unpack(&pkg.name, &pkg.version, &dest)?;
        if descriptor.version != pkg.version {
            return Err(ShipliteError::Resolution(format!(
                "store archive for {} {} actually contains {}",
                pkg.name, pkg.version, descriptor.version
            )));
        }
        if descriptor.kind == PackageKind::Native {
            build_native(config, &descriptor, &dest).await?;
            native_built += 1;
        }
    }

    tracing::debug!(
        packages = packages.len(),
        native_built,
        "package tree materialized"
    );

    Ok(MaterializeOutput {
        package_tree,
        native_built,
    })
}

async fn build_native(
    config: &BuildConfig,
    descriptor: &PackageDescriptor,
    package_dir: &Path,
) -> ShipliteResult<()> {
    let Some(command) = &descriptor.build else {
        return Err(ShipliteError::Compilation(format!(
            "native package {} declares no build command",
            descriptor.name
        )));
    };
    let Some((program, args)) = command.split_first() else {
        return Err(ShipliteError::Compilation(format!(
            "native package {} has an empty build command",
            descriptor.name
        )));
    };
    let toolchain = config.toolchain_dir.as_ref().ok_or_else(|| {
        ShipliteError::Compilation("no toolchain configured for native build".into())
    })?;

    let output = Command::new(program)
        .args(args)
        .current_dir(package_dir)
        .env("PATH", toolchain_path(toolchain)?)
        .output()
        .await
        .map_err(|e| {
            ShipliteError::Compilation(format!(
                "cannot run build command for {}: {}",
                descriptor.name, e
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ShipliteError::Compilation(format!(
            "{} {} build exited with status {}: {}",
            descriptor.name,
            descriptor.version,
            exit_status_code(output.status),
            stderr.trim()
        )));
    }

    tracing::debug!(package = %descriptor.name, "native package built");
    Ok(())
}

/// PATH with the toolchain directory prepended.
fn toolchain_path(toolchain: &Path) -> ShipliteResult<OsString> {
    let mut paths = vec![toolchain.to_path_buf()];
    if let Some(current) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&current));
    }
    std::env::join_paths(paths)
        .map_err(|e| ShipliteError::Internal(format!("cannot compose PATH: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn native_package(name: &str) -> LockedPackage {
        LockedPackage {
            name: name.into(),
            version: "1.0.0".into(),
            kind: PackageKind::Native,
            direct: true,
        }
    }

    fn config_with_toolchain(toolchain: Option<PathBuf>) -> BuildConfig {
        BuildConfig {
            manifest: "m.toml".into(),
            lock: "m.lock.json".into(),
            store: "store".into(),
            app_dir: "app".into(),
            build_root: "build".into(),
            image_root: "image".into(),
            toolchain_dir: toolchain,
            runtime_libs: vec![],
        }
    }

    #[test]
    fn preflight_passes_without_native_packages() {
        let packages = vec![LockedPackage {
            name: "orm".into(),
            version: "2.1.4".into(),
            kind: PackageKind::Pure,
            direct: true,
        }];
        preflight_toolchain(&config_with_toolchain(None), &packages).unwrap();
    }

    #[test]
    fn preflight_requires_configured_toolchain() {
        let err = preflight_toolchain(&config_with_toolchain(None), &[native_package("pg")])
            .unwrap_err();
        assert!(matches!(err, ShipliteError::Compilation(_)));
    }

    #[test]
    fn preflight_requires_existing_toolchain() {
        let config = config_with_toolchain(Some("/does/not/exist".into()));
        let err = preflight_toolchain(&config, &[native_package("pg")]).unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
