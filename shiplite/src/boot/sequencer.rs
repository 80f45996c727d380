//! The boot sequencer state machine.

use super::shutdown::{self, ShutdownHandle, wait_for_shutdown};
use crate::config::{CommandSpec, RuntimeConfig};
use crate::util::process::{exit_status_code, kill_group, terminate_group};
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;

/// Result of the migration phase.
///
/// The caller decides whether to start the service by matching on this -
/// never by chaining process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Success,
    /// Nonzero migration tool exit, carrying its status untranslated.
    Failure(i32),
}

/// How a successful boot ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// An external termination signal arrived and the service shut down
    /// cleanly.
    Shutdown { signal: i32 },
    /// The service exited on its own with status zero.
    Completed,
}

/// Sequencer states, used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    Init,
    Migrating,
    Serving,
    Failed,
}

/// Gates service startup on migration success.
///
/// One sequencer drives one container lifetime: create it, run it, and let
/// the process exit with the result. Both phase children inherit stdio so
/// their output reaches the container's log streams, and both receive the
/// same environment derived once from [`RuntimeConfig`].
pub struct BootSequencer {
    config: RuntimeConfig,
    shutdown: watch::Receiver<Option<i32>>,
}

impl BootSequencer {
    /// Create a sequencer plus the handle used to deliver termination.
    pub fn new(config: RuntimeConfig) -> (Self, ShutdownHandle) {
        let (handle, rx) = shutdown::channel();
        (
            Self {
                config,
                shutdown: rx,
            },
            handle,
        )
    }

    /// Drive `Init → Migrating → (Serving | Failed)` to completion.
    pub async fn run(mut self) -> ShipliteResult<ServeOutcome> {
        tracing::info!(phase = ?BootPhase::Init, "boot sequencer starting");

        match self.apply_migrations().await? {
            MigrationOutcome::Failure(code) => {
                tracing::error!(
                    phase = ?BootPhase::Failed,
                    code,
                    "migration failed, service will not start"
                );
                Err(ShipliteError::Migration { code })
            }
            MigrationOutcome::Success => self.serve().await,
        }
    }

    /// Run the migration tool to completion.
    ///
    /// Blocks until the tool exits, the configured timeout expires, or a
    /// termination request arrives. Timeout and termination both kill the
    /// tool's whole process group before returning.
    pub async fn apply_migrations(&mut self) -> ShipliteResult<MigrationOutcome> {
        let timeout_secs = self.config.migration_timeout_secs;
        let grace = self.config.shutdown_grace();
        let env = self.config.phase_env();

        tracing::info!(
            phase = ?BootPhase::Migrating,
            command = %self.config.migrate,
            "applying pending migrations"
        );

        let mut child = spawn_phase(&self.config.migrate, &env).map_err(|e| {
            ShipliteError::Config(format!(
                "cannot start migration tool {}: {}",
                self.config.migrate.program, e
            ))
        })?;

        enum Waited {
            Exited(std::io::Result<ExitStatus>),
            TimedOut,
            Signalled(i32),
        }

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = sleep_opt(timeout_secs.map(Duration::from_secs)) => Waited::TimedOut,
            signal = wait_for_shutdown(&mut self.shutdown) => Waited::Signalled(signal),
        };

        match waited {
            Waited::Exited(status) => {
                let status = status?;
                if status.success() {
                    Ok(MigrationOutcome::Success)
                } else {
                    Ok(MigrationOutcome::Failure(exit_status_code(status)))
                }
            }
            Waited::TimedOut => {
                let timeout_secs = timeout_secs.unwrap_or_default();
                tracing::error!(timeout_secs, "migration exceeded its deadline, killing it");
                kill_child(&mut child).await;
                Err(ShipliteError::MigrationTimeout { timeout_secs })
            }
            Waited::Signalled(signal) => {
                tracing::warn!(signal, "termination received during migration");
                shutdown_child(&mut child, grace).await;
                Err(ShipliteError::Interrupted { signal })
            }
        }
    }

    /// Start the service process and stay with it until it ends.
    async fn serve(&mut self) -> ShipliteResult<ServeOutcome> {
        let grace = self.config.shutdown_grace();
        let env = self.config.phase_env();

        tracing::info!(
            phase = ?BootPhase::Serving,
            command = %self.config.serve,
            port = self.config.service_port,
            "migrations applied, starting service"
        );

        let mut child =
            spawn_phase(&self.config.serve, &env).map_err(|e| ShipliteError::ServiceStartup {
                reason: format!(
                    "cannot start service process {}: {}",
                    self.config.serve.program, e
                ),
                code: 1,
            })?;

        enum Waited {
            Exited(std::io::Result<ExitStatus>),
            Signalled(i32),
        }

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            signal = wait_for_shutdown(&mut self.shutdown) => Waited::Signalled(signal),
        };

        match waited {
            Waited::Exited(status) => {
                let status = status?;
                if status.success() {
                    tracing::info!("service exited cleanly");
                    Ok(ServeOutcome::Completed)
                } else {
                    let code = exit_status_code(status);
                    Err(ShipliteError::ServiceStartup {
                        reason: format!("service process exited with status {}", code),
                        code,
                    })
                }
            }
            Waited::Signalled(signal) => {
                tracing::info!(signal, "termination received, shutting service down");
                shutdown_child(&mut child, grace).await;
                Ok(ServeOutcome::Shutdown { signal })
            }
        }
    }
}

/// Spawn a phase child in its own process group with the shared phase
/// environment. stdout/stderr stay inherited - phase output belongs to the
/// container's log streams.
fn spawn_phase(spec: &CommandSpec, env: &[(String, String)]) -> std::io::Result<Child> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd.process_group(0);
    cmd.stdin(Stdio::null());
    cmd.spawn()
}

/// Completes when the optional deadline passes; never completes without one.
async fn sleep_opt(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// SIGTERM the phase's process group, give it `grace`, then SIGKILL.
async fn shutdown_child(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        return;
    };
    terminate_group(pid);
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        tracing::warn!(pid, "phase ignored SIGTERM, killing process group");
        kill_group(pid);
        let _ = child.wait().await;
    }
}

/// Immediate SIGKILL, then reap.
async fn kill_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_opt_none_never_fires() {
        let waited =
            tokio::time::timeout(Duration::from_millis(50), sleep_opt(None)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn sleep_opt_some_fires() {
        let waited = tokio::time::timeout(
            Duration::from_secs(5),
            sleep_opt(Some(Duration::from_millis(10))),
        )
        .await;
        assert!(waited.is_ok());
    }
}
