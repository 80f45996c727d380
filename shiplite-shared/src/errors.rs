//! Error taxonomy for the build-and-boot pipeline.
//!
//! Build-time failures (`Resolution`, `Compilation`, `InstallMismatch`) stop
//! image creation and are surfaced to the build tool. Boot-time failures
//! (`Migration`, `MigrationTimeout`, `ServiceStartup`, `Interrupted`) abort
//! the boot attempt and become the container's exit status. Nothing in this
//! taxonomy is recovered locally.

use thiserror::Error;

pub type ShipliteResult<T> = Result<T, ShipliteError>;

#[derive(Error, Debug)]
pub enum ShipliteError {
    /// Manifest and lock file cannot be resolved: a declared version is
    /// unsatisfiable, the lock is stale or inconsistent, or a pinned package
    /// is absent from the package store.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// A native package could not be built with the available toolchain.
    #[error("compilation failed: {0}")]
    Compilation(String),

    /// The frozen requirement list could not be installed verbatim into the
    /// runtime image.
    #[error("install mismatch: {0}")]
    InstallMismatch(String),

    /// The migration tool exited nonzero. The code is passed through as the
    /// container's exit status, untranslated.
    #[error("migration tool exited with status {code}")]
    Migration { code: i32 },

    /// The migration tool did not complete within the configured bound.
    #[error("migration tool did not finish within {timeout_secs}s")]
    MigrationTimeout { timeout_secs: u64 },

    /// The service process failed after migration success.
    #[error("service process failed: {reason}")]
    ServiceStartup { reason: String, code: i32 },

    /// A termination signal arrived before the service phase was reached.
    #[error("boot interrupted by signal {signal}")]
    Interrupted { signal: i32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShipliteError {
    /// Process exit code for this failure.
    ///
    /// Migration failures propagate the tool's own status. Timeouts use the
    /// conventional 124. Signal interruptions use 128 + signo. Everything
    /// else collapses to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShipliteError::Migration { code } => *code,
            ShipliteError::MigrationTimeout { .. } => 124,
            ShipliteError::ServiceStartup { code, .. } => *code,
            ShipliteError::Interrupted { signal } => 128 + signal,
            _ => 1,
        }
    }

    /// True for failures that belong to image creation rather than boot.
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self,
            ShipliteError::Resolution(_)
                | ShipliteError::Compilation(_)
                | ShipliteError::InstallMismatch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_code_passes_through() {
        let err = ShipliteError::Migration { code: 7 };
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn timeout_uses_conventional_code() {
        let err = ShipliteError::MigrationTimeout { timeout_secs: 30 };
        assert_eq!(err.exit_code(), 124);
    }

    #[test]
    fn interrupt_maps_to_signal_range() {
        let err = ShipliteError::Interrupted { signal: 15 };
        assert_eq!(err.exit_code(), 143);
    }

    #[test]
    fn build_failures_are_classified() {
        assert!(ShipliteError::Resolution("x".into()).is_build_failure());
        assert!(!ShipliteError::Migration { code: 1 }.is_build_failure());
    }
}
