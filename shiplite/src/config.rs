//! Pipeline configuration.
//!
//! Boot-side settings are resolved exactly once into a [`RuntimeConfig`];
//! the sequencer derives a single environment from it and injects that same
//! environment into both the migration tool and the service process. The
//! two phases can therefore never observe drifting configuration, no matter
//! what happens to the process environment between them.

use serde::{Deserialize, Serialize};
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database connection parameters handed to both boot phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

/// An external command: program plus arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Boot-side configuration (set once before the sequencer starts, never
/// changes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub database: DatabaseConfig,
    /// Port the service process binds; exported as SERVICE_PORT.
    pub service_port: u16,
    /// Migration tool invocation. Exits 0 when all pending migrations are
    /// applied or none are pending.
    pub migrate: CommandSpec,
    /// Service process invocation; serves until terminated.
    pub serve: CommandSpec,
    /// Upper bound on the migration phase. Unset means the sequencer waits
    /// indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_timeout_secs: Option<u64>,
    /// How long a signalled child gets to exit before SIGKILL.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> ShipliteResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ShipliteError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: RuntimeConfig = serde_json::from_slice(&bytes)
            .map_err(|e| ShipliteError::Config(format!("invalid config: {}", e)))?;
        config.sanitize()?;
        Ok(config)
    }

    pub fn sanitize(&self) -> ShipliteResult<()> {
        if self.migrate.program.is_empty() {
            return Err(ShipliteError::Config("migrate command is empty".into()));
        }
        if self.serve.program.is_empty() {
            return Err(ShipliteError::Config("serve command is empty".into()));
        }
        if self.service_port == 0 {
            return Err(ShipliteError::Config("service_port must be nonzero".into()));
        }
        Ok(())
    }

    /// Overlay database parameters and the service port from the process
    /// environment. Called once, before the sequencer starts.
    pub fn apply_env(&mut self) -> ShipliteResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, get: F) -> ShipliteResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = get("DB_PORT") {
            self.database.port = parse_env("DB_PORT", &v)?;
        }
        if let Some(v) = get("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = get("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = get("DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = get("DB_CONN_TIMEOUT") {
            self.database.connect_timeout_secs = Some(parse_env("DB_CONN_TIMEOUT", &v)?);
        }
        if let Some(v) = get("SERVICE_PORT") {
            self.service_port = parse_env("SERVICE_PORT", &v)?;
        }
        Ok(())
    }

    /// The one environment injected into both the migration tool and the
    /// service process.
    pub fn phase_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("DB_HOST".to_string(), self.database.host.clone()),
            ("DB_PORT".to_string(), self.database.port.to_string()),
            ("DB_USER".to_string(), self.database.user.clone()),
            ("DB_PASSWORD".to_string(), self.database.password.clone()),
            ("DB_NAME".to_string(), self.database.name.clone()),
            ("SERVICE_PORT".to_string(), self.service_port.to_string()),
        ];
        if let Some(timeout) = self.database.connect_timeout_secs {
            env.push(("DB_CONN_TIMEOUT".to_string(), timeout.to_string()));
        }
        env
    }

    pub fn migration_timeout(&self) -> Option<Duration> {
        self.migration_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> ShipliteResult<T> {
    value
        .parse()
        .map_err(|_| ShipliteError::Config(format!("invalid {}: {}", key, value)))
}

/// Build-side configuration: input paths, toolchain, output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Dependency manifest (TOML).
    pub manifest: PathBuf,
    /// Lock file pinning the transitive set (JSON).
    pub lock: PathBuf,
    /// Package store directory.
    pub store: PathBuf,
    /// Service source tree copied into the image.
    pub app_dir: PathBuf,
    /// Scratch root for the builder stage; survives between builds.
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,
    /// Final image location; replaced wholesale on every build.
    #[serde(default = "default_image_root")]
    pub image_root: PathBuf,
    /// Toolchain directory, present during the builder stage only.
    /// Required when the lock pins native packages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain_dir: Option<PathBuf>,
    /// Runtime shared libraries copied into the image's lib/ subset.
    #[serde(default)]
    pub runtime_libs: Vec<PathBuf>,
}

fn shiplite_home() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("shiplite")
}

fn default_build_root() -> PathBuf {
    shiplite_home().join("build")
}

fn default_image_root() -> PathBuf {
    shiplite_home().join("image")
}

impl BuildConfig {
    pub fn load(path: &Path) -> ShipliteResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ShipliteError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: BuildConfig = serde_json::from_slice(&bytes)
            .map_err(|e| ShipliteError::Config(format!("invalid config: {}", e)))?;
        config.sanitize()?;
        Ok(config)
    }

    pub fn sanitize(&self) -> ShipliteResult<()> {
        if !self.manifest.is_file() {
            return Err(ShipliteError::Config(format!(
                "manifest {} does not exist",
                self.manifest.display()
            )));
        }
        if !self.lock.is_file() {
            return Err(ShipliteError::Config(format!(
                "lock file {} does not exist",
                self.lock.display()
            )));
        }
        if !self.store.is_dir() {
            return Err(ShipliteError::Config(format!(
                "package store {} does not exist",
                self.store.display()
            )));
        }
        if !self.app_dir.is_dir() {
            return Err(ShipliteError::Config(format!(
                "service source tree {} does not exist",
                self.app_dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            database: DatabaseConfig {
                host: "db".into(),
                port: 5432,
                user: "svc".into(),
                password: "secret".into(),
                name: "orgbook".into(),
                connect_timeout_secs: Some(3),
            },
            service_port: 8000,
            migrate: CommandSpec {
                program: "migrate".into(),
                args: vec!["upgrade".into(), "head".into()],
            },
            serve: CommandSpec {
                program: "serve".into(),
                args: vec![],
            },
            migration_timeout_secs: None,
            shutdown_grace_secs: 10,
        }
    }

    #[test]
    fn phase_env_is_complete() {
        let env = sample_runtime_config().phase_env();
        let lookup = |key: &str| {
            env.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(lookup("DB_HOST"), Some("db"));
        assert_eq!(lookup("DB_PORT"), Some("5432"));
        assert_eq!(lookup("DB_NAME"), Some("orgbook"));
        assert_eq!(lookup("DB_CONN_TIMEOUT"), Some("3"));
        assert_eq!(lookup("SERVICE_PORT"), Some("8000"));
    }

    #[test]
    fn env_overlay_wins_over_file_values() {
        let mut config = sample_runtime_config();
        config
            .apply_env_from(|key| match key {
                "DB_HOST" => Some("db-replica".into()),
                "SERVICE_PORT" => Some("9000".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.database.host, "db-replica");
        assert_eq!(config.service_port, 9000);
        // untouched keys keep their file values
        assert_eq!(config.database.user, "svc");
    }

    #[test]
    fn env_overlay_rejects_garbage_ports() {
        let mut config = sample_runtime_config();
        let err = config
            .apply_env_from(|key| (key == "DB_PORT").then(|| "not-a-port".into()))
            .unwrap_err();
        assert!(matches!(err, ShipliteError::Config(_)));
    }

    #[test]
    fn sanitize_rejects_empty_commands() {
        let mut config = sample_runtime_config();
        config.migrate.program.clear();
        assert!(config.sanitize().is_err());
    }

    #[test]
    fn command_spec_displays_as_a_command_line() {
        let config = sample_runtime_config();
        assert_eq!(config.migrate.to_string(), "migrate upgrade head");
        assert_eq!(config.serve.to_string(), "serve");
    }

    #[test]
    fn build_config_defaults_output_roots() {
        let config: BuildConfig = serde_json::from_str(
            r#"{"manifest":"m.toml","lock":"m.lock.json","store":"store","app_dir":"app"}"#,
        )
        .unwrap();
        assert!(config.build_root.ends_with("build"));
        assert!(config.image_root.ends_with("image"));
        assert!(config.toolchain_dir.is_none());
        assert!(config.runtime_libs.is_empty());
    }
}
