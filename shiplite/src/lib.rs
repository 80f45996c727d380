//! Shiplite - container build-and-boot pipeline.
//!
//! Shiplite turns a locked dependency manifest into a minimal runtime image
//! and, on container start, gates the service process behind schema
//! migration success.
//!
//! ## Architecture
//!
//! ```text
//! Build side (once per build):
//!   Resolve ──→ [Materialize ∥ BasePrep] ──→ Assemble ──→ (Export)
//!     manifest+lock      package tree         frozen-list      tar.gz
//!     requirement list   fresh staging base   install + swap
//!
//! Boot side (once per container start):
//!   Init ──→ Migrating ──→ Serving     (migration exited 0)
//!                      └─→ Failed      (exit status propagated)
//! ```
//!
//! The build output (installed packages + requirement list) is copied, never
//! rebuilt, into the runtime image. The boot side is strictly sequential:
//! the service process is spawned only after the migration tool has exited
//! successfully, so a schema-stale service is structurally unreachable.

pub mod boot;
pub mod build;
pub mod config;
pub mod image;
pub mod manifest;
pub mod pipeline;
pub mod store;
pub mod util;

pub use boot::{BootSequencer, MigrationOutcome, ServeOutcome, ShutdownHandle};
pub use build::{BuildReport, BuildTarget, ImageBuilder};
pub use config::{BuildConfig, CommandSpec, DatabaseConfig, RuntimeConfig};
pub use image::RuntimeImage;
pub use shiplite_shared::errors::{ShipliteError, ShipliteResult};
