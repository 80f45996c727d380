//! Shared types for the Shiplite workspace.
//!
//! Kept separate from the main crate so that auxiliary tooling can speak the
//! same error taxonomy without pulling in the full pipeline.

pub mod errors;

pub use errors::{ShipliteError, ShipliteResult};
