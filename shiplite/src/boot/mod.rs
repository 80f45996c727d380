//! Boot sequencing: migrate, then serve.
//!
//! ## State machine
//!
//! ```text
//! Init ──→ Migrating ──→ Serving    (migration tool exited 0)
//!                    └─→ Failed     (exit status propagated, service
//!                                    never spawned)
//! ```
//!
//! The two phases are composed sequentially in one process chain; the
//! service command is only ever reached by pattern-matching a successful
//! [`MigrationOutcome`], so a service observing a stale schema is
//! structurally unreachable. There is no retry here - a failed migration
//! ends this boot attempt and the orchestrator owns restart policy.
//!
//! Replicas may boot concurrently against one database. Mutual exclusion of
//! schema changes belongs to the migration tool's own locking; the sequencer
//! assumes it and only ever propagates the tool's verdict.

mod sequencer;
mod shutdown;

pub use sequencer::{BootPhase, BootSequencer, MigrationOutcome, ServeOutcome};
pub use shutdown::{ShutdownHandle, spawn_signal_listener};
