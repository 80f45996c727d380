//! Small shared utilities.

pub mod fs;
pub mod process;

pub use process::{exit_status_code, is_process_alive, kill_group, terminate_group};
