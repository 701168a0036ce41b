//! Backend process launch support.
//!
//! This module provides:
//! - Environment-variable construction for the backend process (`env`)
//! - Signal-based soft cancellation of the backend process tree (`process`)

pub mod env;
pub mod process;

pub use env::{build_environment, shell_exports, Device, LaunchOptions, RuntimeIsolation};
pub use process::{descendant_pids, force_kill, pid_is_alive, soft_interrupt, wait_for_exit};
