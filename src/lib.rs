//! Easel - asset catalog, image pre-flight, and backend supervision core
//! for a diffusion desktop front-end.

pub mod error;

pub mod catalog;
pub mod config;
pub mod launcher;
pub mod preprocess;
pub mod session;

pub use error::{Error, Result};

pub use catalog::{AssetType, Implementation, Model, ModelCatalog, ModelSelection};
pub use config::Settings;
pub use launcher::env::{build_environment, shell_exports, Device, LaunchOptions, RuntimeIsolation};
pub use launcher::process::{
    descendant_pids, force_kill, pid_is_alive, soft_interrupt, wait_for_exit,
};
pub use preprocess::{PreprocessOutcome, Preprocessor};
pub use session::SessionContext;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
