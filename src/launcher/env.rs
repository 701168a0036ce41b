//! Environment-variable construction for the backend process.
//!
//! The backend is an opaque executable; everything it needs to find its
//! runtime, pick a compute device, and place library caches travels through
//! environment variables built here.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use crate::error::Result;
use crate::session::SessionContext;

/// How the backend's runtime is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeIsolation {
    /// Self-contained environment shipped with the backend.
    Isolated,
    /// Direct interpreter plus tooling directories.
    Direct,
}

/// Compute device selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Automatic,
    Cpu,
    Index(u32),
}

impl Device {
    /// Translate the UI option index: slots 0 and 1 are the Automatic and
    /// CPU pseudo-options, real device indices start at 2.
    pub fn from_option_index(index: i64) -> Self {
        match index {
            i if i <= 0 => Device::Automatic,
            1 => Device::Cpu,
            i => Device::Index((i - 2) as u32),
        }
    }
}

/// Inputs for one backend launch.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Directory the backend runtime lives in.
    pub backend_dir: PathBuf,
    pub isolation: RuntimeIsolation,
    pub device: Device,
    /// When set, the device-visibility override is left untouched.
    pub all_devices: bool,
}

/// Deterministically construct the environment-variable set for a backend
/// launch.
pub fn build_environment(
    options: &LaunchOptions,
    session: &SessionContext,
) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();

    let base = &options.backend_dir;
    // Earlier entries win on lookup, so the backend's own tooling shadows
    // anything already installed on the machine.
    let search_dirs: Vec<PathBuf> = match options.isolation {
        RuntimeIsolation::Isolated => vec![
            base.join("conda"),
            base.join("conda").join("Scripts"),
            base.join("conda").join("condabin"),
            base.join("conda").join("Library").join("bin"),
        ],
        RuntimeIsolation::Direct => vec![
            base.join("venv").join("Scripts"),
            base.join("python").join("Scripts"),
            base.join("python"),
            base.join("git").join("cmd"),
        ],
    };
    vars.insert("PATH".to_string(), search_path(&search_dirs));

    if !options.all_devices {
        match options.device {
            Device::Automatic => {}
            Device::Cpu => {
                vars.insert("CUDA_VISIBLE_DEVICES".to_string(), "-1".to_string());
            }
            Device::Index(n) => {
                vars.insert("CUDA_VISIBLE_DEVICES".to_string(), n.to_string());
            }
        }
    }

    // Only redirect library caches the user/OS has not already populated.
    if let Some(home) = dirs::home_dir() {
        let cache_root = session.cache_dir()?;

        if !home.join(".cache").join("huggingface").join("transformers").is_dir() {
            vars.insert(
                "TRANSFORMERS_CACHE".to_string(),
                cache_root.join("trfm").display().to_string(),
            );
        }

        if !home.join(".cache").join("torch").is_dir() {
            vars.insert(
                "TORCH_HOME".to_string(),
                cache_root.join("torch").display().to_string(),
            );
        }
    }

    Ok(vars)
}

/// Render the variable set as `KEY=VALUE` assignments, one per line, for
/// launch scripts and log output.
pub fn shell_exports(vars: &BTreeMap<String, String>) -> String {
    vars.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn search_path(dirs: &[PathBuf]) -> String {
    let mut paths: Vec<PathBuf> = dirs.to_vec();
    if let Some(existing) = env::var_os("PATH") {
        paths.extend(env::split_paths(&existing));
    }

    match env::join_paths(&paths) {
        Ok(joined) => joined.to_string_lossy().into_owned(),
        Err(_) => paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_from_option_index() {
        assert_eq!(Device::from_option_index(0), Device::Automatic);
        assert_eq!(Device::from_option_index(1), Device::Cpu);
        assert_eq!(Device::from_option_index(2), Device::Index(0));
        assert_eq!(Device::from_option_index(5), Device::Index(3));
        assert_eq!(Device::from_option_index(-1), Device::Automatic);
    }

    #[test]
    fn test_search_path_preserves_order() {
        let dirs = vec![PathBuf::from("/first"), PathBuf::from("/second")];
        let path = search_path(&dirs);

        let first = path.find("/first").unwrap();
        let second = path.find("/second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_shell_exports() {
        let mut vars = BTreeMap::new();
        vars.insert("B".to_string(), "2".to_string());
        vars.insert("A".to_string(), "1".to_string());

        assert_eq!(shell_exports(&vars), "A=1\nB=2");
    }
}
