//! Launch-environment and process-signalling tests.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use easel::{
    build_environment, descendant_pids, force_kill, soft_interrupt, wait_for_exit, Device,
    LaunchOptions, RuntimeIsolation, SessionContext,
};

fn session(dir: &TempDir) -> SessionContext {
    SessionContext::with_timestamp(dir.path().join("data"), "2026-01-02-03-04-05")
}

fn options(backend_dir: PathBuf) -> LaunchOptions {
    LaunchOptions {
        backend_dir,
        isolation: RuntimeIsolation::Direct,
        device: Device::Automatic,
        all_devices: false,
    }
}

#[test]
fn search_path_puts_backend_dirs_first() {
    let dir = TempDir::new().unwrap();
    let backend = dir.path().join("backend");

    let vars = build_environment(&options(backend.clone()), &session(&dir)).unwrap();
    let path = vars.get("PATH").expect("PATH is always set");

    let venv = backend.join("venv").join("Scripts");
    assert!(path.starts_with(venv.to_str().unwrap()));

    // Isolated mode swaps in the self-contained runtime directories.
    let mut opts = options(backend.clone());
    opts.isolation = RuntimeIsolation::Isolated;
    let vars = build_environment(&opts, &session(&dir)).unwrap();
    let path = vars.get("PATH").unwrap();
    assert!(path.starts_with(backend.join("conda").to_str().unwrap()));
}

#[test]
fn device_visibility_override() {
    let dir = TempDir::new().unwrap();
    let backend = dir.path().join("backend");

    // Automatic leaves visibility untouched.
    let vars = build_environment(&options(backend.clone()), &session(&dir)).unwrap();
    assert!(!vars.contains_key("CUDA_VISIBLE_DEVICES"));

    // CPU disables all devices.
    let mut opts = options(backend.clone());
    opts.device = Device::Cpu;
    let vars = build_environment(&opts, &session(&dir)).unwrap();
    assert_eq!(vars.get("CUDA_VISIBLE_DEVICES").unwrap(), "-1");

    // Explicit device index passes through.
    let mut opts = options(backend.clone());
    opts.device = Device::Index(1);
    let vars = build_environment(&opts, &session(&dir)).unwrap();
    assert_eq!(vars.get("CUDA_VISIBLE_DEVICES").unwrap(), "1");

    // all_devices suppresses the override entirely.
    let mut opts = options(backend);
    opts.device = Device::Cpu;
    opts.all_devices = true;
    let vars = build_environment(&opts, &session(&dir)).unwrap();
    assert!(!vars.contains_key("CUDA_VISIBLE_DEVICES"));
}

#[test]
fn cache_overrides_point_into_managed_root() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let backend = dir.path().join("backend");

    let vars = build_environment(&options(backend), &session).unwrap();
    let cache_root = session.cache_dir().unwrap();

    // Whether the overrides appear depends on the user's real cache
    // directories; when they do appear they must point into the managed
    // data root.
    if let Some(value) = vars.get("TRANSFORMERS_CACHE") {
        assert!(PathBuf::from(value).starts_with(&cache_root));
    }
    if let Some(value) = vars.get("TORCH_HOME") {
        assert!(PathBuf::from(value).starts_with(&cache_root));
    }
}

#[cfg(unix)]
mod signals {
    use super::*;

    #[test]
    fn soft_interrupt_reaches_descendants() {
        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg("sleep 30; sleep 30")
            .spawn()
            .expect("spawn shell");
        let pid = child.id();

        // Give the shell a moment to fork its child.
        std::thread::sleep(Duration::from_millis(200));

        let descendants = descendant_pids(pid);
        assert!(
            !descendants.is_empty(),
            "shell should have at least one child process"
        );

        soft_interrupt(pid);
        assert!(
            wait_for_exit(pid, Duration::from_secs(5)),
            "process tree should stop after SIGINT"
        );

        let _ = child.wait();
    }

    #[test]
    fn force_kill_terminates_stubborn_process() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id();

        assert!(force_kill(pid, Duration::from_secs(2)));
        let _ = child.wait();
    }

    #[test]
    fn signalling_an_exited_process_is_silent() {
        let mut child = std::process::Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait");

        soft_interrupt(pid);
        assert!(force_kill(pid, Duration::from_millis(10)));
    }
}
