use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::config::SessionConfig;
use crate::app::error::{AppError, ERR_LAUNCH};
use crate::app::process::child::ProcessLauncher;

pub const COPIED_SIMPLEPERF_NAME: &str = "simpleperf";

pub fn is_executable_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && can_execute(path),
        Err(_) => false,
    }
}

/// Asks the kernel whether the calling user may execute `path`.
#[cfg(unix)]
fn can_execute(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}

#[cfg(not(unix))]
fn can_execute(_path: &Path) -> bool {
    true
}

/// Picks the recorder binary: a copy of the staged binary if it can run from the app
/// directory, else the system image binary.
pub fn find_simpleperf(
    config: &SessionConfig,
    app_data_dir: &Path,
    launcher: &dyn ProcessLauncher,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    if let Some(path) = find_in_staging(config, app_data_dir, launcher, trace_id) {
        info!(trace_id = %trace_id, path = %path.display(), "using staged simpleperf");
        return Ok(path);
    }
    let image = PathBuf::from(&config.paths.image_simpleperf_path);
    if is_executable_file(&image) {
        info!(trace_id = %trace_id, path = %image.display(), "using simpleperf from system image");
        return Ok(image);
    }
    Err(AppError::profiler_not_found(
        "can't find simpleperf on device. Please run api_profiler.py.",
        trace_id,
    ))
}

fn find_in_staging(
    config: &SessionConfig,
    app_data_dir: &Path,
    launcher: &dyn ProcessLauncher,
    trace_id: &str,
) -> Option<PathBuf> {
    let staged = Path::new(&config.paths.staging_simpleperf_path);
    if !is_executable_file(staged) {
        return None;
    }
    let to_path = app_data_dir.join(COPIED_SIMPLEPERF_NAME);
    if let Err(err) = fs::copy(staged, &to_path) {
        warn!(trace_id = %trace_id, error = %err, "failed to copy staged simpleperf");
        return None;
    }
    if !is_executable_file(&to_path) {
        return None;
    }
    // Newer platforms refuse to exec files from app data for some target SDKs, so try it.
    let program = to_path.to_string_lossy().to_string();
    let timeout = Duration::from_secs(config.probe_timeout_secs);
    match launcher.run(&program, &[], timeout, trace_id) {
        Err(err) if err.is(ERR_LAUNCH) => {
            warn!(trace_id = %trace_id, error = %err, "copied simpleperf is not executable");
            None
        }
        Err(err) => {
            debug!(trace_id = %trace_id, error = %err, "simpleperf probe did not finish cleanly");
            Some(to_path)
        }
        Ok(_) => Some(to_path),
    }
}

/// Fails when `security.perf_harden` says perf events are locked down. The check is
/// skipped when getprop is missing or fails.
pub fn check_perf_enabled(
    config: &SessionConfig,
    launcher: &dyn ProcessLauncher,
    trace_id: &str,
) -> Result<(), AppError> {
    let args = vec![config.properties.perf_harden_property.clone()];
    let timeout = Duration::from_secs(config.probe_timeout_secs);
    let output = match launcher.run(&config.properties.getprop_path, &args, timeout, trace_id) {
        Ok(output) => output,
        Err(err) => {
            debug!(trace_id = %trace_id, error = %err, "skipping perf_harden check");
            return Ok(());
        }
    };
    if !output.success() {
        debug!(trace_id = %trace_id, exit_code = ?output.exit_code, "skipping perf_harden check");
        return Ok(());
    }
    if output.stdout.starts_with('1') {
        return Err(AppError::permission_denied(
            "linux perf events aren't enabled on the device. Please run api_profiler.py.",
            trace_id,
        ));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::app::process::fake::FakeLauncher;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_file(path: &Path, mode: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, b"#!/bin/sh\nexit 0\n").expect("write");
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
    }

    fn config_in(dir: &Path) -> SessionConfig {
        let mut config = SessionConfig::default();
        config.paths.staging_simpleperf_path =
            dir.join("staging/simpleperf").to_string_lossy().to_string();
        config.paths.image_simpleperf_path =
            dir.join("image/simpleperf").to_string_lossy().to_string();
        config.properties.getprop_path = "fake-getprop".to_string();
        config
    }

    #[test]
    fn prefers_staged_copy() {
        let dir = TempDir::new().expect("tmp");
        let config = config_in(dir.path());
        let app_dir = dir.path().join("app");
        fs::create_dir_all(&app_dir).expect("mkdir");
        write_file(Path::new(&config.paths.staging_simpleperf_path), 0o755);
        write_file(Path::new(&config.paths.image_simpleperf_path), 0o755);

        let launcher = FakeLauncher::default();
        let copied = app_dir.join("simpleperf");
        launcher.set_output(&copied.to_string_lossy(), "usage", Some(1));

        let path = find_simpleperf(&config, &app_dir, &launcher, "t").expect("find");
        assert_eq!(path, copied);
        assert!(is_executable_file(&copied));
        assert_eq!(launcher.runs().len(), 1);
        assert!(launcher.runs()[0].1.is_empty());
    }

    #[test]
    fn falls_back_to_image_when_copy_cannot_run() {
        let dir = TempDir::new().expect("tmp");
        let config = config_in(dir.path());
        let app_dir = dir.path().join("app");
        fs::create_dir_all(&app_dir).expect("mkdir");
        write_file(Path::new(&config.paths.staging_simpleperf_path), 0o755);
        write_file(Path::new(&config.paths.image_simpleperf_path), 0o755);

        // No output registered for the copy: the fake reports a launch failure.
        let launcher = FakeLauncher::default();
        let path = find_simpleperf(&config, &app_dir, &launcher, "t").expect("find");
        assert_eq!(path, PathBuf::from(&config.paths.image_simpleperf_path));
    }

    #[test]
    fn non_executable_image_is_not_found() {
        let dir = TempDir::new().expect("tmp");
        let config = config_in(dir.path());
        write_file(Path::new(&config.paths.image_simpleperf_path), 0o644);

        let launcher = FakeLauncher::default();
        let err = find_simpleperf(&config, dir.path(), &launcher, "trace-nf").unwrap_err();
        assert_eq!(err.code, "ERR_PROFILER_NOT_FOUND");
        assert_eq!(err.trace_id, "trace-nf");
        assert!(launcher.runs().is_empty());
    }

    #[test]
    fn executable_check_follows_access_rules() {
        let dir = TempDir::new().expect("tmp");
        let cases = [
            ("owner_only", 0o700, true),
            ("everyone", 0o711, true),
            ("plain", 0o644, false),
        ];
        for (name, mode, expected) in cases {
            let path = dir.path().join(name);
            write_file(&path, mode);
            assert_eq!(is_executable_file(&path), expected, "{name} {mode:o}");
        }
        assert!(!is_executable_file(dir.path()));
        assert!(!is_executable_file(&dir.path().join("missing")));
    }

    #[test]
    fn perf_harden_one_is_denied() {
        let config = config_in(Path::new("/unused"));
        let launcher = FakeLauncher::default();
        launcher.set_output("fake-getprop", "1\n", Some(0));
        let err = check_perf_enabled(&config, &launcher, "t").unwrap_err();
        assert_eq!(err.code, "ERR_PERMISSION_DENIED");
        assert_eq!(
            launcher.runs()[0].1,
            vec!["security.perf_harden".to_string()]
        );
    }

    #[test]
    fn perf_harden_zero_or_missing_getprop_is_allowed() {
        let config = config_in(Path::new("/unused"));
        let launcher = FakeLauncher::default();
        assert!(check_perf_enabled(&config, &launcher, "t").is_ok());

        launcher.set_output("fake-getprop", "0\n", Some(0));
        assert!(check_perf_enabled(&config, &launcher, "t").is_ok());

        launcher.set_output("fake-getprop", "1\n", Some(1));
        assert!(check_perf_enabled(&config, &launcher, "t").is_ok());
    }
}
