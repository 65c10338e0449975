use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::debug;

use crate::app::config::SessionConfig;
use crate::app::process::child::{ProcessLauncher, Signal};
use crate::app::simpleperf::termination::{CloseStdinAndSignal, SignalOnly, TerminationStrategy};

pub const ANDROID_Q_SDK: u32 = 29;

/// Facts about the host the session runs on.
pub trait EnvironmentInfo: Send + Sync {
    /// Package name of the current app process.
    fn package_name(&self) -> io::Result<String>;
    fn sdk_version(&self) -> Option<u32>;
    fn termination_strategy(&self, executable: &Path) -> Arc<dyn TerminationStrategy>;
}

pub fn select_termination_strategy(
    sdk_version: Option<u32>,
    executable: &Path,
    image_path: &Path,
) -> Arc<dyn TerminationStrategy> {
    if sdk_version == Some(ANDROID_Q_SDK) && executable == image_path {
        Arc::new(SignalOnly(Signal::Terminate))
    } else {
        Arc::new(CloseStdinAndSignal(Signal::Terminate))
    }
}

/// `/proc/<pid>/cmdline` is NUL-separated; app processes are named after their package.
pub fn parse_cmdline(bytes: &[u8]) -> String {
    let first = bytes.split(|byte| *byte == 0).next().unwrap_or_default();
    String::from_utf8_lossy(first).trim().to_string()
}

pub struct HostEnvironment {
    cmdline_path: PathBuf,
    image_path: PathBuf,
    getprop_path: String,
    sdk_property: String,
    probe_timeout: Duration,
    launcher: Arc<dyn ProcessLauncher>,
    sdk_version: OnceLock<Option<u32>>,
    trace_id: String,
}

impl HostEnvironment {
    pub fn new(config: &SessionConfig, launcher: Arc<dyn ProcessLauncher>, trace_id: &str) -> Self {
        Self {
            cmdline_path: PathBuf::from("/proc/self/cmdline"),
            image_path: PathBuf::from(&config.paths.image_simpleperf_path),
            getprop_path: config.properties.getprop_path.clone(),
            sdk_property: config.properties.sdk_version_property.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            launcher,
            sdk_version: OnceLock::new(),
            trace_id: trace_id.to_string(),
        }
    }

    pub fn with_cmdline_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cmdline_path = path.into();
        self
    }

    fn read_sdk_version(&self) -> Option<u32> {
        let args = vec![self.sdk_property.clone()];
        match self
            .launcher
            .run(&self.getprop_path, &args, self.probe_timeout, &self.trace_id)
        {
            Ok(output) if output.success() => output.stdout.trim().parse::<u32>().ok(),
            Ok(output) => {
                debug!(trace_id = %self.trace_id, exit_code = ?output.exit_code, "getprop sdk failed");
                None
            }
            Err(err) => {
                debug!(trace_id = %self.trace_id, error = %err, "sdk version unavailable");
                None
            }
        }
    }
}

impl EnvironmentInfo for HostEnvironment {
    fn package_name(&self) -> io::Result<String> {
        let bytes = fs::read(&self.cmdline_path)?;
        Ok(parse_cmdline(&bytes))
    }

    fn sdk_version(&self) -> Option<u32> {
        *self.sdk_version.get_or_init(|| self.read_sdk_version())
    }

    fn termination_strategy(&self, executable: &Path) -> Arc<dyn TerminationStrategy> {
        select_termination_strategy(self.sdk_version(), executable, &self.image_path)
    }
}
