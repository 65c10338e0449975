use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::config::SessionConfig;
use crate::app::error::AppError;
use crate::app::models::{SessionState, SessionSummary};
use crate::app::process::child::{HostLauncher, ProcessLauncher, ProfilerProcess, Signal};
use crate::app::simpleperf::environment::{EnvironmentInfo, HostEnvironment};
use crate::app::simpleperf::locator::{check_perf_enabled, find_simpleperf};
use crate::app::simpleperf::options::{RecordOptions, TRACE_OFFCPU_ARG};
use crate::app::simpleperf::protocol::{
    await_started, record_prefix, send_command, CMD_PAUSE, CMD_RESUME,
};

struct SessionInner {
    state: SessionState,
    executable_path: Option<PathBuf>,
    process: Option<Box<dyn ProfilerProcess>>,
    trace_offcpu: bool,
}

/// Drives one `simpleperf record` run inside the app.
///
/// ```ignore
/// let session = ProfileSession::for_current_app(SessionConfig::default())?;
/// session.start(&RecordOptions::new().dwarf_call_graph())?;
/// std::thread::sleep(Duration::from_secs(1));
/// session.pause()?;
/// std::thread::sleep(Duration::from_secs(1));
/// session.resume()?;
/// std::thread::sleep(Duration::from_secs(1));
/// session.stop()?;
/// ```
///
/// Recording output lands in `<app_data_dir>/simpleperf_data/`. Messages from the
/// recorder itself go to logcat under the `simpleperf` tag.
pub struct ProfileSession {
    app_data_dir: PathBuf,
    data_dir: PathBuf,
    trace_id: String,
    config: SessionConfig,
    environment: Arc<dyn EnvironmentInfo>,
    launcher: Arc<dyn ProcessLauncher>,
    inner: Mutex<SessionInner>,
}

impl ProfileSession {
    /// `app_data_dir` is the app's private data directory (`Context.getDataDir()`).
    pub fn new(app_data_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(app_data_dir, SessionConfig::default())
    }

    pub fn with_config(app_data_dir: impl Into<PathBuf>, config: SessionConfig) -> Self {
        let trace_id = Uuid::new_v4().to_string();
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(HostLauncher);
        let environment = Arc::new(HostEnvironment::new(&config, Arc::clone(&launcher), &trace_id));
        Self::build(app_data_dir.into(), config, environment, launcher, trace_id)
    }

    /// Uses `<app_data_root>/<package name>` as the app data directory.
    pub fn for_current_app(config: SessionConfig) -> Result<Self, AppError> {
        let trace_id = Uuid::new_v4().to_string();
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(HostLauncher);
        let environment: Arc<dyn EnvironmentInfo> =
            Arc::new(HostEnvironment::new(&config, Arc::clone(&launcher), &trace_id));
        let app_data_dir = app_data_dir_for(&config, environment.as_ref(), &trace_id)?;
        Ok(Self::build(app_data_dir, config, environment, launcher, trace_id))
    }

    pub fn with_host(
        app_data_dir: impl Into<PathBuf>,
        config: SessionConfig,
        environment: Arc<dyn EnvironmentInfo>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let trace_id = Uuid::new_v4().to_string();
        Self::build(app_data_dir.into(), config, environment, launcher, trace_id)
    }

    fn build(
        app_data_dir: PathBuf,
        config: SessionConfig,
        environment: Arc<dyn EnvironmentInfo>,
        launcher: Arc<dyn ProcessLauncher>,
        trace_id: String,
    ) -> Self {
        let data_dir = app_data_dir.join(&config.app_data.data_dir_name);
        Self {
            app_data_dir,
            data_dir,
            trace_id,
            config,
            environment,
            launcher,
            inner: Mutex::new(SessionInner {
                state: SessionState::NotStarted,
                executable_path: None,
                process: None,
                trace_offcpu: false,
            }),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn app_data_dir(&self) -> &Path {
        &self.app_data_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn state(&self) -> SessionState {
        self.lock_unpoisoned().state
    }

    pub fn executable_path(&self) -> Option<PathBuf> {
        self.lock_unpoisoned().executable_path.clone()
    }

    pub fn summary(&self) -> SessionSummary {
        let inner = self.lock_unpoisoned();
        SessionSummary {
            trace_id: self.trace_id.clone(),
            state: inner.state,
            data_dir: self.data_dir.to_string_lossy().to_string(),
            executable_path: inner
                .executable_path
                .as_ref()
                .map(|path| path.to_string_lossy().to_string()),
            trace_offcpu: inner.trace_offcpu,
        }
    }

    pub fn start(&self, options: &RecordOptions) -> Result<(), AppError> {
        self.start_with_args(options.to_record_args())
    }

    /// Starts with raw `simpleperf record` arguments.
    pub fn start_with_args(&self, args: Vec<String>) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if inner.state != SessionState::NotStarted {
            return Err(self.wrong_state("start", inner.state));
        }
        let trace_offcpu = args.iter().any(|arg| arg == TRACE_OFFCPU_ARG);

        let executable = find_simpleperf(
            &self.config,
            &self.app_data_dir,
            self.launcher.as_ref(),
            &self.trace_id,
        )?;
        check_perf_enabled(&self.config, self.launcher.as_ref(), &self.trace_id)?;
        self.create_data_dir()?;

        let mut full_args = record_prefix(&self.config.paths.tracepoint_events_path);
        full_args.extend(args);
        debug!(
            trace_id = %self.trace_id,
            program = %executable.display(),
            args = ?full_args,
            "spawning simpleperf"
        );
        let mut process = self
            .launcher
            .spawn(&executable, &full_args, &self.data_dir)
            .map_err(|err| {
                AppError::startup(
                    format!("failed to create simpleperf process: {err}"),
                    &self.trace_id,
                )
            })?;

        if let Err(err) = await_started(process.as_mut(), &self.trace_id) {
            self.abandon(process);
            return Err(err);
        }

        inner.trace_offcpu = trace_offcpu;
        inner.executable_path = Some(executable);
        inner.process = Some(process);
        inner.state = SessionState::Started;
        info!(trace_id = %self.trace_id, data_dir = %self.data_dir.display(), "recording started");
        Ok(())
    }

    /// No samples are generated while paused.
    pub fn pause(&self) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if inner.state != SessionState::Started {
            return Err(self.wrong_state("pause", inner.state));
        }
        if inner.trace_offcpu {
            return Err(AppError::config_conflict(
                "--trace-offcpu doesn't work well with pause/resume recording",
                &self.trace_id,
            ));
        }
        let process = self.live_process(&mut inner)?;
        send_command(process, CMD_PAUSE, &self.trace_id)?;
        inner.state = SessionState::Paused;
        info!(trace_id = %self.trace_id, "recording paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if inner.state != SessionState::Paused {
            return Err(self.wrong_state("resume", inner.state));
        }
        let process = self.live_process(&mut inner)?;
        send_command(process, CMD_RESUME, &self.trace_id)?;
        inner.state = SessionState::Started;
        info!(trace_id = %self.trace_id, "recording resumed");
        Ok(())
    }

    /// Stops the recorder and waits for it to write the data file. The session is
    /// finished afterwards, whether or not the recorder exited cleanly. Other calls on
    /// this session block until the recorder has exited.
    pub fn stop(&self) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if !matches!(inner.state, SessionState::Started | SessionState::Paused) {
            return Err(self.wrong_state("stop", inner.state));
        }
        let Some(mut process) = inner.process.take() else {
            inner.state = SessionState::Stopped;
            return Err(AppError::system("simpleperf process handle missing", &self.trace_id));
        };
        let executable = inner.executable_path.clone().unwrap_or_default();

        let result = self.terminate_and_wait(process.as_mut(), &executable);
        drop(process);
        inner.state = SessionState::Stopped;
        if result.is_ok() {
            info!(trace_id = %self.trace_id, "recording stopped");
        }
        result
    }

    fn terminate_and_wait(
        &self,
        process: &mut dyn ProfilerProcess,
        executable: &Path,
    ) -> Result<(), AppError> {
        let strategy = self.environment.termination_strategy(executable);
        debug!(trace_id = %self.trace_id, strategy = strategy.name(), pid = process.pid(), "stopping simpleperf");
        if let Err(err) = strategy.terminate(process) {
            warn!(trace_id = %self.trace_id, error = %err, "failed to stop simpleperf, killing it");
            let _ = process.signal(Signal::Kill);
            let _ = process.wait();
            return Err(AppError::system(
                format!("failed to stop simpleperf: {err}"),
                &self.trace_id,
            ));
        }

        match process.wait() {
            Ok(Some(0)) => Ok(()),
            Ok(Some(code)) => Err(AppError::abnormal_exit(
                format!("simpleperf exited with error: {code}"),
                &self.trace_id,
            )),
            Ok(None) => Err(AppError::abnormal_exit(
                "simpleperf was killed by a signal",
                &self.trace_id,
            )),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                warn!(trace_id = %self.trace_id, "interrupted while waiting for simpleperf to exit");
                Ok(())
            }
            Err(err) => Err(AppError::system(
                format!("failed to wait for simpleperf: {err}"),
                &self.trace_id,
            )),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionInner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::system("session lock poisoned", &self.trace_id))
    }

    fn lock_unpoisoned(&self) -> MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live_process<'a>(
        &self,
        inner: &'a mut SessionInner,
    ) -> Result<&'a mut dyn ProfilerProcess, AppError> {
        match inner.process.as_mut() {
            Some(process) => Ok(process.as_mut()),
            None => Err(AppError::system(
                "simpleperf process handle missing",
                &self.trace_id,
            )),
        }
    }

    fn wrong_state(&self, operation: &str, state: SessionState) -> AppError {
        AppError::invalid_state(
            format!("{operation}: session in wrong state {state}"),
            &self.trace_id,
        )
    }

    fn create_data_dir(&self) -> Result<(), AppError> {
        if self.data_dir.is_dir() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.data_dir).map_err(|err| {
            AppError::system(
                format!(
                    "failed to create simpleperf data dir {}: {err}",
                    self.data_dir.display()
                ),
                &self.trace_id,
            )
        })
    }

    /// Best-effort cleanup of a recorder that never completed the handshake.
    fn abandon(&self, mut process: Box<dyn ProfilerProcess>) {
        process.close_stdin();
        if let Err(err) = process.signal(Signal::Kill) {
            warn!(trace_id = %self.trace_id, error = %err, "failed to kill simpleperf");
        }
        let _ = process.wait();
    }
}

impl Drop for ProfileSession {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(mut process) = inner.process.take() else {
            return;
        };
        warn!(
            trace_id = %self.trace_id,
            state = %inner.state,
            "profile session dropped while simpleperf is still recording, stopping it"
        );
        process.close_stdin();
        if let Err(err) = process.signal(Signal::Terminate) {
            warn!(trace_id = %self.trace_id, error = %err, "failed to signal simpleperf");
        }
    }
}

fn app_data_dir_for(
    config: &SessionConfig,
    environment: &dyn EnvironmentInfo,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    let package_name = environment.package_name().map_err(|err| {
        AppError::validation(format!("failed to find packageName: {err}"), trace_id)
    })?;
    if package_name.is_empty() {
        return Err(AppError::validation("failed to find packageName", trace_id));
    }
    Ok(PathBuf::from(&config.app_data.app_data_root).join(package_name))
}
