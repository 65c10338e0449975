use crate::app::error::AppError;
use crate::app::process::child::ProfilerProcess;

pub const CMD_PAUSE: &str = "pause";
pub const CMD_RESUME: &str = "resume";
pub const REPLY_STARTED: &str = "started";
pub const REPLY_OK: &str = "ok";

/// Arguments placed before the caller's record options. `simpleperf` reads control
/// commands from stdin and writes replies to stdout in this mode.
pub fn record_prefix(tracepoint_events_path: &str) -> Vec<String> {
    [
        "record",
        "--log-to-android-buffer",
        "--log",
        "debug",
        "--stdio-controls-profiling",
        "--in-app",
        "--tracepoint-events",
        tracepoint_events_path,
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Blocks until the recorder reports that recording has started.
pub fn await_started(process: &mut dyn ProfilerProcess, trace_id: &str) -> Result<(), AppError> {
    match process.read_line() {
        Ok(Some(line)) if line == REPLY_STARTED => Ok(()),
        Ok(Some(line)) => Err(AppError::startup(
            format!("failed to receive simpleperf start flag, got {line:?}"),
            trace_id,
        )),
        Ok(None) => Err(AppError::startup(
            "failed to receive simpleperf start flag: simpleperf closed its output",
            trace_id,
        )),
        Err(err) => Err(AppError::startup(
            format!("failed to receive simpleperf start flag: {err}"),
            trace_id,
        )),
    }
}

/// Sends one control command and requires `ok` back.
pub fn send_command(
    process: &mut dyn ProfilerProcess,
    cmd: &str,
    trace_id: &str,
) -> Result<(), AppError> {
    process.write_line(cmd).map_err(|err| {
        AppError::command_failed(format!("failed to send cmd to simpleperf: {err}"), trace_id)
    })?;
    match process.read_line() {
        Ok(Some(reply)) if reply == REPLY_OK => Ok(()),
        Ok(Some(reply)) => Err(AppError::command_failed(
            format!("failed to run cmd in simpleperf: {cmd} (reply {reply:?})"),
            trace_id,
        )),
        Ok(None) => Err(AppError::command_failed(
            format!("failed to run cmd in simpleperf: {cmd} (no reply)"),
            trace_id,
        )),
        Err(err) => Err(AppError::command_failed(
            format!("failed to read reply to {cmd}: {err}"),
            trace_id,
        )),
    }
}
