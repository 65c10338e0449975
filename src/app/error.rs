use serde::Serialize;
use std::fmt;

pub const ERR_INVALID_STATE: &str = "ERR_INVALID_STATE";
pub const ERR_CONFIG_CONFLICT: &str = "ERR_CONFIG_CONFLICT";
pub const ERR_PROFILER_NOT_FOUND: &str = "ERR_PROFILER_NOT_FOUND";
pub const ERR_PERMISSION_DENIED: &str = "ERR_PERMISSION_DENIED";
pub const ERR_STARTUP: &str = "ERR_STARTUP";
pub const ERR_COMMAND_FAILED: &str = "ERR_COMMAND_FAILED";
pub const ERR_ABNORMAL_EXIT: &str = "ERR_ABNORMAL_EXIT";
pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_LAUNCH: &str = "ERR_LAUNCH";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    /// Operation attempted from the wrong lifecycle state.
    pub fn invalid_state(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_INVALID_STATE, message, trace_id)
    }

    /// Incompatible option combination, e.g. pausing while tracing off-cpu time.
    pub fn config_conflict(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_CONFIG_CONFLICT, message, trace_id)
    }

    pub fn profiler_not_found(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PROFILER_NOT_FOUND, message, trace_id)
    }

    pub fn permission_denied(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PERMISSION_DENIED, message, trace_id)
    }

    pub fn startup(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_STARTUP, message, trace_id)
    }

    pub fn command_failed(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_COMMAND_FAILED, message, trace_id)
    }

    pub fn abnormal_exit(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_ABNORMAL_EXIT, message, trace_id)
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    /// A program could not be spawned at all.
    pub fn launch(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_LAUNCH, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
