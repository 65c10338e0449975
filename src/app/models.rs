use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    NotStarted,
    Started,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::NotStarted => "NOT_STARTED",
            SessionState::Started => "STARTED",
            SessionState::Paused => "PAUSED",
            SessionState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallGraphMode {
    #[default]
    None,
    Dwarf,
    FramePointer,
}

/// Snapshot of a session, suitable for printing or logging as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub trace_id: String,
    pub state: SessionState,
    pub data_dir: String,
    pub executable_path: Option<String>,
    pub trace_offcpu: bool,
}
