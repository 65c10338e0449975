//! Start, pause, resume and stop `simpleperf record` from inside an app.

pub mod app;

pub use app::config::SessionConfig;
pub use app::error::AppError;
pub use app::logging::init_logging;
pub use app::models::{CallGraphMode, SessionState, SessionSummary};
pub use app::simpleperf::options::RecordOptions;
pub use app::simpleperf::session::ProfileSession;
