use std::io;

use crate::app::process::child::{ProfilerProcess, Signal};

/// How `stop()` asks the recorder to finish. The recorder flushes its data file and
/// exits 0 when stopped cleanly.
pub trait TerminationStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn terminate(&self, process: &mut dyn ProfilerProcess) -> io::Result<()>;
}

/// Default: close the control pipe, then signal.
#[derive(Debug, Clone, Copy)]
pub struct CloseStdinAndSignal(pub Signal);

impl TerminationStrategy for CloseStdinAndSignal {
    fn name(&self) -> &'static str {
        "close-stdin-and-signal"
    }

    fn terminate(&self, process: &mut dyn ProfilerProcess) -> io::Result<()> {
        process.close_stdin();
        process.signal(self.0)
    }
}

/// Signal only, leaving stdin open. The simpleperf shipped in the Android Q system image
/// can abort when its stdin is closed before it exits.
#[derive(Debug, Clone, Copy)]
pub struct SignalOnly(pub Signal);

impl TerminationStrategy for SignalOnly {
    fn name(&self) -> &'static str {
        "signal-only"
    }

    fn terminate(&self, process: &mut dyn ProfilerProcess) -> io::Result<()> {
        process.signal(self.0)
    }
}
