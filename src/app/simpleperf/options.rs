use chrono::Local;

use crate::app::models::CallGraphMode;

pub const TRACE_OFFCPU_ARG: &str = "--trace-offcpu";

/// Options for `simpleperf record`. Run `simpleperf record -h` on the device for the
/// full meaning of each flag.
///
/// ```ignore
/// let options = RecordOptions::new()
///     .duration(3.0)
///     .dwarf_call_graph()
///     .output_filename("perf.data");
/// session.start(&options)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOptions {
    output_filename: Option<String>,
    event: String,
    frequency: u32,
    duration_secs: f64,
    threads: Vec<u32>,
    call_graph: CallGraphMode,
    trace_offcpu: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            output_filename: None,
            event: "cpu-cycles".to_string(),
            frequency: 4000,
            duration_secs: 0.0,
            threads: Vec::new(),
            call_graph: CallGraphMode::None,
            trace_offcpu: false,
        }
    }
}

impl RecordOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative to the session data directory. Defaults to `perf-MM-DD-HH-mm-ss.data`.
    pub fn output_filename(mut self, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        self.output_filename = if filename.trim().is_empty() {
            None
        } else {
            Some(filename)
        };
        self
    }

    /// See `simpleperf list` for available events.
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    /// Samples per second of running time.
    pub fn sample_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Stop on our own after `seconds`. Zero means record until `stop()`.
    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration_secs = seconds;
        self
    }

    /// Restrict sampling to these threads instead of the whole process.
    pub fn sample_threads(mut self, threads: impl IntoIterator<Item = u32>) -> Self {
        self.threads.extend(threads);
        self
    }

    /// Needed for Java call stacks.
    pub fn dwarf_call_graph(mut self) -> Self {
        self.call_graph = CallGraphMode::Dwarf;
        self
    }

    /// Good for C++ stacks on 64-bit devices.
    pub fn frame_pointer_call_graph(mut self) -> Self {
        self.call_graph = CallGraphMode::FramePointer;
        self
    }

    pub fn call_graph(mut self, mode: CallGraphMode) -> Self {
        self.call_graph = mode;
        self
    }

    /// Also record context switches to show where threads spend time off cpu.
    pub fn trace_offcpu(mut self) -> Self {
        self.trace_offcpu = true;
        self
    }

    pub fn call_graph_mode(&self) -> CallGraphMode {
        self.call_graph
    }

    pub fn is_tracing_offcpu(&self) -> bool {
        self.trace_offcpu
    }

    pub fn to_record_args(&self) -> Vec<String> {
        let filename = self
            .output_filename
            .clone()
            .unwrap_or_else(default_output_filename);

        let mut args = vec![
            "-o".to_string(),
            filename,
            "-e".to_string(),
            self.event.clone(),
            "-f".to_string(),
            self.frequency.to_string(),
        ];
        if self.duration_secs != 0.0 {
            args.push("--duration".to_string());
            args.push(self.duration_secs.to_string());
        }
        if self.threads.is_empty() {
            args.push("-p".to_string());
            args.push(std::process::id().to_string());
        } else {
            let joined = self
                .threads
                .iter()
                .map(|tid| tid.to_string())
                .collect::<Vec<_>>()
                .join(",");
            args.push("-t".to_string());
            args.push(joined);
        }
        match self.call_graph {
            CallGraphMode::Dwarf => args.push("-g".to_string()),
            CallGraphMode::FramePointer => {
                args.push("--call-graph".to_string());
                args.push("fp".to_string());
            }
            CallGraphMode::None => {}
        }
        if self.trace_offcpu {
            args.push(TRACE_OFFCPU_ARG.to_string());
        }
        args
    }
}

pub fn default_output_filename() -> String {
    Local::now().format("perf-%m-%d-%H-%M-%S.data").to_string()
}
