//! In-memory stand-ins for the recorder process and host commands.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::app::error::AppError;
use crate::app::process::child::{ProcessLauncher, ProfilerProcess, Signal};
use crate::app::process::lines::read_line_unbuffered;
use crate::app::process::runner::CommandOutput;

#[derive(Debug, Default)]
pub struct FakeProcessState {
    /// Bytes the child has "written" to its stdout and we have not read yet.
    pub stdout: VecDeque<u8>,
    /// Replies queued per received command, appended to stdout when the command arrives.
    pub replies: VecDeque<String>,
    pub received: Vec<String>,
    pub signals: Vec<Signal>,
    pub stdin_closed: bool,
    pub exit_code: Option<i32>,
    pub wait_error: Option<io::ErrorKind>,
    pub waited: bool,
}

#[derive(Clone, Default)]
pub struct FakeProcess {
    pub state: Arc<Mutex<FakeProcessState>>,
}

impl FakeProcess {
    /// A well-behaved recorder: says `started`, answers every command with `ok`, exits 0.
    pub fn recorder() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().expect("fake state");
            state.stdout.extend(b"started\n");
            state.exit_code = Some(0);
        }
        fake
    }

    pub fn with_stdout(bytes: &[u8]) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().expect("fake state");
            state.stdout.extend(bytes);
            state.exit_code = Some(0);
        }
        fake
    }

    /// `reply` is raw stdout bytes, so include the trailing `\n` for a complete line.
    pub fn queue_reply(&self, reply: &str) -> &Self {
        self.state
            .lock()
            .expect("fake state")
            .replies
            .push_back(reply.to_string());
        self
    }

    pub fn set_exit_code(&self, code: Option<i32>) {
        self.state.lock().expect("fake state").exit_code = code;
    }

    pub fn fail_wait_with(&self, kind: io::ErrorKind) {
        self.state.lock().expect("fake state").wait_error = Some(kind);
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().expect("fake state").received.clone()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.state.lock().expect("fake state").signals.clone()
    }

    pub fn stdin_closed(&self) -> bool {
        self.state.lock().expect("fake state").stdin_closed
    }

    pub fn waited(&self) -> bool {
        self.state.lock().expect("fake state").waited
    }
}

impl ProfilerProcess for FakeProcess {
    fn pid(&self) -> u32 {
        4242
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut state = self.state.lock().expect("fake state");
        if state.stdin_closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
        }
        state.received.push(line.to_string());
        let reply = state.replies.pop_front().unwrap_or_else(|| "ok\n".to_string());
        state.stdout.extend(reply.as_bytes());
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut state = self.state.lock().expect("fake state");
        read_line_unbuffered(&mut state.stdout)
    }

    fn close_stdin(&mut self) {
        self.state.lock().expect("fake state").stdin_closed = true;
    }

    fn signal(&mut self, signal: Signal) -> io::Result<()> {
        self.state.lock().expect("fake state").signals.push(signal);
        Ok(())
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        let mut state = self.state.lock().expect("fake state");
        state.waited = true;
        if let Some(kind) = state.wait_error {
            return Err(io::Error::new(kind, "wait failed"));
        }
        Ok(state.exit_code)
    }
}

#[derive(Debug, Clone)]
pub struct Spawned {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Hands out a prepared `FakeProcess` and answers `run` from a table keyed by program.
#[derive(Default)]
pub struct FakeLauncher {
    pub process: Mutex<Option<FakeProcess>>,
    pub spawn_error: Mutex<Option<io::ErrorKind>>,
    pub spawned: Mutex<Vec<Spawned>>,
    pub outputs: Mutex<HashMap<String, CommandOutput>>,
    pub runs: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeLauncher {
    pub fn with_process(process: FakeProcess) -> Self {
        let launcher = Self::default();
        *launcher.process.lock().expect("process") = Some(process);
        launcher
    }

    pub fn set_output(&self, program: &str, stdout: &str, exit_code: Option<i32>) {
        self.outputs.lock().expect("outputs").insert(
            program.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code,
            },
        );
    }

    pub fn spawned(&self) -> Vec<Spawned> {
        self.spawned.lock().expect("spawned").clone()
    }

    pub fn runs(&self) -> Vec<(String, Vec<String>)> {
        self.runs.lock().expect("runs").clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
    ) -> io::Result<Box<dyn ProfilerProcess>> {
        if let Some(kind) = *self.spawn_error.lock().expect("spawn_error") {
            return Err(io::Error::new(kind, "spawn failed"));
        }
        self.spawned.lock().expect("spawned").push(Spawned {
            program: program.to_path_buf(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        });
        let process = self
            .process
            .lock()
            .expect("process")
            .take()
            .unwrap_or_else(FakeProcess::recorder);
        Ok(Box::new(process))
    }

    fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        self.runs
            .lock()
            .expect("runs")
            .push((program.to_string(), args.to_vec()));
        self.outputs
            .lock()
            .expect("outputs")
            .get(program)
            .cloned()
            .ok_or_else(|| AppError::launch(format!("Failed to spawn {program}"), trace_id))
    }
}
