use std::io;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use crate::app::error::AppError;
use crate::app::process::lines::{read_line_unbuffered, write_line};
use crate::app::process::runner::{run_command_with_timeout, CommandOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

impl Signal {
    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// A running recorder with its control (stdin) and reply (stdout) pipes.
pub trait ProfilerProcess: Send {
    fn pid(&self) -> u32;
    fn write_line(&mut self, line: &str) -> io::Result<()>;
    /// `Ok(None)` when the reply stream ends before a line terminator.
    fn read_line(&mut self) -> io::Result<Option<String>>;
    /// Drops the control pipe. Further writes fail.
    fn close_stdin(&mut self);
    fn signal(&mut self, signal: Signal) -> io::Result<()>;
    /// Blocks until exit. `Ok(None)` when the process was killed by a signal.
    fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// Spawns recorders and runs short helper commands on the host.
pub trait ProcessLauncher: Send + Sync {
    fn spawn(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
    ) -> io::Result<Box<dyn ProfilerProcess>>;

    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError>;
}

pub struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

impl ChildProcess {
    pub fn spawn(program: &Path, args: &[String], cwd: &Path) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
        })
    }
}

impl ProfilerProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed"))?;
        write_line(stdin, line)
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        read_line_unbuffered(&mut self.stdout)
    }

    fn close_stdin(&mut self) {
        self.stdin.take();
    }

    #[cfg(unix)]
    fn signal(&mut self, signal: Signal) -> io::Result<()> {
        // Already reaped; the pid may belong to someone else now.
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        let pid = self.child.id() as libc::pid_t;
        let result = unsafe { libc::kill(pid, signal.raw()) };
        if result == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn signal(&mut self, _signal: Signal) -> io::Result<()> {
        self.child.kill()
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait()?;
        Ok(status.code())
    }
}

pub struct HostLauncher;

impl ProcessLauncher for HostLauncher {
    fn spawn(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
    ) -> io::Result<Box<dyn ProfilerProcess>> {
        Ok(Box::new(ChildProcess::spawn(program, args, cwd)?))
    }

    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        run_command_with_timeout(program, args, timeout, trace_id)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spawn_script(script: &str, cwd: &Path) -> ChildProcess {
        ChildProcess::spawn(
            Path::new("sh"),
            &["-c".to_string(), script.to_string()],
            cwd,
        )
        .expect("spawn sh")
    }

    #[test]
    fn exchanges_lines_with_real_child() {
        let dir = TempDir::new().expect("tmp");
        let mut child = spawn_script(
            "echo started; while read cmd; do echo ok; done; exit 0",
            dir.path(),
        );

        assert_eq!(child.read_line().expect("read"), Some("started".to_string()));
        child.write_line("pause").expect("write");
        assert_eq!(child.read_line().expect("read"), Some("ok".to_string()));
        child.write_line("resume").expect("write");
        assert_eq!(child.read_line().expect("read"), Some("ok".to_string()));

        child.close_stdin();
        assert_eq!(child.wait().expect("wait"), Some(0));
    }

    #[test]
    fn runs_in_requested_directory() {
        let dir = TempDir::new().expect("tmp");
        let mut child = spawn_script("touch marker; echo started", dir.path());
        assert_eq!(child.read_line().expect("read"), Some("started".to_string()));
        assert_eq!(child.wait().expect("wait"), Some(0));
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn signal_stops_child_without_closing_stdin() {
        let dir = TempDir::new().expect("tmp");
        let mut child = spawn_script(
            "trap 'exit 0' TERM; echo started; while true; do sleep 0.05; done",
            dir.path(),
        );
        assert_eq!(child.read_line().expect("read"), Some("started".to_string()));
        child.signal(Signal::Terminate).expect("signal");
        assert_eq!(child.wait().expect("wait"), Some(0));
    }

    #[test]
    fn write_after_close_is_broken_pipe() {
        let dir = TempDir::new().expect("tmp");
        let mut child = spawn_script("cat > /dev/null", dir.path());
        child.close_stdin();
        let err = child.write_line("pause").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(child.wait().expect("wait"), Some(0));
    }
}
