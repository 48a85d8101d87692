//! Running commands through a shell.
//!
//! [`CommandRunner`] is the seam the gate executes through; [`ShellRunner`]
//! is the real implementation. Output is captured per stream up to a byte cap,
//! and a command that outlives the configured timeout is killed along with
//! everything it started. The deadline also bounds reading its output, so a
//! backgrounded child holding the pipes open cannot stretch the run.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ExecutionConfig;

/// Appended to a stream that hit the output cap.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to start {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: io::Error,
    },
    #[error("command timed out after {}s and was killed", .0.as_secs())]
    Timeout(Duration),
    #[error("i/o error while running command: {0}")]
    Io(#[from] io::Error),
    #[error("working directory {0} does not exist")]
    MissingCwd(String),
}

/// Runs a command string and captures its output.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, cwd: Option<&Path>) -> Result<RawOutput, ExecError>;
}

/// Runs commands with `<shell> -c` (`cmd /C` on Windows).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    timeout: Option<Duration>,
    max_output_bytes: usize,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, timeout: Option<Duration>, max_output_bytes: usize) -> Self {
        Self {
            shell: shell.into(),
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        Self::new(config.shell.clone(), timeout, config.max_output_bytes)
    }

    fn command(&self, command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new(&self.shell);
            cmd.args(["-c", command]);
            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                // Own group, so a timeout can take down background jobs too
                cmd.process_group(0);
            }
            cmd
        }
    }

    fn wait(&self, child: &mut Child, deadline: Option<Instant>) -> Result<ExitStatus, ExecError> {
        let Some(deadline) = deadline else {
            return Ok(child.wait()?);
        };
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                kill_tree(child);
                return Err(self.timed_out());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn timed_out(&self) -> ExecError {
        ExecError::Timeout(self.timeout.unwrap_or_default())
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, cwd: Option<&Path>) -> Result<RawOutput, ExecError> {
        let mut cmd = self.command(command);
        if let Some(dir) = cwd {
            if !dir.is_dir() {
                return Err(ExecError::MissingCwd(dir.display().to_string()));
            }
            cmd.current_dir(dir);
        }
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                shell: self.shell.clone(),
                source,
            })?;

        let deadline = self.timeout.map(|limit| Instant::now() + limit);
        let stdout = capture(child.stdout.take(), self.max_output_bytes);
        let stderr = capture(child.stderr.take(), self.max_output_bytes);
        let status = self.wait(&mut child, deadline)?;

        let (Some(stdout), Some(stderr)) = (collect(&stdout, deadline), collect(&stderr, deadline))
        else {
            // The shell exited but something it started still holds the pipes.
            kill_tree(&mut child);
            return Err(self.timed_out());
        };
        Ok(RawOutput {
            stdout: stdout?,
            stderr: stderr?,
            exit_code: exit_code(status),
        })
    }
}

/// Kill the shell's whole process group, then the shell itself.
fn kill_tree(child: &mut Child) {
    kill_group(child);
    // Already exited or already reaped: either way it is gone.
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Ok(pgid) = i32::try_from(child.id())
        && let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL)
    {
        log::debug!("killpg {pgid}: {e}");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn capture<R: Read + Send + 'static>(stream: Option<R>, cap: usize) -> Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    match stream {
        Some(stream) => {
            thread::spawn(move || {
                let _ = tx.send(read_capped(stream, cap));
            });
        }
        None => {
            let _ = tx.send(Ok(String::new()));
        }
    }
    rx
}

/// Wait for a reader until `deadline`. `None` means it is still reading.
fn collect(reader: &Receiver<io::Result<String>>, deadline: Option<Instant>) -> Option<io::Result<String>> {
    let received = match deadline {
        Some(deadline) => reader.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        None => reader.recv().map_err(RecvTimeoutError::from),
    };
    match received {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Err(io::Error::other("output reader panicked"))),
    }
}

/// Keep the first `cap` bytes of `stream`, then drain the rest so the
/// child never blocks on a full pipe.
fn read_capped(mut stream: impl Read, cap: usize) -> io::Result<String> {
    let mut kept = Vec::new();
    (&mut stream).take(cap as u64).read_to_end(&mut kept)?;
    let dropped = io::copy(&mut stream, &mut io::sink())?;
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if dropped > 0 {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
