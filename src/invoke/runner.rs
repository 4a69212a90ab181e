//! Direct-channel process runner.
//!
//! Spawns the child over plain pipes, writes the payload once, and polls the
//! child state in short slices so a per-attempt deadline can be enforced
//! without blocking indefinitely. Success is all-or-nothing on exit code zero.

use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::InvokeError;

/// How often the wait loop re-checks child state and the deadline.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Joined argv used in diagnostics.
pub fn command_line(argv: &[String]) -> String {
    argv.join(" ")
}

/// Run the command, feed it `input` (if any), and capture its stdout bytes.
///
/// Fails with `Timeout` when the deadline expires (the child is killed and
/// reaped first) and with `NonZeroExit` when the child reports failure, with
/// the collected stderr text attached for diagnosis.
pub fn run_capture(
    argv: &[String],
    input: Option<&[u8]>,
    timeout: Option<Duration>,
    cwd: Option<&PathBuf>,
    env: &[(String, String)],
) -> Result<Vec<u8>, InvokeError> {
    let command = command_line(argv);
    let stdin = if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = spawn(argv, stdin, Stdio::piped(), cwd, env)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let writer = feed_input(&mut child, input);

    let status = wait_with_deadline(&mut child, timeout, &command)?;
    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let stdout = join_drain(stdout);
    let stderr = join_drain(stderr);

    if status.success() {
        Ok(stdout)
    } else {
        Err(nonzero(&command, status, &stderr))
    }
}

/// Run the command with stdout/stderr inherited from the parent, so an
/// interactive child can render straight to the caller's terminal.
///
/// Only the exit status is observed; the child owns the screen.
pub fn run_streaming(
    argv: &[String],
    input: Option<&[u8]>,
    timeout: Option<Duration>,
    cwd: Option<&PathBuf>,
    env: &[(String, String)],
) -> Result<(), InvokeError> {
    let command = command_line(argv);
    // With no payload the child keeps the caller's stdin, so an interactive
    // child can read the keyboard directly.
    let stdin = if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::inherit()
    };
    let mut child = spawn(argv, stdin, Stdio::inherit(), cwd, env)?;

    let stderr = drain(child.stderr.take());
    let writer = feed_input(&mut child, input);
    let status = wait_with_deadline(&mut child, timeout, &command)?;
    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let stderr = join_drain(stderr);

    if status.success() {
        Ok(())
    } else {
        Err(nonzero(&command, status, &stderr))
    }
}

fn spawn(
    argv: &[String],
    stdin: Stdio,
    stdout: Stdio,
    cwd: Option<&PathBuf>,
    env: &[(String, String)],
) -> Result<Child, InvokeError> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| InvokeError::CommandNotFound {
            command: String::new(),
        })?;

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }

    cmd.spawn().map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            InvokeError::CommandNotFound {
                command: program.clone(),
            }
        } else {
            InvokeError::Io {
                command: command_line(argv),
                source: err,
            }
        }
    })
}

/// Write the payload on its own thread. A payload larger than the pipe
/// buffer fed to a child that is not reading yet would otherwise block the
/// caller before the deadline loop ever starts. A failed write is not an
/// error in itself; the child's exit status tells the real story.
fn feed_input(child: &mut Child, input: Option<&[u8]>) -> Option<JoinHandle<()>> {
    let bytes = input?.to_vec();
    let mut stdin = child.stdin.take()?;
    Some(thread::spawn(move || {
        let _ = stdin.write_all(&bytes);
        // stdin drops here, closing the pipe so the child sees EOF.
    }))
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    let mut reader = reader?;
    Some(thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    }))
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
    command: &str,
) -> Result<ExitStatus, InvokeError> {
    let deadline = timeout.map(|budget| Instant::now() + budget);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(err) => {
                return Err(InvokeError::Io {
                    command: command.to_string(),
                    source: err,
                })
            }
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InvokeError::Timeout {
                    command: command.to_string(),
                    timeout: timeout.unwrap_or_default(),
                });
            }
        }
        thread::sleep(POLL_SLICE);
    }
}

fn nonzero(command: &str, status: ExitStatus, stderr: impl AsRef<[u8]>) -> InvokeError {
    InvokeError::NonZeroExit {
        command: command.to_string(),
        code: status.code().unwrap_or(-1),
        detail: String::from_utf8_lossy(stderr.as_ref()).trim().to_string(),
    }
}
