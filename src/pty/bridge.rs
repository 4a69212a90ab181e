//! Pseudo-terminal bridge.
//!
//! Allocates a PTY pair, spawns the child on the slave side, and relays the
//! master side from the parent: output is captured, terminal capability
//! queries are answered synthetically, and a wall-clock deadline is enforced
//! by polling child state in short slices.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::error::InvokeError;
use crate::invoke::runner::command_line;
use crate::pty::query::{incomplete_suffix, intercept_queries};

/// How often the relay loop wakes to check child state and the deadline.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Ceiling on captured output. When exceeded, the oldest bytes are dropped so
/// a chatty full-screen child cannot grow the buffer without bound.
const MAX_OUTPUT_BYTES: usize = 2 * 1024 * 1024;

/// Whether a PTY can be allocated on this platform at all.
pub fn pty_supported() -> bool {
    cfg!(unix)
}

/// How the relayed child finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// Child exited on its own with this code.
    Exited(u32),
    /// Deadline expired; the child was killed and reaped.
    TimedOut,
}

/// Everything the relay observed: the captured bytes (queries stripped) and
/// how the child went away.
#[derive(Debug)]
pub struct RelayOutcome {
    pub output: Vec<u8>,
    pub exit: RelayExit,
}

/// A child process running on the slave side of a PTY pair.
///
/// The slave handle is dropped right after spawn so the parent holds exactly
/// one end; once the child exits, reads on the master return EOF or EIO and
/// the reader thread winds down on its own. All master writes (payload and
/// query replies) go through a dedicated writer thread, so a child that is
/// not reading cannot stall the deadline loop.
pub struct PtySession {
    child: Box<dyn Child + Send + Sync>,
    writes: Option<Sender<Vec<u8>>>,
    chunks: Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    _master: Box<dyn MasterPty + Send>,
    command: String,
    deadline: Option<Instant>,
    output: Vec<u8>,
    /// Trailing bytes that may be the start of a terminal query split across
    /// reads; held back until the rest arrives or the session ends.
    pending: Vec<u8>,
    truncated: bool,
}

impl PtySession {
    /// Allocate a PTY, spawn `argv` on its slave side, and queue `input` (if
    /// any) for the writer thread, newline-terminated.
    pub fn spawn(
        argv: &[String],
        input: Option<&[u8]>,
        timeout: Option<Duration>,
        cwd: Option<&PathBuf>,
        env: &[(String, String)],
    ) -> Result<Self, InvokeError> {
        if !pty_supported() {
            return Err(InvokeError::PtyUnsupported);
        }
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| InvokeError::CommandNotFound {
                command: String::new(),
            })?;
        let command = command_line(argv);

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| InvokeError::PtySpawnFailure {
                message: err.to_string(),
            })?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(rest);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child =
            pair.slave
                .spawn_command(cmd)
                .map_err(|err| InvokeError::PtySpawnFailure {
                    message: err.to_string(),
                })?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| InvokeError::PtySpawnFailure {
                message: err.to_string(),
            })?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| InvokeError::PtySpawnFailure {
                message: err.to_string(),
            })?;

        let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>();
        let writer = thread::spawn(move || {
            let mut writer = writer;
            while let Ok(bytes) = write_rx.recv() {
                if writer.write_all(&bytes).and_then(|()| writer.flush()).is_err() {
                    break;
                }
            }
        });

        if let Some(bytes) = input {
            let mut bytes = bytes.to_vec();
            if !bytes.ends_with(b"\n") {
                bytes.push(b'\n');
            }
            let _ = write_tx.send(bytes);
        }

        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let mut reader = reader;
            let mut buffer = [0u8; 4096];
            loop {
                let count = match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(count) => count,
                    // EIO on a master whose child is gone is the normal
                    // end-of-stream signal, not a failure.
                    Err(_) => break,
                };
                if tx.send(buffer[..count].to_vec()).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            writes: Some(write_tx),
            chunks: rx,
            reader: Some(reader),
            writer: Some(writer),
            _master: pair.master,
            command,
            deadline: timeout.map(|budget| Instant::now() + budget),
            output: Vec::new(),
            pending: Vec::new(),
            truncated: false,
        })
    }

    /// Drive the session to completion: absorb output, answer queries, and
    /// watch the child until it exits or the deadline expires.
    pub fn relay(&mut self) -> Result<RelayOutcome, InvokeError> {
        let mut eof = false;
        loop {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    tracing::debug!(command = %self.command, "PTY deadline expired, child killed");
                    self.flush_pending();
                    return Ok(RelayOutcome {
                        output: std::mem::take(&mut self.output),
                        exit: RelayExit::TimedOut,
                    });
                }
            }

            let slice = self.slice();
            if eof {
                thread::sleep(slice);
            } else {
                match self.chunks.recv_timeout(slice) {
                    Ok(chunk) => self.absorb(chunk),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => eof = true,
                }
            }

            let status = self.child.try_wait().map_err(|err| InvokeError::Io {
                command: self.command.clone(),
                source: err,
            })?;
            if let Some(status) = status {
                self.drain_remaining();
                self.flush_pending();
                return Ok(RelayOutcome {
                    output: std::mem::take(&mut self.output),
                    exit: RelayExit::Exited(status.exit_code()),
                });
            }
        }
    }

    /// Poll interval, clipped so an imminent deadline is not overslept.
    fn slice(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_SLICE)
                .max(Duration::from_millis(1)),
            None => POLL_SLICE,
        }
    }

    fn absorb(&mut self, chunk: Vec<u8>) {
        // Prepend any held-back tail so a query split across reads is
        // rescanned once its remainder arrives.
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(&chunk);

        for reply in intercept_queries(&mut buffer) {
            let delivered = self
                .writes
                .as_ref()
                .is_some_and(|tx| tx.send(reply).is_ok());
            if !delivered {
                tracing::debug!(command = %self.command, "could not answer terminal query");
            }
        }

        let keep = buffer.len() - incomplete_suffix(&buffer);
        self.pending = buffer.split_off(keep);
        if !buffer.is_empty() {
            self.append_output(buffer);
        }
    }

    fn append_output(&mut self, bytes: Vec<u8>) {
        self.output.extend_from_slice(&bytes);
        if self.output.len() > MAX_OUTPUT_BYTES {
            let excess = self.output.len() - MAX_OUTPUT_BYTES;
            self.output.drain(..excess);
            if !self.truncated {
                self.truncated = true;
                tracing::warn!(
                    command = %self.command,
                    limit = MAX_OUTPUT_BYTES,
                    "PTY output exceeded capture limit, dropping oldest bytes"
                );
            }
        }
    }

    /// Output written just before exit can still be in flight through the
    /// kernel buffer and the reader thread; pull until the stream goes quiet.
    fn drain_remaining(&mut self) {
        while let Ok(chunk) = self.chunks.recv_timeout(POLL_SLICE) {
            self.absorb(chunk);
        }
    }

    /// A held-back tail that never completed is real child output; surface
    /// it as-is once no more data can arrive.
    fn flush_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.append_output(pending);
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        // Closing the write channel lets the writer thread finish its queue
        // and exit; with the child gone its writes fail rather than block.
        self.writes.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        // master drops here, closing the parent's PTY ends once.
    }
}
