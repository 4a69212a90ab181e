//! Invocation planner.
//!
//! Escalates through a fixed sequence of delivery strategies until one
//! produces a zero exit: payload as an argument over plain pipes, then under
//! a PTY when the failure looks terminal-related, then the same pair with the
//! payload over stdin. The PTY trade only ever moves forward; once a mode has
//! been tried under a PTY the planner never returns to pipes for it.

pub mod classify;
pub mod request;
pub mod runner;

use std::env;
use std::io;
use std::path::Path;

use crossterm::tty::IsTty;

use crate::error::InvokeError;
use crate::pty::bridge::{self, PtySession, RelayExit};

pub use request::{Attempt, Channel, InvocationRequest, InvokeOutput, PayloadMode};

/// Payload modes in escalation order.
const MODE_ORDER: [PayloadMode; 2] = [PayloadMode::Arg, PayloadMode::Stdin];

/// Executes one concrete attempt. Seam between the planner's state machine
/// and real process plumbing, so the escalation logic is testable without
/// spawning anything.
pub(crate) trait AttemptExecutor {
    fn pty_supported(&self) -> bool;
    fn run(
        &mut self,
        request: &InvocationRequest,
        attempt: Attempt,
    ) -> Result<Vec<u8>, InvokeError>;
}

/// Production executor backed by the pipe runner and the PTY bridge.
struct SystemExecutor;

impl AttemptExecutor for SystemExecutor {
    fn pty_supported(&self) -> bool {
        bridge::pty_supported()
    }

    fn run(
        &mut self,
        request: &InvocationRequest,
        attempt: Attempt,
    ) -> Result<Vec<u8>, InvokeError> {
        let argv = request.argv(attempt.mode);
        let input = request.stdin_bytes(attempt.mode);
        match attempt.channel {
            Channel::Direct => runner::run_capture(
                &argv,
                input.as_deref(),
                request.timeout_budget(),
                request.working_dir(),
                &request.env_block(),
            ),
            Channel::Pty => {
                let mut session = PtySession::spawn(
                    &argv,
                    input.as_deref(),
                    request.timeout_budget(),
                    request.working_dir(),
                    &request.env_block(),
                )?;
                let outcome = session.relay()?;
                let command = runner::command_line(&argv);
                match outcome.exit {
                    RelayExit::Exited(0) => Ok(outcome.output),
                    RelayExit::Exited(code) => Err(InvokeError::NonZeroExit {
                        command,
                        code: code as i32,
                        detail: String::from_utf8_lossy(&outcome.output)
                            .trim()
                            .to_string(),
                    }),
                    RelayExit::TimedOut => Err(InvokeError::Timeout {
                        command,
                        timeout: request.timeout_budget().unwrap_or_default(),
                    }),
                }
            }
        }
    }
}

/// Run the request to completion.
///
/// When the parent's stdout is itself a terminal the child is first handed
/// the screen directly and nothing is captured. Otherwise (or when streaming
/// fails) the escalation plan runs and the winning attempt's output comes
/// back as `Captured` bytes.
pub fn invoke(request: &InvocationRequest) -> Result<InvokeOutput, InvokeError> {
    resolve_command(request.command())?;

    let mut failures = Vec::new();
    if io::stdout().is_tty() && streaming_pass(request, &mut failures) {
        return Ok(InvokeOutput::Streamed);
    }

    let mut executor = SystemExecutor;
    run_plan(&mut executor, request, failures).map(InvokeOutput::Captured)
}

/// Hand the child the parent's terminal directly, trying each payload mode.
/// Returns true on success; failures are appended to the shared attempt log.
fn streaming_pass(request: &InvocationRequest, failures: &mut Vec<String>) -> bool {
    for mode in MODE_ORDER {
        let argv = request.argv(mode);
        let input = request.stdin_bytes(mode);
        match runner::run_streaming(
            &argv,
            input.as_deref(),
            request.timeout_budget(),
            request.working_dir(),
            &request.env_block(),
        ) {
            Ok(()) => {
                tracing::debug!(mode = %mode_name(mode), "streamed to the caller's terminal");
                return true;
            }
            Err(err) => {
                tracing::debug!(mode = %mode_name(mode), kind = err.kind(), "streaming attempt failed");
                failures.push(format!("{}-streamed: {err}", mode_name(mode)));
            }
        }
    }
    false
}

fn mode_name(mode: PayloadMode) -> &'static str {
    match mode {
        PayloadMode::Arg => "arg",
        PayloadMode::Stdin => "stdin",
    }
}

/// The escalation state machine. `failures` carries diagnostics from any
/// earlier streaming pass so the final aggregate reads in attempt order.
pub(crate) fn run_plan(
    executor: &mut impl AttemptExecutor,
    request: &InvocationRequest,
    mut failures: Vec<String>,
) -> Result<Vec<u8>, InvokeError> {
    for mode in MODE_ORDER {
        let direct = Attempt {
            mode,
            channel: Channel::Direct,
        };
        match executor.run(request, direct) {
            Ok(output) => return Ok(output),
            Err(err) => {
                let diagnostic = err.to_string();
                tracing::debug!(attempt = %direct, kind = err.kind(), "attempt failed");
                let retry_under_pty =
                    classify::is_tty_failure(&diagnostic) && executor.pty_supported();
                failures.push(format!("{direct}: {diagnostic}"));
                if !retry_under_pty {
                    continue;
                }
                let pty = Attempt {
                    mode,
                    channel: Channel::Pty,
                };
                match executor.run(request, pty) {
                    Ok(output) => return Ok(output),
                    Err(err) => {
                        tracing::debug!(attempt = %pty, kind = err.kind(), "PTY fallback failed");
                        failures.push(format!("{pty}: {err}"));
                    }
                }
            }
        }
    }
    Err(InvokeError::Exhausted {
        log: failures.join("\n---\n"),
    })
}

/// Resolve the target up front so a missing executable fails fast, before
/// any attempt is spawned.
fn resolve_command(command: &str) -> Result<(), InvokeError> {
    let not_found = || InvokeError::CommandNotFound {
        command: command.to_string(),
    };
    if command.is_empty() {
        return Err(not_found());
    }

    let path = Path::new(command);
    if path.components().count() > 1 {
        return if is_executable(path) {
            Ok(())
        } else {
            Err(not_found())
        };
    }

    let paths = env::var_os("PATH").ok_or_else(not_found)?;
    for dir in env::split_paths(&paths) {
        if is_executable(&dir.join(command)) {
            return Ok(());
        }
    }
    Err(not_found())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedExecutor {
        pty: bool,
        script: VecDeque<Result<Vec<u8>, String>>,
        calls: Vec<Attempt>,
    }

    impl ScriptedExecutor {
        fn new(pty: bool, script: Vec<Result<Vec<u8>, String>>) -> Self {
            Self {
                pty,
                script: script.into(),
                calls: Vec::new(),
            }
        }
    }

    impl AttemptExecutor for ScriptedExecutor {
        fn pty_supported(&self) -> bool {
            self.pty
        }

        fn run(
            &mut self,
            _request: &InvocationRequest,
            attempt: Attempt,
        ) -> Result<Vec<u8>, InvokeError> {
            self.calls.push(attempt);
            match self.script.pop_front().expect("unexpected extra attempt") {
                Ok(bytes) => Ok(bytes),
                Err(detail) => Err(InvokeError::NonZeroExit {
                    command: "fake".to_string(),
                    code: 1,
                    detail,
                }),
            }
        }
    }

    fn attempt(mode: PayloadMode, channel: Channel) -> Attempt {
        Attempt { mode, channel }
    }

    fn request() -> InvocationRequest {
        InvocationRequest::new("fake").payload("prompt")
    }

    #[test]
    fn first_success_stops_the_plan() {
        let mut executor = ScriptedExecutor::new(true, vec![Ok(b"done".to_vec())]);
        let out = run_plan(&mut executor, &request(), Vec::new()).unwrap();
        assert_eq!(out, b"done");
        assert_eq!(
            executor.calls,
            vec![attempt(PayloadMode::Arg, Channel::Direct)]
        );
    }

    #[test]
    fn tty_failure_trades_up_to_a_pty() {
        let mut executor = ScriptedExecutor::new(
            true,
            vec![
                Err("stdout is not a terminal".to_string()),
                Ok(b"done".to_vec()),
            ],
        );
        let out = run_plan(&mut executor, &request(), Vec::new()).unwrap();
        assert_eq!(out, b"done");
        assert_eq!(
            executor.calls,
            vec![
                attempt(PayloadMode::Arg, Channel::Direct),
                attempt(PayloadMode::Arg, Channel::Pty),
            ]
        );
    }

    #[test]
    fn unrelated_failure_moves_to_the_next_mode_without_a_pty() {
        let mut executor = ScriptedExecutor::new(
            true,
            vec![
                Err("invalid flag --frobnicate".to_string()),
                Ok(b"done".to_vec()),
            ],
        );
        let out = run_plan(&mut executor, &request(), Vec::new()).unwrap();
        assert_eq!(out, b"done");
        assert_eq!(
            executor.calls,
            vec![
                attempt(PayloadMode::Arg, Channel::Direct),
                attempt(PayloadMode::Stdin, Channel::Direct),
            ]
        );
    }

    #[test]
    fn exhaustion_aggregates_every_diagnostic_in_order() {
        let mut executor = ScriptedExecutor::new(
            true,
            vec![
                Err("not a terminal (first)".to_string()),
                Err("pty refused (second)".to_string()),
                Err("not a tty (third)".to_string()),
                Err("pty refused (fourth)".to_string()),
            ],
        );
        let err = run_plan(&mut executor, &request(), Vec::new()).unwrap_err();
        assert_eq!(executor.calls.len(), 4);
        let InvokeError::Exhausted { log } = err else {
            panic!("expected Exhausted");
        };
        assert_eq!(log.matches("\n---\n").count(), 3);
        let first = log.find("(first)").unwrap();
        let second = log.find("(second)").unwrap();
        let third = log.find("(third)").unwrap();
        let fourth = log.find("(fourth)").unwrap();
        assert!(first < second && second < third && third < fourth);
        assert!(log.contains("arg-direct"));
        assert!(log.contains("stdin-pty"));
    }

    #[test]
    fn pty_states_are_skipped_when_unsupported() {
        let mut executor = ScriptedExecutor::new(
            false,
            vec![
                Err("stdout is not a terminal".to_string()),
                Err("stdout is not a terminal".to_string()),
            ],
        );
        let err = run_plan(&mut executor, &request(), Vec::new()).unwrap_err();
        assert!(matches!(err, InvokeError::Exhausted { .. }));
        assert_eq!(
            executor.calls,
            vec![
                attempt(PayloadMode::Arg, Channel::Direct),
                attempt(PayloadMode::Stdin, Channel::Direct),
            ]
        );
    }

    #[test]
    fn earlier_streaming_failures_lead_the_aggregate_log() {
        let mut executor =
            ScriptedExecutor::new(true, vec![Err("boom".to_string()), Err("boom".to_string())]);
        let seeded = vec!["arg-streamed: screen refused".to_string()];
        let err = run_plan(&mut executor, &request(), seeded).unwrap_err();
        let InvokeError::Exhausted { log } = err else {
            panic!("expected Exhausted");
        };
        assert!(log.starts_with("arg-streamed: screen refused"));
    }

    #[test]
    fn repeated_success_never_escalates() {
        for _ in 0..2 {
            let mut executor = ScriptedExecutor::new(true, vec![Ok(b"same".to_vec())]);
            let out = run_plan(&mut executor, &request(), Vec::new()).unwrap();
            assert_eq!(out, b"same");
            assert_eq!(executor.calls.len(), 1);
        }
    }

    #[cfg(unix)]
    #[test]
    fn resolves_commands_on_path() {
        assert!(resolve_command("sh").is_ok());
        assert!(matches!(
            resolve_command("ttycoax-definitely-not-a-binary"),
            Err(InvokeError::CommandNotFound { .. })
        ));
        assert!(matches!(
            resolve_command(""),
            Err(InvokeError::CommandNotFound { .. })
        ));
    }
}
