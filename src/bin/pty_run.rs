use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use ttycoax::invoke::request::DEFAULT_TERM;
use ttycoax::pty::{PtySession, RelayExit};

/// Run a command inside a pseudo-terminal and capture everything it writes.
///
/// The child sees a real TTY; cursor-position and device-attribute queries
/// are answered synthetically so it never blocks waiting on a terminal.
#[derive(Debug, Parser)]
#[command(name = "pty-run", version, about)]
struct Cli {
    /// Forward this process's stdin to the child, newline-terminated.
    #[arg(long)]
    stdin: bool,

    /// Seconds before the child is killed.
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Command and arguments to execute.
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    ttycoax::init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pty-run: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let input = if cli.stdin {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        (!buffer.is_empty()).then_some(buffer)
    } else {
        None
    };

    let term = std::env::var("TERM").unwrap_or_else(|_| DEFAULT_TERM.to_string());
    let env = vec![("TERM".to_string(), term)];

    let mut session = PtySession::spawn(
        &cli.command,
        input.as_deref(),
        Some(Duration::from_secs(cli.timeout)),
        None,
        &env,
    )?;
    let outcome = session.relay()?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&outcome.output)?;
    stdout.flush()?;

    match outcome.exit {
        RelayExit::Exited(code) => Ok(ExitCode::from(code.min(255) as u8)),
        RelayExit::TimedOut => {
            eprintln!("pty-run: timed out after {}s", cli.timeout);
            Ok(ExitCode::FAILURE)
        }
    }
}
