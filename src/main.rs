use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use ttycoax::{invoke, Config, InvocationRequest, InvokeOutput};

/// Drive a terminal-insisting CLI from a context that has no terminal.
#[derive(Debug, Parser)]
#[command(name = "ttycoax", version, about)]
struct Cli {
    /// Target command to run (overrides the configured default).
    #[arg(long)]
    command: Option<String>,

    /// Extra argument appended to every attempt (repeatable).
    #[arg(long = "arg", value_name = "ARG")]
    args: Vec<String>,

    /// Per-attempt timeout in seconds (overrides the configured default).
    #[arg(long)]
    timeout: Option<u64>,

    /// Prompt payload. Read from stdin when omitted.
    prompt: Option<String>,
}

fn main() -> anyhow::Result<()> {
    ttycoax::init_tracing();
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    let payload = match cli.prompt {
        Some(prompt) => prompt,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("reading prompt from stdin")?;
            buffer
        }
    };
    if payload.trim().is_empty() {
        bail!("prompt is empty");
    }

    let command = cli.command.unwrap_or(config.defaults.command);
    let term = std::env::var("TERM").unwrap_or(config.defaults.term);
    let mut request = InvocationRequest::new(command)
        .args(config.defaults.extra_args)
        .args(cli.args)
        .payload(payload)
        .env("TERM", term);
    if let Some(secs) = cli.timeout.or(config.defaults.timeout_secs) {
        request = request.timeout(Duration::from_secs(secs));
    }

    match invoke(&request)? {
        InvokeOutput::Captured(bytes) => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
        InvokeOutput::Streamed => {}
    }
    Ok(())
}
