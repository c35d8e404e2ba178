mod cmd;
mod crypto;
mod io;
mod object;
mod sealed;

use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// blackmagic — encrypt and decrypt JSON objects with a passphrase.
///
/// The result is always written to stdout: JSON on success, or a line
/// starting with `ERROR:` and exit code 1 on failure.
///
/// Crypto: Argon2id (passphrase) + Blake3 (KDF) + XChaCha20-Poly1305 (per field).
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    invocation: cmd::InvocationArgs,
}

fn main() -> ExitCode {
    init_tracing();

    let outcome = match Cli::try_parse() {
        Ok(cli) => cmd::run(cli.invocation),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => cmd::Outcome::Failed(parse_error_message(&e)),
    };

    if let Err(e) = io::write_stdout(&outcome.to_string()) {
        eprintln!("blackmagic: {e:#}");
        return ExitCode::FAILURE;
    }
    outcome.exit_code()
}

/// Diagnostics go to stderr and stay off unless `RUST_LOG` asks for them.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// First line of a clap error, without its `error: ` prefix.
fn parse_error_message(e: &clap::Error) -> String {
    let rendered = e.to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).to_string()
}
