use crate::object;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use std::fmt;
use std::process::ExitCode;
use zeroize::Zeroizing;

/// The operations the bridge can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Encrypt a JSON value with a passphrase
    Encrypt,
    /// Decrypt a JSON value produced by `encrypt`
    Decrypt,
}

impl Command {
    /// Resolve a command by its exact name.
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "encrypt" => Some(Self::Encrypt),
            "decrypt" => Some(Self::Decrypt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }

    fn apply(self, passphrase: &str, value: &Value) -> Result<Value> {
        match self {
            Self::Encrypt => object::encrypt(passphrase, value),
            Self::Decrypt => object::decrypt(passphrase, value),
        }
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// One invocation of the bridge.
///
/// Every flag is optional at the parser level so that a missing one is
/// reported on stdout like any other failure.
#[derive(Args)]
pub struct InvocationArgs {
    /// Operation to run: encrypt or decrypt
    #[arg(long, value_name = "NAME")]
    pub command: Option<String>,

    /// Passphrase the key is derived from
    #[arg(long, allow_hyphen_values = true)]
    pub passphrase: Option<String>,

    /// JSON value to operate on
    #[arg(long, value_name = "JSON", allow_hyphen_values = true)]
    pub obj: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What the process prints and how it exits.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Serialized JSON result.
    Success(String),
    /// The command name matched no operation.
    UnknownCommand(String),
    /// Any other failure, already rendered as text.
    Failed(String),
}

impl Outcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Success(_) => ExitCode::SUCCESS,
            Self::UnknownCommand(_) | Self::Failed(_) => ExitCode::FAILURE,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(json) => f.write_str(json),
            Self::UnknownCommand(name) => write!(f, "ERROR: command \"{name}\" not found"),
            Self::Failed(msg) => write!(f, "ERROR: \"{msg}\""),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(args: InvocationArgs) -> Outcome {
    let passphrase = args.passphrase.map(Zeroizing::new);

    let Some(name) = args.command else {
        return Outcome::Failed("missing required argument --command".to_string());
    };
    // Resolved before the object is looked at, so an unknown name wins over bad input.
    let Some(command) = Command::lookup(&name) else {
        tracing::debug!(%name, "unknown command");
        return Outcome::UnknownCommand(name);
    };

    match dispatch(
        command,
        passphrase.as_ref().map(|p| p.as_str()),
        args.obj.as_deref(),
    ) {
        Ok(json) => Outcome::Success(json),
        Err(e) => {
            tracing::debug!(command = command.name(), error = %format!("{e:#}"), "command failed");
            Outcome::Failed(format!("{e:#}"))
        }
    }
}

fn dispatch(command: Command, passphrase: Option<&str>, obj: Option<&str>) -> Result<String> {
    let passphrase = passphrase.context("missing required argument --passphrase")?;
    let obj = obj.context("missing required argument --obj")?;

    let value: Value = serde_json::from_str(obj).context("invalid JSON in --obj")?;
    tracing::debug!(command = command.name(), "dispatching");

    let result = command.apply(passphrase, &value)?;
    serde_json::to_string(&result).context("serialize result")
}
