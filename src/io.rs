use anyhow::{Context, Result};
use std::io::{self, Write};

/// Write the whole response to stdout and flush before the process exits.
pub fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes()).context("write stdout")?;
    stdout.flush().context("flush stdout")
}
