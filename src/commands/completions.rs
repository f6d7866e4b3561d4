use clap::CommandFactory;
use clap_complete::{Shell, generate};
use eyre::Result;
use std::io::{self, Write};

use crate::cli::Cli;

/// Print a completion script for `shell` to stdout
pub fn run(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    let mut stdout = io::stdout().lock();
    generate(shell, &mut cmd, bin_name, &mut stdout);
    stdout.flush()?;
    Ok(())
}
