mod cli;
mod input;
mod run;
mod watch;
mod window;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Preprocess { shader }) => run::preprocess_file(&shader),
        None => run::run(cli.run),
    }
}
