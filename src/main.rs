use clap::Parser;
use relay_cache::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Monitor(args) => cli::monitor::run(args).await,
        command => cli::ops::run(command).await,
    }
}
