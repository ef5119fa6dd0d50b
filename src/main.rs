use clap::Parser;
use docbase::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::commands::run(cli.command).await
}
