use clap::Parser;
use tracing_subscriber::EnvFilter;

use ecuscan_cli::cli::{Cli, Commands};
use ecuscan_cli::commands;
use ecuscan_cli::error::CliError;
use ecuscan_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for --output json.
    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let config_path = cli.config.as_path();

    match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args, config_path, &writer).await,
        Commands::Scans(args) => commands::scans::execute(args, config_path, &writer).await,
        Commands::Report(args) => commands::report::execute(args, config_path, &writer).await,
        Commands::Config(args) => commands::config::execute(args, config_path, &writer).await,
    }
}
