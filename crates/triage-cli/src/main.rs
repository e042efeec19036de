//! # triage CLI Entry Point

use clap::Parser;

/// Emergency triage tooling.
#[derive(Parser, Debug)]
#[command(name = "triage", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Classify a customer message and print the result as JSON.
    Classify(triage_cli::classify::ClassifyArgs),
    /// Technician roster tools.
    Roster(triage_cli::roster::RosterArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Classify(args) => {
            triage_cli::classify::run(&args, &mut stdout)?;
        }
        Commands::Roster(args) => {
            triage_cli::roster::run(&args, &mut stdout)?;
        }
    }

    Ok(())
}
