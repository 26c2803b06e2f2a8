//! e2e2d CLI - Main Entry Point
//!
//! Runs YAML scenarios in a browser and writes their documentation trace.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{run, scenarios};

/// e2e2d - end to end to documentation
#[derive(Parser)]
#[command(name = "e2e2d")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios in a browser
    Run(run::RunArgs),

    /// Inspect scenario files
    #[command(subcommand)]
    Scenarios(scenarios::ScenarioCommands),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            if !run::execute(args).await? {
                std::process::exit(1);
            }
        }
        Commands::Scenarios(cmd) => scenarios::execute(cmd)?,
        Commands::Version => {
            println!("e2e2d v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "e2e2d",
            "run",
            "scenarios/",
            "--tag",
            "smoke",
            "--no-doc",
            "-c",
            "user:ada",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.tag.as_deref(), Some("smoke"));
                let config = args.e2e2d.into_config();
                assert!(!config.generate_doc);
                assert_eq!(config.data("user"), Some(&serde_json::json!("ada")));
            }
            _ => panic!("expected run"),
        }
    }
}
