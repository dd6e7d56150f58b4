//! Herd - run one command across a fleet of hosts
//!
//! This is the main entry point for the Herd CLI.

use anyhow::Result;
use herd::cli::commands::CommandContext;
use herd::cli::{Cli, Commands};
use herd::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let mut config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(3);
        }
    };

    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if cli.no_color {
        config.output.color = false;
        config.logging.ansi = false;
    }

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), &config.logging)?;

    if cli.verbosity() >= 2 {
        eprintln!("Herd v{}", herd::VERSION);
    }

    // Create command context
    let mut ctx = CommandContext::new(&cli, config);

    // Execute the appropriate command
    let result = match &cli.command {
        Commands::Run(args) => args.execute(&mut ctx).await,
        Commands::Hosts(args) => args.execute(&mut ctx).await,
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&format!("{e:#}"));
            3
        }
    };

    std::process::exit(exit_code);
}
