//! asnwall - Cloudflare ruleset sync for blocking bad ASNs

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use asnwall::cli::{Cli, Commands};
use asnwall::commands::sync::SyncArgs;
use asnwall::ruleset::SyncMode;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        None => asnwall::commands::sync::run(SyncArgs::default(), &cli.config).await,
        Some(Commands::Sync {
            dry_run,
            skip_build,
        }) => {
            let args = SyncArgs {
                mode: SyncMode::Full,
                dry_run,
                skip_build,
            };
            asnwall::commands::sync::run(args, &cli.config).await
        }
        Some(Commands::UpdateOnly { dry_run }) => {
            let args = SyncArgs {
                mode: SyncMode::UpdateOnly,
                dry_run,
                skip_build: false,
            };
            asnwall::commands::sync::run(args, &cli.config).await
        }
        Some(Commands::Setup) => asnwall::commands::setup::run(&cli.config).await,
        Some(Commands::Build { input, output }) => {
            asnwall::commands::build::run(input, output, &cli.config).await
        }
        Some(Commands::Version) => {
            println!("asnwall {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
