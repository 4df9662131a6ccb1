//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "asnwall")]
#[command(author, version, about = "Cloudflare ruleset sync for blocking bad ASNs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run (default: sync)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = "cf.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build rules and synchronize them to every managed zone
    Sync {
        /// Compute and log the changes without writing them
        #[arg(long)]
        dry_run: bool,

        /// Use the existing rules file instead of regenerating it
        #[arg(long)]
        skip_build: bool,
    },

    /// Only update existing rule parts; never create or delete any
    UpdateOnly {
        /// Compute and log the changes without writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Discover accounts and zones and write them to the config file
    Setup,

    /// Regenerate the rules file from the ASN list
    Build {
        /// ASN CSV file (default: asn_file from config)
        input: Option<PathBuf>,

        /// Rules output file (default: rules_file from config)
        output: Option<PathBuf>,
    },

    /// Show version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["asnwall"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("cf.yaml"));
    }

    #[test]
    fn test_sync_flags() {
        let cli =
            Cli::try_parse_from(["asnwall", "sync", "--dry-run", "--skip-build", "-c", "x.yaml"])
                .unwrap();
        match cli.command {
            Some(Commands::Sync {
                dry_run,
                skip_build,
            }) => {
                assert!(dry_run);
                assert!(skip_build);
            }
            _ => panic!("expected sync"),
        }
        assert_eq!(cli.config, PathBuf::from("x.yaml"));
    }

    #[test]
    fn test_update_only_subcommand() {
        let cli = Cli::try_parse_from(["asnwall", "-v", "update-only"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Some(Commands::UpdateOnly { dry_run: false })
        ));
    }

    #[test]
    fn test_build_positional_paths() {
        let cli = Cli::try_parse_from(["asnwall", "build", "in.csv", "out.txt"]).unwrap();
        match cli.command {
            Some(Commands::Build { input, output }) => {
                assert_eq!(input, Some(PathBuf::from("in.csv")));
                assert_eq!(output, Some(PathBuf::from("out.txt")));
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["asnwall", "install"]).is_err());
    }
}
