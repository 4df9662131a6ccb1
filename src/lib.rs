//! # asnwall - Cloudflare ruleset sync for blocking bad ASNs
//!
//! Keeps a numbered family of blocking rules (`Block-Bad-ASNs-Part-N`) in
//! each managed zone's custom firewall ruleset in step with a generated
//! list of rule expressions. Rules the tool does not own are never altered
//! or reordered.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        asnwall                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: sync, update-only, setup, build, version   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Managed zones + snapshot of accounts/zones/rules     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Rules (csv)                                                │
//! │    └── ASN list -> packed (ip.geoip.asnum in {...})         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Ruleset engine (pure)                                      │
//! │    └── tag -> classify -> diff -> payload -> reconcile      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Gateway (RulesetGateway / ZoneDirectory traits)            │
//! │    └── CloudflareClient (reqwest + rustls)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use asnwall::config::Config;
//! use asnwall::gateway::{CloudflareClient, Zone};
//! use asnwall::rules::load_rule_expressions;
//! use asnwall::ruleset::{ReconcileOptions, Reconciler};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("cf.yaml")?;
//!     let expressions = load_rule_expressions(&config.rules_file)?;
//!
//!     let client = CloudflareClient::new(
//!         config.token(),
//!         &config.api_base_url,
//!         Duration::from_secs(config.timeout_secs),
//!     )?;
//!
//!     let zone = Zone {
//!         id: "023e105f4ecef8ad9ca31a8372d0c353".to_string(),
//!         name: "example.com".to_string(),
//!     };
//!     let outcome = Reconciler::new(&client, ReconcileOptions::default())
//!         .reconcile(&zone, &expressions)
//!         .await?;
//!     println!("changed: {}", outcome.changed());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Typed API and transport errors
//! - [`gateway`] - Remote ruleset access (Cloudflare)
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`rules`] - Rule expressions built from the ASN list
//! - [`ruleset`] - Reconciliation engine
//! - [`stats`] - Run summary persistence
//! - [`utils`] - Common utility functions

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod rules;
pub mod ruleset;
pub mod stats;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::AsnwallError;
