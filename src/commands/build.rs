//! Build command: regenerate the rule expressions from the ASN list.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::rules::build_rules_file;

/// Run the build command. Paths default to the ones in the config file.
pub async fn run(input: Option<PathBuf>, output: Option<PathBuf>, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let input = input.unwrap_or(config.asn_file);
    let output = output.unwrap_or(config.rules_file);

    let count = build_rules_file(&input, &output, config.max_expression_length)?;

    println!("[OK] Wrote {} rule expression(s) to {:?}", count, output);
    Ok(())
}
