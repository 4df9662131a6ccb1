//! Rule expressions built from the bad ASN list.
//!
//! ASNs are packed greedily into `(ip.geoip.asnum in {...})` expressions
//! that stay within Cloudflare's per-rule expression length limit. The
//! resulting list, one expression per line, is the desired state the
//! reconciler projects onto each zone.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::utils::write_atomic;

const EXPRESSION_PREFIX: &str = "(ip.geoip.asnum in {";
const EXPRESSION_SUFFIX: &str = "})";

/// Characters an expression needs besides the ASNs themselves
pub const EXPRESSION_OVERHEAD: usize = EXPRESSION_PREFIX.len() + EXPRESSION_SUFFIX.len();

/// Extract the leading ASN number from a CSV cell.
///
/// Surrounding whitespace and quotes are ignored, trailing text is not
/// part of the number.
///
/// # Examples
/// ```
/// use asnwall::rules::parse_asn;
/// assert_eq!(parse_asn(" \"13335\" "), Some(13335));
/// assert_eq!(parse_asn("16509 Amazon"), Some(16509));
/// assert_eq!(parse_asn("AS13335"), None);
/// ```
pub fn parse_asn(value: &str) -> Option<u32> {
    let cleaned = value.trim().trim_matches('"');
    let end = cleaned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(cleaned.len());
    if end == 0 {
        return None;
    }
    cleaned[..end].parse().ok()
}

/// Read ASNs from the first column of a CSV file with a header row.
pub fn load_asns<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open ASN list: {:?}", path))?;

    let mut asns = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read ASN list: {:?}", path))?;
        match record.get(0).and_then(parse_asn) {
            Some(asn) => asns.push(asn),
            None => debug!("Skipping row without ASN: {:?}", record),
        }
    }

    info!("Loaded {} ASNs from {:?}", asns.len(), path);
    Ok(asns)
}

fn render(asns: &[u32]) -> String {
    let joined = asns
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}{}{}", EXPRESSION_PREFIX, joined, EXPRESSION_SUFFIX)
}

/// Pack ASNs into expressions of at most `max_len` characters.
///
/// ASNs are deduplicated and sorted, so the same input always yields the
/// same expressions. An ASN that does not fit even on its own still gets
/// its own expression.
pub fn pack_expressions(asns: &[u32], max_len: usize) -> Vec<String> {
    let unique: BTreeSet<u32> = asns.iter().copied().collect();

    let mut expressions = Vec::new();
    let mut current: Vec<u32> = Vec::new();
    let mut current_len = EXPRESSION_OVERHEAD;

    for asn in unique {
        let asn_len = asn.to_string().len();
        // Separating space for all but the first ASN
        let added = if current.is_empty() { asn_len } else { asn_len + 1 };

        if current_len + added > max_len && !current.is_empty() {
            expressions.push(render(&current));
            current.clear();
            current_len = EXPRESSION_OVERHEAD + asn_len;
        } else {
            current_len += added;
        }
        current.push(asn);
    }

    if !current.is_empty() {
        expressions.push(render(&current));
    }

    expressions
}

/// Load rule expressions, one per line. Blank lines are skipped.
pub fn load_rule_expressions<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule expressions file: {:?}", path))?;

    let expressions: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    info!("Loaded {} rule expressions from {:?}", expressions.len(), path);
    Ok(expressions)
}

/// Write rule expressions, one per line
pub fn write_rule_expressions<P: AsRef<Path>>(path: P, expressions: &[String]) -> Result<()> {
    let mut content = expressions.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    write_atomic(path.as_ref(), content.as_bytes())
}

/// Regenerate the rules file from the ASN list. Returns the expression count.
pub fn build_rules_file(asn_file: &Path, rules_file: &Path, max_len: usize) -> Result<usize> {
    let asns = load_asns(asn_file)?;
    if asns.is_empty() {
        anyhow::bail!("No ASNs found in {:?}", asn_file);
    }

    let expressions = pack_expressions(&asns, max_len);
    write_rule_expressions(rules_file, &expressions)?;

    info!(
        "Generated {} rule expression(s) in {:?}",
        expressions.len(),
        rules_file
    );
    Ok(expressions.len())
}
