//! Findings parser
//!
//! The single place where the capability's untyped text output becomes
//! typed `Finding` values. Models wrap JSON in prose and code fences, so
//! the parser strips fences, locates the first top-level JSON array, and
//! validates each entry individually — a malformed entry is dropped, a
//! missing array fails the parse.

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{round_cents, Finding, FindingChannel};

/// Untyped finding as the capability emits it
#[derive(Debug, Deserialize)]
struct RawFinding {
    item_name: String,
    original_price: f64,
    original_merchant: String,
    alternative_merchant: String,
    alternative_price: f64,
    shipping_cost: f64,
    tax_estimate: f64,
    total_landed_cost: f64,
    total_savings: f64,
    url: String,
    #[serde(default)]
    notes: Option<String>,
    channel: String,
    confidence: f64,
}

/// Parse the capability's final text into validated findings.
///
/// Entries missing required fields are rejected; findings below
/// `min_savings` are discarded; monetary fields are coerced to 2-decimal
/// non-negative numbers and confidence is clamped to [0, 1]. At most
/// `max_findings` survive.
pub fn parse_findings(raw: &str, min_savings: f64, max_findings: usize) -> Result<Vec<Finding>> {
    let stripped = strip_code_fences(raw);
    let array_text = extract_json_array(&stripped)
        .ok_or_else(|| Error::Parse("no JSON array found in search output".to_string()))?;

    let values: Vec<serde_json::Value> = serde_json::from_str(array_text)
        .map_err(|e| Error::Parse(format!("invalid JSON array in search output: {}", e)))?;

    let total = values.len();
    let mut findings = Vec::new();
    for value in values {
        let raw: RawFinding = match serde_json::from_value(value) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "Rejected malformed finding entry");
                continue;
            }
        };
        let Ok(channel) = raw.channel.parse::<FindingChannel>() else {
            debug!(channel = %raw.channel, "Rejected finding with unknown channel");
            continue;
        };

        let total_savings = money(raw.total_savings);
        if total_savings < min_savings {
            continue;
        }

        findings.push(Finding {
            item_name: raw.item_name,
            original_price: money(raw.original_price),
            original_merchant: raw.original_merchant,
            alternative_merchant: raw.alternative_merchant,
            alternative_price: money(raw.alternative_price),
            shipping_cost: money(raw.shipping_cost),
            tax_estimate: money(raw.tax_estimate),
            total_landed_cost: money(raw.total_landed_cost),
            total_savings,
            url: raw.url,
            notes: raw.notes,
            channel,
            confidence: raw.confidence.clamp(0.0, 1.0),
        });
        if findings.len() >= max_findings {
            break;
        }
    }

    debug!(total, kept = findings.len(), "Parsed search findings");
    Ok(findings)
}

fn money(value: f64) -> f64 {
    round_cents(value.max(0.0))
}

/// Drop markdown code-fence lines, keeping the fenced content.
fn strip_code_fences(raw: &str) -> String {
    if !raw.contains("```") {
        return raw.to_string();
    }
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Slice out the first top-level JSON array, tracking strings and escapes
/// so brackets inside text don't confuse the scan.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'[' if !in_string => depth += 1,
            b']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
