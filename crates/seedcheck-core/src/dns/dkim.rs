//! DKIM record validation
//!
//! DKIM keys are published per selector at `<selector>._domainkey.<domain>`,
//! so without a supplied selector the only option is probing a list of
//! common ones and accepting the first that resolves.

use super::{DnsValidator, TxtLookup};
use seedcheck_common::types::DkimCheck;

/// Common DKIM selectors to probe, in order
pub const COMMON_DKIM_SELECTORS: &[&str] = &[
    "default",
    "google",
    "selector1",
    "selector2",
    "k1",
    "s1",
    "s2",
    "dkim",
    "mail",
    "email",
    "smtp",
];

pub(super) async fn check(
    validator: &DnsValidator,
    domain: &str,
    selector: Option<&str>,
) -> DkimCheck {
    let candidates: Vec<&str> = match selector {
        Some(s) => vec![s],
        None => COMMON_DKIM_SELECTORS.to_vec(),
    };

    for candidate in candidates {
        let name = format!("{}._domainkey.{}", candidate, domain);
        if let TxtLookup::Records(records) = validator.lookup_txt(&name).await {
            if let Some(record) = records.iter().find(|r| r.starts_with("v=DKIM1")) {
                let issues = evaluate_record(record);
                return DkimCheck {
                    valid: issues.is_empty(),
                    selector: candidate.to_string(),
                    record: Some(record.clone()),
                    issues,
                };
            }
        }
        // Non-matching or missing record: try the next candidate
    }

    not_found(selector)
}

/// Result when no candidate selector resolved to a DKIM record
pub(crate) fn not_found(selector: Option<&str>) -> DkimCheck {
    match selector {
        Some(s) => DkimCheck {
            valid: false,
            selector: s.to_string(),
            record: None,
            issues: vec![format!("No DKIM record found for selector \"{}\"", s)],
        },
        None => DkimCheck {
            valid: false,
            selector: "not_found".to_string(),
            record: None,
            issues: vec!["No DKIM record found for common selectors".to_string()],
        },
    }
}

/// Collect configuration issues for a present DKIM record
pub(crate) fn evaluate_record(record: &str) -> Vec<String> {
    let mut issues = Vec::new();

    match tag_value(record, "p") {
        None => issues.push("DKIM record missing public key (p=)".to_string()),
        Some(key) if key.is_empty() => {
            issues.push("DKIM key is revoked (empty public key)".to_string())
        }
        Some(_) => {}
    }

    if let Some(key_type) = tag_value(record, "k") {
        if !key_type.eq_ignore_ascii_case("rsa") {
            issues.push("Non-RSA DKIM keys may have compatibility issues".to_string());
        }
    }

    issues
}

/// Value of a `tag=value` pair in a semicolon-separated record
fn tag_value(record: &str, tag: &str) -> Option<String> {
    record.split(';').find_map(|part| {
        let part = part.trim();
        let value = part.strip_prefix(tag)?.trim_start();
        let value = value.strip_prefix('=')?;
        Some(value.trim().to_string())
    })
}
