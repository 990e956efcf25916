//! DMARC record validation
//!
//! Fetches the TXT record at `_dmarc.<domain>` and lints the published
//! policy. A record with `p=none` is structurally valid but earns a
//! weak-policy warning: validity and issue reporting are independent.

use super::{DnsValidator, TxtLookup};
use seedcheck_common::types::{DmarcCheck, DmarcPolicy};
use std::collections::HashMap;

pub(super) async fn check(validator: &DnsValidator, domain: &str) -> DmarcCheck {
    let name = format!("_dmarc.{}", domain);

    match validator.lookup_txt(&name).await {
        TxtLookup::Records(records) => {
            match records.iter().find(|r| r.starts_with("v=DMARC1")) {
                Some(record) => evaluate_record(record),
                None => missing("No DMARC record found"),
            }
        }
        TxtLookup::NoRecords => missing("No DMARC TXT record found"),
        TxtLookup::NxDomain => missing("DMARC domain not found"),
        TxtLookup::Failed(e) => missing(format!("DNS lookup failed: {}", e)),
    }
}

fn missing(issue: impl Into<String>) -> DmarcCheck {
    DmarcCheck {
        valid: false,
        policy: None,
        record: None,
        issues: vec![issue.into()],
    }
}

/// Lint a present DMARC record
pub(crate) fn evaluate_record(record: &str) -> DmarcCheck {
    let mut issues = Vec::new();
    let tags = parse_tags(record);

    let policy = tags.get("p").and_then(|p| DmarcPolicy::parse(p));

    match policy {
        None => issues.push("DMARC record missing policy (p=)".to_string()),
        Some(DmarcPolicy::None) => issues.push(
            "DMARC policy is set to \"none\" - consider \"quarantine\" or \"reject\" for better protection"
                .to_string(),
        ),
        Some(_) => {}
    }

    if !tags.contains_key("rua") {
        issues.push(
            "DMARC record missing aggregate report address (rua) - you won't receive reports"
                .to_string(),
        );
    }

    if !tags.contains_key("ruf") {
        issues.push(
            "Consider adding a forensic report address (ruf) for detailed failure reports"
                .to_string(),
        );
    }

    if policy == Some(DmarcPolicy::Reject) {
        if let Some(sp) = tags.get("sp").and_then(|sp| DmarcPolicy::parse(sp)) {
            if sp != DmarcPolicy::Reject {
                issues.push(
                    "Subdomain policy (sp) is weaker than the main policy - consider aligning them"
                        .to_string(),
                );
            }
        }
    }

    if let Some(pct) = tags.get("pct").and_then(|p| p.parse::<u8>().ok()) {
        if pct < 100 {
            issues.push(format!(
                "DMARC policy only applies to {}% of emails - consider increasing to 100%",
                pct
            ));
        }
    }

    DmarcCheck {
        valid: policy.is_some(),
        policy,
        record: Some(record.to_string()),
        issues,
    }
}

/// Parse semicolon-separated `tag=value` pairs
fn parse_tags(record: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();

    for part in record.split(';') {
        let part = part.trim();
        if let Some(eq_pos) = part.find('=') {
            let name = part[..eq_pos].trim().to_lowercase();
            let value = part[eq_pos + 1..].trim().to_string();
            tags.insert(name, value);
        }
    }

    tags
}
