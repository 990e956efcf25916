//! SPF record validation
//!
//! Checks the TXT record published at the domain apex against the common
//! RFC 7208 configuration pitfalls: missing catch-all, oversized records,
//! too many DNS-lookup mechanisms, deprecated ptr, and +all.

use super::{DnsValidator, TxtLookup};
use seedcheck_common::types::SpfCheck;

/// RFC 7208 limit on DNS-lookup-incurring mechanisms
const MAX_DNS_LOOKUPS: usize = 10;

/// Practical single-string TXT record limit in bytes
const MAX_RECORD_LEN: usize = 255;

pub(super) async fn check(validator: &DnsValidator, domain: &str) -> SpfCheck {
    match validator.lookup_txt(domain).await {
        TxtLookup::Records(records) => match records.iter().find(|r| r.starts_with("v=spf1")) {
            Some(record) => {
                let issues = evaluate_record(record);
                SpfCheck {
                    valid: issues.is_empty(),
                    record: Some(record.clone()),
                    issues,
                }
            }
            None => missing("No SPF record found"),
        },
        TxtLookup::NoRecords => missing("No TXT records found"),
        TxtLookup::NxDomain => missing("Domain not found"),
        TxtLookup::Failed(e) => missing(format!("DNS lookup failed: {}", e)),
    }
}

fn missing(issue: impl Into<String>) -> SpfCheck {
    SpfCheck {
        valid: false,
        record: None,
        issues: vec![issue.into()],
    }
}

/// Collect configuration issues for a present SPF record
pub(crate) fn evaluate_record(record: &str) -> Vec<String> {
    let mut issues = Vec::new();

    if !record.contains("~all") && !record.contains("-all") && !record.contains("?all") {
        issues.push("SPF record should end with ~all, -all, or ?all".to_string());
    }

    if record.len() > MAX_RECORD_LEN {
        issues.push(format!(
            "SPF record exceeds {} character limit and may be truncated by resolvers",
            MAX_RECORD_LEN
        ));
    }

    let lookups = count_dns_lookups(record);
    if lookups > MAX_DNS_LOOKUPS {
        issues.push(format!(
            "SPF record requires {} DNS lookups (max {} allowed per RFC 7208)",
            lookups, MAX_DNS_LOOKUPS
        ));
    }

    if has_ptr_mechanism(record) {
        issues.push("PTR mechanism is deprecated and should not be used".to_string());
    }

    if record
        .split_whitespace()
        .any(|term| term.eq_ignore_ascii_case("+all"))
    {
        issues.push(
            "Using +all defeats the purpose of SPF - anyone can send as your domain".to_string(),
        );
    }

    issues
}

/// Count mechanisms that incur a DNS lookup: include, a, mx, ptr, redirect
fn count_dns_lookups(record: &str) -> usize {
    record
        .split_whitespace()
        .filter(|term| {
            let mech = term.trim_start_matches(['+', '-', '~', '?']);
            let mech = mech.to_ascii_lowercase();
            mech == "a"
                || mech == "mx"
                || mech == "ptr"
                || mech.starts_with("a:")
                || mech.starts_with("mx:")
                || mech.starts_with("ptr:")
                || mech.starts_with("include:")
                || mech.starts_with("redirect=")
        })
        .count()
}

fn has_ptr_mechanism(record: &str) -> bool {
    record.split_whitespace().any(|term| {
        let mech = term.trim_start_matches(['+', '-', '~', '?']).to_ascii_lowercase();
        mech == "ptr" || mech.starts_with("ptr:")
    })
}
