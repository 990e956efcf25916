//! Recommendation synthesizer
//!
//! Pure function combining placement results, the content spam score, and
//! DNS validation into an ordered list of actionable recommendations.
//! Ordering is deterministic: placement issues, then score issues, then
//! DNS issues, then individual rule callouts.

use seedcheck_common::types::{DnsValidationResult, PlacementResult, SpamScoreResult};
use std::collections::HashMap;

/// How many triggered spam rules get individual callouts
const TOP_RULE_COUNT: usize = 3;

pub fn synthesize_recommendations(
    placements: &HashMap<String, PlacementResult>,
    spam: &SpamScoreResult,
    dns: &DnsValidationResult,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    // Provider placements, sorted for stable output
    let mut providers: Vec<&String> = placements.keys().collect();
    providers.sort();
    for provider in providers {
        if placements[provider].is_spam_folder() {
            recommendations.push(placement_message(provider));
        }
    }

    if spam.score > SpamScoreResult::SPAM_THRESHOLD {
        recommendations.push(
            "High spam score detected - reduce spam trigger words in subject and content"
                .to_string(),
        );
    } else if spam.score > SpamScoreResult::WARN_THRESHOLD {
        recommendations
            .push("Moderate spam score - review content for potential spam triggers".to_string());
    }

    if !dns.spf.valid {
        recommendations.push(
            "SPF record is missing or invalid - configure SPF for better deliverability"
                .to_string(),
        );
    }
    if !dns.dkim.valid {
        recommendations
            .push("DKIM is not configured - add DKIM signing to improve authentication".to_string());
    }
    if !dns.dmarc.valid {
        recommendations
            .push("DMARC policy is missing - implement DMARC to prevent spoofing".to_string());
    }

    for rule in spam.rules.iter().take(TOP_RULE_COUNT) {
        if !rule.description.is_empty() {
            recommendations.push(format!("Spam filter triggered: {}", rule.description));
        }
    }

    if recommendations.is_empty() {
        recommendations
            .push("No issues detected - your email configuration looks good!".to_string());
    }

    recommendations
}

fn placement_message(provider: &str) -> String {
    match provider {
        "gmail" => "Gmail placed your email in spam - review content for spam triggers".to_string(),
        "outlook" => "Outlook flagged your email - check your sender reputation".to_string(),
        "yahoo" => "Yahoo routed your email to bulk - consider warming up your sending IP"
            .to_string(),
        other => format!(
            "{} filtered your email into a spam folder - review content and sender reputation",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use seedcheck_common::types::{DkimCheck, DmarcCheck, SpamRule, SpfCheck};

    fn clean_dns() -> DnsValidationResult {
        DnsValidationResult {
            domain: "example.com".to_string(),
            spf: SpfCheck {
                valid: true,
                record: Some("v=spf1 -all".to_string()),
                issues: vec![],
            },
            dkim: DkimCheck {
                valid: true,
                selector: "default".to_string(),
                record: Some("v=DKIM1; k=rsa; p=abc".to_string()),
                issues: vec![],
            },
            dmarc: DmarcCheck {
                valid: true,
                policy: None,
                record: Some("v=DMARC1; p=reject".to_string()),
                issues: vec![],
            },
        }
    }

    fn failed_dns() -> DnsValidationResult {
        DnsValidationResult {
            domain: "example.com".to_string(),
            spf: SpfCheck {
                valid: false,
                record: None,
                issues: vec!["No SPF record found".to_string()],
            },
            dkim: DkimCheck {
                valid: false,
                selector: "not_found".to_string(),
                record: None,
                issues: vec!["No DKIM record found for common selectors".to_string()],
            },
            dmarc: DmarcCheck {
                valid: false,
                policy: None,
                record: None,
                issues: vec!["No DMARC record found".to_string()],
            },
        }
    }

    fn benign_score() -> SpamScoreResult {
        SpamScoreResult {
            score: 0.5,
            success: true,
            rules: vec![],
            report: None,
        }
    }

    #[test]
    fn test_all_clear_yields_positive_message() {
        let placements =
            HashMap::from([("gmail".to_string(), PlacementResult::Inbox)]);
        let recs = synthesize_recommendations(&placements, &benign_score(), &clean_dns());
        assert_eq!(
            recs,
            vec!["No issues detected - your email configuration looks good!"]
        );
    }

    #[test]
    fn test_ordering_placement_score_dns_rules() {
        let placements = HashMap::from([
            ("gmail".to_string(), PlacementResult::Spam),
            ("outlook".to_string(), PlacementResult::Inbox),
            ("yahoo".to_string(), PlacementResult::Bulk),
        ]);
        let spam = SpamScoreResult {
            score: 6.1,
            success: true,
            rules: vec![
                SpamRule {
                    score: 3.0,
                    rule: "SUBJ_ALL_CAPS".to_string(),
                    description: "Subject is all capitals".to_string(),
                },
                SpamRule {
                    score: 2.0,
                    rule: "HTML_ONLY".to_string(),
                    description: "Message only has HTML parts".to_string(),
                },
            ],
            report: None,
        };

        let recs = synthesize_recommendations(&placements, &spam, &failed_dns());

        assert!(recs[0].starts_with("Gmail"));
        assert!(recs[1].starts_with("Yahoo"));
        assert!(recs[2].contains("High spam score"));
        assert!(recs[3].contains("SPF"));
        assert!(recs[4].contains("DKIM"));
        assert!(recs[5].contains("DMARC"));
        assert!(recs[6].contains("Subject is all capitals"));
        assert!(recs[7].contains("Message only has HTML parts"));
        assert_eq!(recs.len(), 8);
    }

    #[test]
    fn test_dns_failures_one_message_per_mechanism_after_score() {
        // No DNS records at all: one fix per mechanism, following the
        // spam-score message
        let placements = HashMap::from([
            ("gmail".to_string(), PlacementResult::Inbox),
            ("outlook".to_string(), PlacementResult::Inbox),
            ("yahoo".to_string(), PlacementResult::Inbox),
        ]);
        let spam = SpamScoreResult {
            score: 3.5,
            success: true,
            rules: vec![],
            report: None,
        };

        let recs = synthesize_recommendations(&placements, &spam, &failed_dns());
        assert_eq!(recs.len(), 4);
        assert!(recs[0].contains("Moderate spam score"));
        assert!(recs[1].contains("SPF"));
        assert!(recs[2].contains("DKIM"));
        assert!(recs[3].contains("DMARC"));
    }

    #[test]
    fn test_rule_callouts_capped_at_three() {
        let placements = HashMap::new();
        let rules: Vec<SpamRule> = (0..5)
            .map(|i| SpamRule {
                score: 5.0 - i as f64,
                rule: format!("RULE_{}", i),
                description: format!("Description {}", i),
            })
            .collect();
        let spam = SpamScoreResult {
            score: 2.0,
            success: true,
            rules,
            report: None,
        };

        let recs = synthesize_recommendations(&placements, &spam, &clean_dns());
        let callouts: Vec<&String> = recs
            .iter()
            .filter(|r| r.starts_with("Spam filter triggered"))
            .collect();
        assert_eq!(callouts.len(), 3);
    }

    #[test]
    fn test_promotions_is_not_a_spam_placement() {
        let placements =
            HashMap::from([("gmail".to_string(), PlacementResult::Promotions)]);
        let recs = synthesize_recommendations(&placements, &benign_score(), &clean_dns());
        assert_eq!(
            recs,
            vec!["No issues detected - your email configuration looks good!"]
        );
    }
}
