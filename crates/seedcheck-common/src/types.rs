//! Common types for SeedCheck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for deliverability tests
pub type TestId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Lifecycle status of a deliverability test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Processing => write!(f, "processing"),
            TestStatus::Completed => write!(f, "completed"),
            TestStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Execution mode for a test run
///
/// `Test` substitutes deterministic synthetic results for every external
/// call and skips the delivery wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Live,
    Test,
}

/// Where a probe message was found at a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementResult {
    /// Placeholder before the placement checker has run
    Pending,
    Inbox,
    Spam,
    Junk,
    Bulk,
    Promotions,
    NotFound,
}

impl PlacementResult {
    /// True for any spam-equivalent folder
    pub fn is_spam_folder(&self) -> bool {
        matches!(
            self,
            PlacementResult::Spam | PlacementResult::Junk | PlacementResult::Bulk
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementResult::Pending => "pending",
            PlacementResult::Inbox => "inbox",
            PlacementResult::Spam => "spam",
            PlacementResult::Junk => "junk",
            PlacementResult::Bulk => "bulk",
            PlacementResult::Promotions => "promotions",
            PlacementResult::NotFound => "not_found",
        }
    }
}

/// DMARC policy action (p= tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmarcPolicy {
    None,
    Quarantine,
    Reject,
}

impl DmarcPolicy {
    /// Parse a p=/sp= tag value
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(DmarcPolicy::None),
            "quarantine" => Some(DmarcPolicy::Quarantine),
            "reject" => Some(DmarcPolicy::Reject),
            _ => None,
        }
    }
}

/// SPF record check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpfCheck {
    pub valid: bool,
    pub record: Option<String>,
    pub issues: Vec<String>,
}

/// DKIM record check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DkimCheck {
    pub valid: bool,
    /// Matched selector, or `not_found` when no candidate resolved
    pub selector: String,
    pub record: Option<String>,
    pub issues: Vec<String>,
}

/// DMARC record check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmarcCheck {
    pub valid: bool,
    pub policy: Option<DmarcPolicy>,
    pub record: Option<String>,
    pub issues: Vec<String>,
}

/// Combined SPF/DKIM/DMARC validation result for a domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsValidationResult {
    pub domain: String,
    pub spf: SpfCheck,
    pub dkim: DkimCheck,
    pub dmarc: DmarcCheck,
}

impl DnsValidationResult {
    /// True when all three mechanisms validated cleanly
    pub fn all_valid(&self) -> bool {
        self.spf.valid && self.dkim.valid && self.dmarc.valid
    }
}

/// A single triggered spam rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamRule {
    pub score: f64,
    pub rule: String,
    pub description: String,
}

/// Content spam score, lower is better
///
/// Scores above [`SpamScoreResult::SPAM_THRESHOLD`] are considered flagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamScoreResult {
    pub score: f64,
    pub success: bool,
    /// Triggered rules, sorted by descending absolute score
    pub rules: Vec<SpamRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

impl SpamScoreResult {
    /// Above this the content is likely to be filtered
    pub const SPAM_THRESHOLD: f64 = 5.0;

    /// Above this the content deserves a softer warning
    pub const WARN_THRESHOLD: f64 = 3.0;

    /// A failed check: no usable score
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            success: false,
            rules: Vec::new(),
            report: Some(reason.into()),
        }
    }
}

/// Outcome of dispatching probe messages to the seed panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Unique token embedded in the probe subject
    pub marker: String,
    /// Outbound message id per provider that accepted the probe
    pub message_ids: HashMap<String, String>,
    /// Error string per provider that rejected it
    pub errors: HashMap<String, String>,
}

impl DispatchOutcome {
    /// At least one seed address accepted the probe
    pub fn any_sent(&self) -> bool {
        !self.message_ids.is_empty()
    }
}

/// A deliverability test record
///
/// Created once, then mutated only by the pipeline as steps complete.
/// Placement, score, authentication, and recommendations are populated iff
/// the status is `completed`; `error_message` iff `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: TestId,
    pub from_address: String,
    pub subject: String,
    pub html_content: Option<String>,
    pub text_content: Option<String>,
    pub status: TestStatus,
    pub test_marker: Option<String>,
    pub inbox_placement: HashMap<String, PlacementResult>,
    pub spam_score: Option<f64>,
    pub authentication_results: Option<DnsValidationResult>,
    pub recommendations: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl TestRecord {
    /// Domain part of the sender address
    pub fn sender_domain(&self) -> Option<&str> {
        EmailAddress::domain_of(&self.from_address)
    }
}

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1].to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Domain part of an address string, lowercased view
    pub fn domain_of(s: &str) -> Option<&str> {
        let at = s.rfind('@')?;
        let domain = &s[at + 1..];
        if domain.is_empty() {
            None
        } else {
            Some(domain)
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("user@Example.COM").unwrap();
        assert_eq!(email.local, "user");
        assert_eq!(email.domain, "example.com");
        assert_eq!(email.to_string(), "user@example.com");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_placement_serde_names() {
        let json = serde_json::to_string(&PlacementResult::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        let back: PlacementResult = serde_json::from_str("\"inbox\"").unwrap();
        assert_eq!(back, PlacementResult::Inbox);
    }

    #[test]
    fn test_spam_folder_classification() {
        assert!(PlacementResult::Junk.is_spam_folder());
        assert!(PlacementResult::Bulk.is_spam_folder());
        assert!(!PlacementResult::Promotions.is_spam_folder());
        assert!(!PlacementResult::Inbox.is_spam_folder());
    }

    #[test]
    fn test_dmarc_policy_parse() {
        assert_eq!(DmarcPolicy::parse("Reject"), Some(DmarcPolicy::Reject));
        assert_eq!(DmarcPolicy::parse("none"), Some(DmarcPolicy::None));
        assert_eq!(DmarcPolicy::parse("block"), None);
    }
}
