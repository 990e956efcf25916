//! Spam content scorer adapter
//!
//! Submits the raw probe message to a SpamCheck-compatible HTTP endpoint
//! (SpamAssassin behind a JSON API) and normalizes the response. The
//! adapter degrades on failure: an unreachable or misbehaving scorer
//! yields `success = false`, never a pipeline error.

use crate::probe::{self, ProbeContent};
use regex::Regex;
use reqwest::Client;
use seedcheck_common::config::SpamCheckConfig;
use seedcheck_common::types::{SpamRule, SpamScoreResult};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Recipient placeholder for the scored message; not used for scoring
const SCORING_RCPT: &str = "spamcheck@seedcheck.test";

/// Raw scorer API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    rules: Option<Value>,
    #[serde(default)]
    report: Option<String>,
}

/// HTTP client for the spam scoring service
pub struct SpamChecker {
    config: SpamCheckConfig,
    client: Client,
}

impl SpamChecker {
    pub fn new(config: SpamCheckConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Score the probe content
    pub async fn check(&self, content: &ProbeContent) -> SpamScoreResult {
        let raw = match probe::build_raw_message(content, SCORING_RCPT) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to build message for spam check: {}", e);
                return SpamScoreResult::unavailable(e.to_string());
            }
        };

        match self.submit(&raw).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Spam check request failed: {}", e);
                SpamScoreResult::unavailable(e.to_string())
            }
        }
    }

    async fn submit(&self, raw_message: &[u8]) -> anyhow::Result<SpamScoreResult> {
        debug!("Submitting message to spam scorer at {}", self.config.url);

        let body = json!({
            "email": String::from_utf8_lossy(raw_message),
            "options": "long",
        });

        let response = self.client.post(&self.config.url).json(&body).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Spam scorer returned status {}", response.status());
        }

        let api: ApiResponse = response.json().await?;

        if !api.success {
            return Ok(SpamScoreResult::unavailable(
                "Spam scorer returned an unsuccessful response",
            ));
        }

        let score = api.score.as_ref().map(parse_score).unwrap_or(0.0);
        let mut rules = match api.rules {
            Some(rules) => parse_rules(&rules),
            None => api
                .report
                .as_deref()
                .map(parse_rule_report)
                .unwrap_or_default(),
        };
        sort_rules(&mut rules);

        Ok(SpamScoreResult {
            score,
            success: true,
            rules,
            report: api.report,
        })
    }
}

/// Scores arrive as numbers or numeric strings depending on the service
fn parse_score(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Parse a structured rule list, or fall back to a text report
fn parse_rules(value: &Value) -> Vec<SpamRule> {
    match value {
        Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| {
                let obj = entry.as_object()?;
                Some(SpamRule {
                    score: obj.get("score").map(parse_score).unwrap_or(0.0),
                    rule: obj
                        .get("rule")
                        .and_then(Value::as_str)
                        .unwrap_or("UNKNOWN")
                        .to_string(),
                    description: obj
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect(),
        Value::String(report) => parse_rule_report(report),
        _ => Vec::new(),
    }
}

/// Parse a SpamAssassin text report: `score RULE_NAME description` lines
fn parse_rule_report(report: &str) -> Vec<SpamRule> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let line_re = LINE.get_or_init(|| {
        Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s+([A-Z0-9_]+)\s+(.*)$").unwrap()
    });

    report
        .lines()
        .filter_map(|line| {
            let caps = line_re.captures(line)?;
            Some(SpamRule {
                score: caps[1].parse().ok()?,
                rule: caps[2].to_string(),
                description: caps[3].trim().to_string(),
            })
        })
        .collect()
}

/// Most impactful rules first
fn sort_rules(rules: &mut [SpamRule]) {
    rules.sort_by(|a, b| {
        b.score
            .abs()
            .partial_cmp(&a.score.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
