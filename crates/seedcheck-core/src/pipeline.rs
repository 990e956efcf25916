//! Test processing pipeline
//!
//! Runs a submitted test through its steps: dispatch probes, wait out the
//! delivery window, check placement, score content, validate DNS, build
//! recommendations, finalize. Every step journals its output under the
//! test id, so a re-run replays completed steps instead of repeating their
//! side effects, and a crashed run can resume where it stopped.
//!
//! Steps retry with exponential backoff. A step that exhausts its attempts
//! fails the whole run and marks the test record `failed`.

use crate::dns::DnsValidator;
use crate::placement::PlacementChecker;
use crate::probe::{ProbeContent, ProbeDispatcher};
use crate::recommend::synthesize_recommendations;
use crate::spam::SpamChecker;
use crate::store::{TestOutcome, TestStore};
use chrono::Utc;
use seedcheck_common::config::PipelineConfig;
use seedcheck_common::types::{
    DispatchOutcome, DkimCheck, DmarcCheck, DmarcPolicy, DnsValidationResult, ExecutionMode,
    PlacementResult, SpamScoreResult, SpfCheck, TestId, TestRecord, Timestamp,
};
use seedcheck_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Orchestrates one test run end to end
pub struct TestPipeline {
    store: Arc<dyn TestStore>,
    dispatcher: ProbeDispatcher,
    placement: PlacementChecker,
    spam: SpamChecker,
    dns: DnsValidator,
    config: PipelineConfig,
    /// Tests with a run currently in flight
    active: Mutex<HashSet<TestId>>,
}

impl TestPipeline {
    pub fn new(
        store: Arc<dyn TestStore>,
        dispatcher: ProbeDispatcher,
        placement: PlacementChecker,
        spam: SpamChecker,
        dns: DnsValidator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            placement,
            spam,
            dns,
            config,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Provider names in the configured seed panel
    pub fn providers(&self) -> Vec<String> {
        self.placement.providers()
    }

    /// Run the pipeline for a test
    ///
    /// At most one run per test id may be in flight; a second concurrent
    /// call returns a conflict. Re-running a finished test is allowed and
    /// replays the journal without repeating side effects. On failure the
    /// record is marked `failed` before the error is returned.
    pub async fn run(&self, id: TestId, mode: ExecutionMode) -> Result<()> {
        {
            let mut active = self.active.lock().await;
            if !active.insert(id) {
                return Err(Error::Conflict(format!(
                    "Test {} is already being processed",
                    id
                )));
            }
        }

        let result = self.execute(id, mode).await;
        self.active.lock().await.remove(&id);

        match &result {
            Ok(()) => info!("Test {} completed", id),
            Err(e) => {
                error!("Test {} failed: {}", id, e);
                // Best effort; the run error is what the caller sees
                if let Err(mark_err) = self.store.fail_test(id, &e.to_string()).await {
                    error!("Could not mark test {} failed: {}", id, mark_err);
                }
            }
        }

        result
    }

    async fn execute(&self, id: TestId, mode: ExecutionMode) -> Result<()> {
        let record: TestRecord = self
            .run_step(id, "fetch-test", move || async move {
                self.store
                    .load_test(id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))
            })
            .await?;

        let content = ProbeContent {
            from: record.from_address.clone(),
            subject: record.subject.clone(),
            html: record.html_content.clone(),
            text: record.text_content.clone(),
        };
        let content = &content;

        let dispatch: DispatchOutcome = match mode {
            ExecutionMode::Live => {
                self.run_step(id, "send-probes", move || async move {
                    self.dispatcher.dispatch(content).await
                })
                .await?
            }
            ExecutionMode::Test => {
                self.run_step(id, "send-probes", move || async move {
                    Ok(synthetic_dispatch(id, &self.placement.providers()))
                })
                .await?
            }
        };

        let marker = &dispatch.marker;
        self.run_step::<Value, _, _>(id, "record-marker", move || async move {
            self.store.set_marker(id, marker).await?;
            Ok(json!({ "marker": marker }))
        })
        .await?;

        if mode == ExecutionMode::Live {
            // The journal holds the resume instant, not the wait length, so
            // a resumed run only sleeps out the remainder of the window
            let resume_at: Timestamp = self
                .run_step(id, "wait-delivery", move || async move {
                    Ok(Utc::now() + chrono::Duration::seconds(self.config.delivery_wait_secs as i64))
                })
                .await?;

            let remaining = (resume_at - Utc::now()).to_std().unwrap_or_default();
            if !remaining.is_zero() {
                debug!("Waiting {:?} for delivery of test {}", remaining, id);
                tokio::time::sleep(remaining).await;
            }
        }

        let placements: HashMap<String, PlacementResult> = match mode {
            ExecutionMode::Live => {
                self.run_step(id, "check-placement", move || async move {
                    Ok(self.placement.check(marker).await)
                })
                .await?
            }
            ExecutionMode::Test => {
                self.run_step(id, "check-placement", move || async move {
                    Ok(synthetic_placements(&self.placement.providers()))
                })
                .await?
            }
        };

        let spam: SpamScoreResult = match mode {
            ExecutionMode::Live => {
                self.run_step(id, "score-content", move || async move {
                    Ok(self.spam.check(content).await)
                })
                .await?
            }
            ExecutionMode::Test => {
                self.run_step(id, "score-content", move || async move {
                    Ok(synthetic_spam_score())
                })
                .await?
            }
        };

        let domain = record
            .sender_domain()
            .ok_or_else(|| {
                Error::Validation(format!("Invalid sender address: {}", record.from_address))
            })?
            .to_string();
        let domain = &domain;

        let dns: DnsValidationResult = match mode {
            ExecutionMode::Live => {
                self.run_step(id, "validate-dns", move || async move {
                    Ok(self.dns.validate(domain, None).await)
                })
                .await?
            }
            ExecutionMode::Test => {
                self.run_step(id, "validate-dns", move || async move {
                    Ok(synthetic_dns(domain))
                })
                .await?
            }
        };

        let placements = &placements;
        let spam = &spam;
        let dns = &dns;

        let recommendations: Vec<String> = self
            .run_step(id, "build-recommendations", move || async move {
                Ok(synthesize_recommendations(placements, spam, dns))
            })
            .await?;
        let recommendations = &recommendations;

        self.run_step::<Value, _, _>(id, "finalize", move || async move {
            let outcome = TestOutcome {
                inbox_placement: placements.clone(),
                spam_score: spam.score,
                authentication_results: dns.clone(),
                recommendations: recommendations.clone(),
            };
            self.store.complete_test(id, &outcome).await?;
            Ok(json!({ "status": "completed" }))
        })
        .await?;

        Ok(())
    }

    /// Replay a journaled step, or execute it with retries and journal the
    /// output
    async fn run_step<T, F, Fut>(&self, id: TestId, step: &str, op: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(journaled) = self.store.load_step(id, step).await? {
            match serde_json::from_value(journaled) {
                Ok(output) => {
                    debug!("Replaying journaled step {} for test {}", step, id);
                    return Ok(output);
                }
                Err(e) => {
                    warn!(
                        "Journaled output of step {} for test {} is unreadable, re-running: {}",
                        step, id, e
                    );
                }
            }
        }

        let mut attempt = 1;
        loop {
            match op().await {
                Ok(output) => {
                    let value = serde_json::to_value(&output).map_err(|e| {
                        Error::Internal(format!("Step {} output not serializable: {}", step, e))
                    })?;
                    self.store.record_step(id, step, &value).await?;
                    debug!("Step {} for test {} succeeded", step, id);
                    return Ok(output);
                }
                Err(e) if attempt < self.config.step_attempts => {
                    let delay =
                        Duration::from_millis(self.config.retry_base_delay_ms << (attempt - 1));
                    warn!(
                        "Step {} for test {} failed on attempt {}, retrying in {:?}: {}",
                        step, id, attempt, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Step {} for test {} failed after {} attempts: {}",
                        step, id, attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Deterministic dispatch outcome for test mode, no relay involved
fn synthetic_dispatch(id: TestId, providers: &[String]) -> DispatchOutcome {
    let short = id.to_string();
    let marker = format!("test-{}", &short[..8]);

    DispatchOutcome {
        message_ids: providers
            .iter()
            .map(|p| (p.clone(), format!("<{}.{}@seedcheck>", marker, p)))
            .collect(),
        errors: HashMap::new(),
        marker,
    }
}

/// Fixed placements for test mode: yahoo in spam, everything else inboxed
fn synthetic_placements(providers: &[String]) -> HashMap<String, PlacementResult> {
    providers
        .iter()
        .map(|p| {
            let placement = if p == "yahoo" {
                PlacementResult::Spam
            } else {
                PlacementResult::Inbox
            };
            (p.clone(), placement)
        })
        .collect()
}

/// Benign score for test mode
fn synthetic_spam_score() -> SpamScoreResult {
    SpamScoreResult {
        score: 0.1,
        success: true,
        rules: Vec::new(),
        report: None,
    }
}

/// All-valid DNS fixture for test mode
fn synthetic_dns(domain: &str) -> DnsValidationResult {
    DnsValidationResult {
        domain: domain.to_string(),
        spf: SpfCheck {
            valid: true,
            record: Some("v=spf1 include:_spf.example.com -all".to_string()),
            issues: Vec::new(),
        },
        dkim: DkimCheck {
            valid: true,
            selector: "default".to_string(),
            record: Some("v=DKIM1; k=rsa; p=MIGfMA0GCSqGSIb3DQEB".to_string()),
            issues: Vec::new(),
        },
        dmarc: DmarcCheck {
            valid: true,
            policy: Some(DmarcPolicy::Reject),
            record: Some(format!("v=DMARC1; p=reject; rua=mailto:dmarc@{}", domain)),
            issues: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTestStore, NewTest};
    use pretty_assertions::assert_eq;
    use seedcheck_common::config::{RelayConfig, SeedMailboxConfig, SpamCheckConfig};
    use seedcheck_common::types::TestStatus;
    use uuid::Uuid;

    fn seed(provider: &str) -> SeedMailboxConfig {
        SeedMailboxConfig {
            provider: provider.to_string(),
            address: format!("seed@{}.test", provider),
            host: "127.0.0.1".to_string(),
            port: 1,
            username: format!("seed@{}.test", provider),
            password: "secret".to_string(),
            spam_folders: vec!["Spam".to_string()],
            spam_label: PlacementResult::Spam,
            promotions_folder: None,
        }
    }

    fn pipeline(store: Arc<MemoryTestStore>, config: PipelineConfig) -> TestPipeline {
        // Every endpoint is unreachable; test mode must never touch them
        let panel = vec![seed("gmail"), seed("outlook"), seed("yahoo")];
        let relay = RelayConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            starttls: false,
            timeout_secs: 1,
            ..RelayConfig::default()
        };
        TestPipeline::new(
            store,
            ProbeDispatcher::new(relay, &panel),
            PlacementChecker::new(panel, 1),
            SpamChecker::new(SpamCheckConfig {
                url: "http://127.0.0.1:1/filter".to_string(),
                timeout_secs: 1,
            }),
            DnsValidator::new(1),
            config,
        )
    }

    async fn create(store: &MemoryTestStore) -> TestRecord {
        store
            .create_test(NewTest {
                from_address: "alerts@example.com".to_string(),
                subject: "Release Notes".to_string(),
                html_content: Some("<p>Hi</p>".to_string()),
                text_content: Some("Hi".to_string()),
                providers: vec![
                    "gmail".to_string(),
                    "outlook".to_string(),
                    "yahoo".to_string(),
                ],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_mode_run_is_deterministic_and_offline() {
        let store = Arc::new(MemoryTestStore::new());
        let pipeline = pipeline(store.clone(), PipelineConfig::default());
        let record = create(&store).await;

        pipeline.run(record.id, ExecutionMode::Test).await.unwrap();

        let done = store.load_test(record.id).await.unwrap().unwrap();
        assert_eq!(done.status, TestStatus::Completed);
        assert_eq!(
            done.test_marker,
            Some(format!("test-{}", &record.id.to_string()[..8]))
        );
        assert_eq!(done.inbox_placement["gmail"], PlacementResult::Inbox);
        assert_eq!(done.inbox_placement["outlook"], PlacementResult::Inbox);
        assert_eq!(done.inbox_placement["yahoo"], PlacementResult::Spam);
        assert_eq!(done.spam_score, Some(0.1));
        assert!(done.authentication_results.unwrap().all_valid());
        // Yahoo landed in spam, so at least that recommendation exists
        assert!(done.recommendations.iter().any(|r| r.starts_with("Yahoo")));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_rerun_replays_journal_without_changes() {
        let store = Arc::new(MemoryTestStore::new());
        let pipeline = pipeline(store.clone(), PipelineConfig::default());
        let record = create(&store).await;

        pipeline.run(record.id, ExecutionMode::Test).await.unwrap();
        let first = store.load_test(record.id).await.unwrap().unwrap();

        pipeline.run(record.id, ExecutionMode::Test).await.unwrap();
        let second = store.load_test(record.id).await.unwrap().unwrap();

        assert_eq!(second.status, TestStatus::Completed);
        assert_eq!(second.test_marker, first.test_marker);
        assert_eq!(second.completed_at, first.completed_at);
        assert_eq!(second.recommendations, first.recommendations);
    }

    #[tokio::test]
    async fn test_distinct_tests_get_distinct_markers() {
        let store = Arc::new(MemoryTestStore::new());
        let pipeline = pipeline(store.clone(), PipelineConfig::default());
        let a = create(&store).await;
        let b = create(&store).await;

        pipeline.run(a.id, ExecutionMode::Test).await.unwrap();
        pipeline.run(b.id, ExecutionMode::Test).await.unwrap();

        let a = store.load_test(a.id).await.unwrap().unwrap();
        let b = store.load_test(b.id).await.unwrap().unwrap();
        assert_ne!(a.test_marker, b.test_marker);
    }

    #[tokio::test]
    async fn test_unknown_test_id_is_not_found() {
        let store = Arc::new(MemoryTestStore::new());
        let config = PipelineConfig {
            step_attempts: 1,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(store, config);

        let err = pipeline
            .run(Uuid::new_v4(), ExecutionMode::Test)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_live_dispatch_failure_marks_test_failed() {
        let store = Arc::new(MemoryTestStore::new());
        let config = PipelineConfig {
            delivery_wait_secs: 0,
            step_attempts: 2,
            retry_base_delay_ms: 1,
            provider_timeout_secs: 1,
        };
        // The relay is unreachable, so send-probes exhausts its attempts
        let pipeline = pipeline(store.clone(), config);
        let record = create(&store).await;

        let result = pipeline.run(record.id, ExecutionMode::Live).await;
        assert!(result.is_err());

        let failed = store.load_test(record.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TestStatus::Failed);
        assert!(failed.error_message.is_some());
        assert!(failed.completed_at.is_some());
    }
}
