//! Test record persistence contract
//!
//! Persistence is an external collaborator consumed through this narrow
//! trait: the pipeline reads the submitted content and writes back status,
//! marker, results, and the per-step journal that makes steps resumable.
//! [`MemoryTestStore`] is the in-tree implementation and test fixture.

use async_trait::async_trait;
use chrono::Utc;
use seedcheck_common::types::{
    DnsValidationResult, PlacementResult, TestId, TestRecord, TestStatus,
};
use seedcheck_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Input for creating a test record
#[derive(Debug, Clone)]
pub struct NewTest {
    pub from_address: String,
    pub subject: String,
    pub html_content: Option<String>,
    pub text_content: Option<String>,
    /// Panel providers, used to seed the placement map with `pending`
    pub providers: Vec<String>,
}

/// Everything the finalize step writes at once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub inbox_placement: HashMap<String, PlacementResult>,
    pub spam_score: f64,
    pub authentication_results: DnsValidationResult,
    pub recommendations: Vec<String>,
}

/// Narrow read/write contract over the test record collection
#[async_trait]
pub trait TestStore: Send + Sync {
    /// Create a new `processing` record
    async fn create_test(&self, new: NewTest) -> Result<TestRecord>;

    async fn load_test(&self, id: TestId) -> Result<Option<TestRecord>>;

    /// Most recent tests first
    async fn list_tests(&self, limit: usize) -> Result<Vec<TestRecord>>;

    /// Persist the probe marker once dispatch succeeded
    async fn set_marker(&self, id: TestId, marker: &str) -> Result<()>;

    /// Transition to `completed`, overwriting all result fields
    async fn complete_test(&self, id: TestId, outcome: &TestOutcome) -> Result<()>;

    /// Transition to `failed` with an error message
    ///
    /// Idempotent: a second call keeps the first message, and a
    /// `completed` test is never downgraded.
    async fn fail_test(&self, id: TestId, message: &str) -> Result<()>;

    /// Journal a step's output under (test id, step name)
    async fn record_step(&self, id: TestId, step: &str, output: &Value) -> Result<()>;

    /// Journaled output for a step, if it already ran
    async fn load_step(&self, id: TestId, step: &str) -> Result<Option<Value>>;
}

/// In-memory test store
#[derive(Default)]
pub struct MemoryTestStore {
    tests: RwLock<HashMap<TestId, TestRecord>>,
    steps: RwLock<HashMap<(TestId, String), Value>>,
}

impl MemoryTestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TestStore for MemoryTestStore {
    async fn create_test(&self, new: NewTest) -> Result<TestRecord> {
        let record = TestRecord {
            id: Uuid::new_v4(),
            from_address: new.from_address,
            subject: new.subject,
            html_content: new.html_content,
            text_content: new.text_content,
            status: TestStatus::Processing,
            test_marker: None,
            inbox_placement: new
                .providers
                .into_iter()
                .map(|p| (p, PlacementResult::Pending))
                .collect(),
            spam_score: None,
            authentication_results: None,
            recommendations: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.tests.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn load_test(&self, id: TestId) -> Result<Option<TestRecord>> {
        Ok(self.tests.read().await.get(&id).cloned())
    }

    async fn list_tests(&self, limit: usize) -> Result<Vec<TestRecord>> {
        let mut records: Vec<TestRecord> = self.tests.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn set_marker(&self, id: TestId, marker: &str) -> Result<()> {
        let mut tests = self.tests.write().await;
        let record = tests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))?;
        record.test_marker = Some(marker.to_string());
        Ok(())
    }

    async fn complete_test(&self, id: TestId, outcome: &TestOutcome) -> Result<()> {
        let mut tests = self.tests.write().await;
        let record = tests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))?;

        record.status = TestStatus::Completed;
        record.inbox_placement = outcome.inbox_placement.clone();
        record.spam_score = Some(outcome.spam_score);
        record.authentication_results = Some(outcome.authentication_results.clone());
        record.recommendations = outcome.recommendations.clone();
        record.error_message = None;
        if record.completed_at.is_none() {
            record.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_test(&self, id: TestId, message: &str) -> Result<()> {
        let mut tests = self.tests.write().await;
        let record = tests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))?;

        // Never downgrade a finished test; keep the first failure message
        if record.status != TestStatus::Processing {
            return Ok(());
        }

        record.status = TestStatus::Failed;
        record.error_message = Some(message.to_string());
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn record_step(&self, id: TestId, step: &str, output: &Value) -> Result<()> {
        self.steps
            .write()
            .await
            .insert((id, step.to_string()), output.clone());
        Ok(())
    }

    async fn load_step(&self, id: TestId, step: &str) -> Result<Option<Value>> {
        Ok(self.steps.read().await.get(&(id, step.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use seedcheck_common::types::{DkimCheck, DmarcCheck, SpfCheck};

    fn new_test() -> NewTest {
        NewTest {
            from_address: "alerts@example.com".to_string(),
            subject: "Release Notes".to_string(),
            html_content: Some("<p>Hi</p>".to_string()),
            text_content: None,
            providers: vec!["gmail".to_string(), "yahoo".to_string()],
        }
    }

    fn outcome() -> TestOutcome {
        TestOutcome {
            inbox_placement: HashMap::from([
                ("gmail".to_string(), PlacementResult::Inbox),
                ("yahoo".to_string(), PlacementResult::Spam),
            ]),
            spam_score: 1.5,
            authentication_results: DnsValidationResult {
                domain: "example.com".to_string(),
                spf: SpfCheck {
                    valid: true,
                    record: Some("v=spf1 -all".to_string()),
                    issues: vec![],
                },
                dkim: DkimCheck {
                    valid: true,
                    selector: "default".to_string(),
                    record: Some("v=DKIM1; p=abc".to_string()),
                    issues: vec![],
                },
                dmarc: DmarcCheck {
                    valid: true,
                    policy: None,
                    record: Some("v=DMARC1; p=reject".to_string()),
                    issues: vec![],
                },
            },
            recommendations: vec!["No issues detected".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_seeds_pending_placements() {
        let store = MemoryTestStore::new();
        let record = store.create_test(new_test()).await.unwrap();

        assert_eq!(record.status, TestStatus::Processing);
        assert_eq!(record.inbox_placement["gmail"], PlacementResult::Pending);
        assert_eq!(record.inbox_placement["yahoo"], PlacementResult::Pending);
        assert!(record.test_marker.is_none());
    }

    #[tokio::test]
    async fn test_complete_populates_results() {
        let store = MemoryTestStore::new();
        let record = store.create_test(new_test()).await.unwrap();

        store.complete_test(record.id, &outcome()).await.unwrap();

        let loaded = store.load_test(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TestStatus::Completed);
        assert_eq!(loaded.spam_score, Some(1.5));
        assert!(loaded.completed_at.is_some());
        assert!(loaded.error_message.is_none());
    }

    #[tokio::test]
    async fn test_fail_is_idempotent_and_never_downgrades() {
        let store = MemoryTestStore::new();
        let record = store.create_test(new_test()).await.unwrap();

        store.fail_test(record.id, "first failure").await.unwrap();
        store.fail_test(record.id, "second failure").await.unwrap();

        let loaded = store.load_test(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TestStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("first failure"));

        // A completed test is never marked failed afterwards
        let done = store.create_test(new_test()).await.unwrap();
        store.complete_test(done.id, &outcome()).await.unwrap();
        store.fail_test(done.id, "late failure").await.unwrap();
        let loaded = store.load_test(done.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TestStatus::Completed);
        assert!(loaded.error_message.is_none());
    }

    #[tokio::test]
    async fn test_step_journal_round_trip() {
        let store = MemoryTestStore::new();
        let record = store.create_test(new_test()).await.unwrap();

        assert!(store
            .load_step(record.id, "send-probes")
            .await
            .unwrap()
            .is_none());

        let output = serde_json::json!({"marker": "seedcheck-abc"});
        store
            .record_step(record.id, "send-probes", &output)
            .await
            .unwrap();

        let loaded = store.load_step(record.id, "send-probes").await.unwrap();
        assert_eq!(loaded, Some(output));
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let store = MemoryTestStore::new();
        let first = store.create_test(new_test()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create_test(new_test()).await.unwrap();

        let listed = store.list_tests(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }
}
