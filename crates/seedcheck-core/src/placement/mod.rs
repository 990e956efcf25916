//! Mailbox placement checker
//!
//! Locates the probe marker across the seed panel: INBOX first, then the
//! provider's spam-equivalent folders, then an optional promotions-style
//! category. Providers are checked concurrently and failure-isolated: a
//! dead or slow mailbox degrades to `not_found` for that provider alone.

mod imap;

use imap::ImapSession;
use seedcheck_common::config::SeedMailboxConfig;
use seedcheck_common::types::PlacementResult;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Checks probe placement across the seed panel
pub struct PlacementChecker {
    panel: Vec<SeedMailboxConfig>,
    timeout: Duration,
}

impl PlacementChecker {
    pub fn new(panel: Vec<SeedMailboxConfig>, timeout_secs: u64) -> Self {
        Self {
            panel,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Provider names in the configured panel
    pub fn providers(&self) -> Vec<String> {
        self.panel.iter().map(|s| s.provider.clone()).collect()
    }

    /// Search every seed mailbox for the marker
    ///
    /// Always returns an entry per configured provider; errors and
    /// timeouts are mapped to `not_found`, never propagated.
    pub async fn check(&self, marker: &str) -> HashMap<String, PlacementResult> {
        let mut tasks = JoinSet::new();

        for seed in self.panel.iter().cloned() {
            let marker = marker.to_string();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let provider = seed.provider.clone();
                let placement =
                    match tokio::time::timeout(timeout, check_mailbox(&seed, &marker)).await {
                        Ok(Ok(placement)) => placement,
                        Ok(Err(e)) => {
                            warn!("Placement check failed for {}: {:#}", provider, e);
                            PlacementResult::NotFound
                        }
                        Err(_) => {
                            warn!(
                                "Placement check for {} timed out after {:?}",
                                provider, timeout
                            );
                            PlacementResult::NotFound
                        }
                    };
                (provider, placement)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((provider, placement)) => {
                    debug!("Placement for {}: {}", provider, placement.as_str());
                    results.insert(provider, placement);
                }
                Err(e) => error!("Placement task failed to join: {}", e),
            }
        }

        results
    }
}

/// Search one provider's folders, in placement priority order
async fn check_mailbox(seed: &SeedMailboxConfig, marker: &str) -> anyhow::Result<PlacementResult> {
    let mut session = ImapSession::connect(&seed.host, seed.port).await?;
    session.login(&seed.username, &seed.password).await?;

    let placement = search_folders(&mut session, seed, marker).await;

    if let Err(e) = session.logout().await {
        debug!("IMAP logout for {} failed: {:#}", seed.provider, e);
    }

    placement
}

async fn search_folders(
    session: &mut ImapSession,
    seed: &SeedMailboxConfig,
    marker: &str,
) -> anyhow::Result<PlacementResult> {
    if session.folder_contains_subject("INBOX", marker).await? {
        return Ok(PlacementResult::Inbox);
    }

    for folder in &seed.spam_folders {
        if session.folder_contains_subject(folder, marker).await? {
            return Ok(seed.spam_label);
        }
    }

    if let Some(folder) = &seed.promotions_folder {
        if session.folder_contains_subject(folder, marker).await? {
            return Ok(PlacementResult::Promotions);
        }
    }

    Ok(PlacementResult::NotFound)
}
