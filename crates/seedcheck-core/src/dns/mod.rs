//! DNS authentication validator
//!
//! Lints a sending domain's SPF, DKIM, and DMARC records. Unlike a
//! receiving-side verifier this does not evaluate a connecting IP; it
//! fetches the published records and reports configuration issues the
//! domain owner can act on.

mod dkim;
mod dmarc;
mod spf;

pub use dkim::COMMON_DKIM_SELECTORS;

use seedcheck_common::types::DnsValidationResult;
use std::time::Duration;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// Outcome of a TXT lookup, with resolver failure classes kept distinct
#[derive(Debug, Clone)]
pub(crate) enum TxtLookup {
    /// TXT records found, character strings already joined
    Records(Vec<String>),
    /// The name exists but has no TXT data
    NoRecords,
    /// The name does not exist
    NxDomain,
    /// Transport-level failure or timeout
    Failed(String),
}

/// DNS authentication validator
pub struct DnsValidator {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsValidator {
    /// Create a validator with the system default resolver
    pub fn new(timeout_secs: u64) -> Self {
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self {
            resolver,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Create a validator with a custom resolver
    pub fn with_resolver(resolver: TokioAsyncResolver, timeout_secs: u64) -> Self {
        Self {
            resolver,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Validate SPF, DKIM, and DMARC for a domain
    ///
    /// The three sub-checks run concurrently and are failure-isolated: a
    /// resolver error in one surfaces as issues on that mechanism only.
    pub async fn validate(&self, domain: &str, dkim_selector: Option<&str>) -> DnsValidationResult {
        debug!("Validating DNS authentication for {}", domain);

        let (spf, dkim, dmarc) = tokio::join!(
            spf::check(self, domain),
            dkim::check(self, domain, dkim_selector),
            dmarc::check(self, domain),
        );

        DnsValidationResult {
            domain: domain.to_string(),
            spf,
            dkim,
            dmarc,
        }
    }

    /// TXT lookup with timeout and failure classification
    pub(crate) async fn lookup_txt(&self, name: &str) -> TxtLookup {
        let lookup = match tokio::time::timeout(self.timeout, self.resolver.txt_lookup(name)).await
        {
            Ok(result) => result,
            Err(_) => return TxtLookup::Failed("DNS lookup timed out".to_string()),
        };

        match lookup {
            Ok(records) => {
                let texts: Vec<String> = records
                    .iter()
                    .map(|r| {
                        r.txt_data()
                            .iter()
                            .map(|d| String::from_utf8_lossy(d))
                            .collect::<String>()
                    })
                    .collect();
                TxtLookup::Records(texts)
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                    if *response_code == ResponseCode::NXDomain {
                        TxtLookup::NxDomain
                    } else {
                        TxtLookup::NoRecords
                    }
                }
                _ => TxtLookup::Failed(e.to_string()),
            },
        }
    }
}

/// Check a bare domain name: no scheme, no path, at least one dot,
/// label characters only
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
