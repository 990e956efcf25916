//! Probe dispatcher
//!
//! Generates a unique marker, embeds it in the subject line, and sends the
//! probe message to every configured seed address through the outbound SMTP
//! relay. The marker in the subject is what the placement checker later
//! searches for.

use lettre::{
    message::{
        header::{ContentType, Header, HeaderName, HeaderValue},
        Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use seedcheck_common::config::{RelayConfig, SeedMailboxConfig};
use seedcheck_common::{DispatchOutcome, Error, Result};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// `X-Seedcheck-Marker` header carried by every probe
#[derive(Debug, Clone)]
struct MarkerHeader(String);

impl Header for MarkerHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Seedcheck-Marker")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Content of a probe message
#[derive(Debug, Clone)]
pub struct ProbeContent {
    pub from: String,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
}

impl ProbeContent {
    /// At least one body variant must be present
    pub fn validate(&self) -> Result<()> {
        if self.html.is_none() && self.text.is_none() {
            return Err(Error::Validation(
                "At least one of html or text content is required".to_string(),
            ));
        }
        if self.from.parse::<Mailbox>().is_err() {
            return Err(Error::Validation(format!(
                "Invalid sender address: {}",
                self.from
            )));
        }
        Ok(())
    }
}

/// Sends probe messages to the seed panel
pub struct ProbeDispatcher {
    relay: RelayConfig,
    /// (provider, seed address) pairs
    seeds: Vec<(String, String)>,
}

impl ProbeDispatcher {
    pub fn new(relay: RelayConfig, panel: &[SeedMailboxConfig]) -> Self {
        let seeds = panel
            .iter()
            .map(|seed| (seed.provider.clone(), seed.address.clone()))
            .collect();
        Self { relay, seeds }
    }

    /// Send the probe to every seed address
    ///
    /// Per-provider failures are collected; only zero successful sends is
    /// an error, since nothing downstream can work without a delivered
    /// probe.
    pub async fn dispatch(&self, content: &ProbeContent) -> Result<DispatchOutcome> {
        if self.seeds.is_empty() {
            return Err(Error::Config(
                "No seed mailboxes configured".to_string(),
            ));
        }

        let marker = generate_marker();
        let subject = marked_subject(&content.subject, &marker);
        let transport = self.build_transport()?;

        let mut message_ids = HashMap::new();
        let mut errors = HashMap::new();

        for (provider, address) in &self.seeds {
            let message = match build_message(content, address, &subject, Some(&marker)) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to build probe for {}: {}", provider, e);
                    errors.insert(provider.clone(), e.to_string());
                    continue;
                }
            };

            match transport.send(message).await {
                Ok(response) => {
                    debug!("Probe accepted by {} relay: {:?}", provider, response.code());
                    message_ids.insert(provider.clone(), outbound_message_id(&marker, provider));
                }
                Err(e) => {
                    warn!("Failed to send probe to {} ({}): {}", provider, address, e);
                    errors.insert(provider.clone(), e.to_string());
                }
            }
        }

        let outcome = DispatchOutcome {
            marker,
            message_ids,
            errors,
        };

        if !outcome.any_sent() {
            return Err(Error::Dispatch(format!(
                "Probe dispatch failed for all {} seed addresses",
                self.seeds.len()
            )));
        }

        Ok(outcome)
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if self.relay.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.relay.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.relay.host)
        };

        let mut builder = builder
            .map_err(|e| Error::Dispatch(format!("Failed to create SMTP transport: {}", e)))?
            .port(self.relay.port);

        if let (Some(username), Some(password)) = (&self.relay.username, &self.relay.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder
            .timeout(Some(Duration::from_secs(self.relay.timeout_secs)))
            .build())
    }
}

/// Unique marker embedded in the probe subject
pub(crate) fn generate_marker() -> String {
    format!("seedcheck-{}", Uuid::new_v4())
}

/// Subject line with the marker appended
pub(crate) fn marked_subject(subject: &str, marker: &str) -> String {
    format!("{} [{}]", subject, marker)
}

fn outbound_message_id(marker: &str, provider: &str) -> String {
    format!("<{}.{}@seedcheck>", marker, provider)
}

/// Build the probe message for one recipient
fn build_message(
    content: &ProbeContent,
    to: &str,
    subject: &str,
    marker: Option<&str>,
) -> Result<Message> {
    let from: Mailbox = content
        .from
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid from address: {}", e)))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| Error::Config(format!("Invalid seed address: {}", e)))?;

    let mut builder = Message::builder().from(from).to(to).subject(subject);
    if let Some(marker) = marker {
        builder = builder.header(MarkerHeader(marker.to_string()));
    }

    let message = match (&content.html, &content.text) {
        (Some(html), Some(text)) => builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(text.clone()))
                .singlepart(SinglePart::html(html.clone())),
        ),
        (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
        (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
        (None, None) => {
            return Err(Error::Validation(
                "At least one of html or text content is required".to_string(),
            ))
        }
    };

    message.map_err(|e| Error::Dispatch(format!("Failed to build probe message: {}", e)))
}

/// Raw RFC 5322 bytes of the probe, as fed to the spam scorer
pub fn build_raw_message(content: &ProbeContent, to: &str) -> Result<Vec<u8>> {
    Ok(build_message(content, to, &content.subject, None)?.formatted())
}
