//! SeedCheck Core - the deliverability evaluation pipeline
//!
//! This crate provides the probe dispatcher, mailbox placement checker,
//! DNS authentication validator, spam scorer adapter, recommendation
//! synthesizer, and the workflow orchestrator that sequences them.

pub mod dns;
pub mod pipeline;
pub mod placement;
pub mod probe;
pub mod recommend;
pub mod spam;
pub mod store;

pub use dns::DnsValidator;
pub use pipeline::TestPipeline;
pub use placement::PlacementChecker;
pub use probe::{ProbeContent, ProbeDispatcher};
pub use recommend::synthesize_recommendations;
pub use spam::SpamChecker;
pub use store::{MemoryTestStore, NewTest, TestOutcome, TestStore};
