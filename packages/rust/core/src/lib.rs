//! Core pipeline orchestration for tenderflow.
//!
//! The three stages (filter, extract, convert) live in their own modules and
//! are sequenced by [`pipeline::Pipeline`], which reports through the
//! [`events::EventSink`] seam.

pub mod convert;
pub mod events;
pub mod extract;
pub mod filter;
pub mod pipeline;
pub mod rate_limit;

#[cfg(test)]
mod testing;

pub use events::{BroadcastSink, EventSink, Reporter, SilentSink};
pub use filter::{ACCEPT_THRESHOLD, Tender, discover_tenders};
pub use pipeline::{Collaborators, Pipeline, PipelineState, RunOutcome, RunSummary};
pub use rate_limit::RateLimiter;
