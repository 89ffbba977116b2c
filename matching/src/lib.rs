//! Matching Engine
//!
//! Donor eligibility matching and the durable donor re-activation
//! scheduler, on top of `registry-core`.
//!
//! # Architecture
//!
//! 1. **Filter**: read-only eligibility pass over the donor records
//!    (availability, blood type / organ, optional radius with
//!    nearest-first ordering)
//! 2. **Persist**: a non-empty match moves the request to Matched through
//!    the registry's lifecycle guard — never through the read path
//! 3. **Re-activate**: a poll loop executes durable 56-day recovery jobs
//!    written at donation completion
//!
//! # Example
//!
//! ```no_run
//! use matching::{Config, MatchingEngine};
//! use registry_core::Registry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> matching::Result<()> {
//!     let config = Config::default();
//!     let registry = Arc::new(Registry::open(registry_core::Config::default())?);
//!     let engine = MatchingEngine::new(registry, config.matching);
//!
//!     // let outcome = engine.match_request(request_id, None, None).await?;
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;

// Re-exports
pub use config::{Config, MatchingConfig, SchedulerConfig};
pub use engine::{DonorMatch, DonorSearch, MatchCriteria, MatchOutcome, MatchingEngine};
pub use error::{Error, Result};
pub use scheduler::ReactivationScheduler;
