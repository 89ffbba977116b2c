//! VitaGrid Registry Core
//!
//! Resource ledger and lifecycle guard for the booking and donation
//! workflows.
//!
//! # Architecture
//!
//! - **Resource Ledger**: slot occupancy and donor availability, backed
//!   by RocksDB with atomic multi-record batches
//! - **Lifecycle Guard**: per-resource exclusive sections; every
//!   mutation re-reads state, validates the transition, and commits a
//!   single batch
//! - **Typed rejections**: NotFound / Forbidden / Conflict /
//!   Unprocessable / UpstreamUnavailable, never retried automatically
//!
//! # Invariants
//!
//! - At most one non-cancelled appointment per (doctor, date, time)
//! - Terminal states (Completed, Cancelled) admit no further transition
//! - A donor referenced by a scheduled donation is unavailable
//! - Rejected transitions persist nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod donations;
pub mod error;
pub mod external;
pub mod guard;
pub mod metrics;
pub mod rating;
pub mod registry;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use donations::{
    DonorUpdate, NewDonation, NewDonor, NewRequest, RequestFilter, RequestUpdate,
};
pub use error::{Error, Result};
pub use external::{PaymentGateway, PaymentOutcome};
pub use guard::LifecycleGuard;
pub use metrics::Metrics;
pub use rating::Rating;
pub use registry::Registry;
pub use storage::Storage;
pub use types::{
    Appointment, AppointmentStatus, BloodType, Caller, Doctor, Donation, DonationKind,
    DonationRequest, DonationStatus, Donor, GeoPoint, Organ, ReactivationJob, RequestStatus,
    Role, SlotKey, Urgency, RECOVERY_WINDOW_DAYS,
};
