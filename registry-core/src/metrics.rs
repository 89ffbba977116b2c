//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `registry_bookings_total` - Appointments booked
//! - `registry_booking_conflicts_total` - Bookings rejected on an occupied slot
//! - `registry_transitions_total` - Lifecycle transitions committed
//! - `registry_rejections_total` - Guarded sections ending in rejection
//! - `registry_guard_section_seconds` - Time spent in exclusive sections
//! - `registry_reactivations_total` - Donors re-activated by the scheduler

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Appointments booked
    pub bookings_total: IntCounter,

    /// Bookings rejected on an occupied slot
    pub booking_conflicts_total: IntCounter,

    /// Lifecycle transitions committed
    pub transitions_total: IntCounter,

    /// Guarded sections ending in rejection
    pub rejections_total: IntCounter,

    /// Time spent acquiring and holding an exclusive section
    pub guard_section: Histogram,

    /// Donors re-activated by the scheduler
    pub reactivations_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let bookings_total = IntCounter::with_opts(Opts::new(
            "registry_bookings_total",
            "Appointments booked",
        ))?;
        registry.register(Box::new(bookings_total.clone()))?;

        let booking_conflicts_total = IntCounter::with_opts(Opts::new(
            "registry_booking_conflicts_total",
            "Bookings rejected on an occupied slot",
        ))?;
        registry.register(Box::new(booking_conflicts_total.clone()))?;

        let transitions_total = IntCounter::with_opts(Opts::new(
            "registry_transitions_total",
            "Lifecycle transitions committed",
        ))?;
        registry.register(Box::new(transitions_total.clone()))?;

        let rejections_total = IntCounter::with_opts(Opts::new(
            "registry_rejections_total",
            "Guarded sections ending in rejection",
        ))?;
        registry.register(Box::new(rejections_total.clone()))?;

        let guard_section = Histogram::with_opts(
            HistogramOpts::new(
                "registry_guard_section_seconds",
                "Time spent acquiring and holding an exclusive section",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(guard_section.clone()))?;

        let reactivations_total = IntCounter::with_opts(Opts::new(
            "registry_reactivations_total",
            "Donors re-activated by the scheduler",
        ))?;
        registry.register(Box::new(reactivations_total.clone()))?;

        Ok(Self {
            bookings_total,
            booking_conflicts_total,
            transitions_total,
            rejections_total,
            guard_section,
            reactivations_total,
            registry,
        })
    }
}
