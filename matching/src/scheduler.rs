//! Durable donor re-activation scheduler
//!
//! A completed blood donation persists a re-activation job (due 56 days
//! out) in the same atomic batch as the completion itself, so the
//! pending flip survives process restarts. This scheduler polls the job
//! queue and applies each due job through the registry's lifecycle
//! guard; the executor is idempotent, so a crash between apply and
//! acknowledge cannot double-flip a donor.
//!
//! # Design
//!
//! ```text
//! complete_donation(blood) ──┐ (same batch)
//!                            ├─> donation Completed
//!                            └─> job { donor, due_at: +56d }
//!
//! ReactivationScheduler: every poll_interval
//!   due_jobs(now) ──> execute_reactivation(job)
//!                     (guarded: donor.available = true, job removed,
//!                      one atomic batch)
//! ```

use crate::{config::SchedulerConfig, Result};
use chrono::{DateTime, Utc};
use registry_core::Registry;
use std::sync::Arc;
use tracing::{info, warn};

/// Polls for due re-activation jobs and executes them
pub struct ReactivationScheduler {
    /// Registry core
    registry: Arc<Registry>,

    /// Configuration
    config: SchedulerConfig,
}

impl ReactivationScheduler {
    /// Create new scheduler
    pub fn new(registry: Arc<Registry>, config: SchedulerConfig) -> Self {
        Self { registry, config }
    }

    /// Run the poll loop until the task is aborted
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.config.poll_interval_secs,
            "Starting re-activation scheduler"
        );

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            self.config.poll_interval_secs,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.run_due_jobs(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => info!(reactivated = n, "Re-activation pass complete"),
                Err(e) => warn!("Re-activation pass failed: {}", e),
            }
        }
    }

    /// Execute every job due at `now`; returns how many donors flipped.
    ///
    /// Exposed separately so tests and ops tooling can drive a pass
    /// without waiting for the interval.
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> Result<usize> {
        let jobs = self.registry.due_reactivations(now)?;
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut flipped = 0;
        for job in &jobs {
            match self.registry.execute_reactivation(job).await {
                Ok(true) => flipped += 1,
                Ok(false) => {
                    // Already available or donor gone; job cleared either way
                }
                Err(e) => {
                    // Leave the job in the queue for the next pass
                    warn!(donor_id = %job.donor_id, "Re-activation failed: {}", e);
                }
            }
        }

        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::{
        BloodType, Config as RegistryConfig, DonationKind, GeoPoint, NewDonation, NewDonor,
        RECOVERY_WINDOW_DAYS,
    };
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_setup() -> (Arc<ReactivationScheduler>, Arc<Registry>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = RegistryConfig::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let registry = Arc::new(Registry::open(config).unwrap());
        let scheduler = Arc::new(ReactivationScheduler::new(
            registry.clone(),
            SchedulerConfig::default(),
        ));
        (scheduler, registry, temp_dir)
    }

    async fn completed_blood_donation(registry: &Registry) -> Uuid {
        let hospital_id = Uuid::new_v4();
        let donor = registry
            .register_donor(
                Uuid::new_v4(),
                NewDonor {
                    blood_type: BloodType::ONeg,
                    organ_donor: false,
                    organs: vec![],
                    medical_conditions: vec![],
                    medications: vec![],
                    location: GeoPoint::new(0.0, 0.0),
                },
            )
            .await
            .unwrap();
        let donation = registry
            .schedule_donation(
                hospital_id,
                NewDonation {
                    donor_id: donor.donor_id,
                    request_id: None,
                    kind: DonationKind::Blood(BloodType::ONeg),
                    donation_date: chrono::NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        registry
            .complete_donation(hospital_id, donation.donation_id, None)
            .await
            .unwrap();
        donor.donor_id
    }

    #[tokio::test]
    async fn test_nothing_due_before_recovery_window() {
        let (scheduler, registry, _temp) = test_setup();
        let donor_id = completed_blood_donation(&registry).await;

        let flipped = scheduler.run_due_jobs(Utc::now()).await.unwrap();
        assert_eq!(flipped, 0);
        assert!(!registry.get_donor(donor_id).unwrap().available);
    }

    #[tokio::test]
    async fn test_due_job_reactivates_donor_once() {
        let (scheduler, registry, _temp) = test_setup();
        let donor_id = completed_blood_donation(&registry).await;

        let horizon = Utc::now() + chrono::Duration::days(RECOVERY_WINDOW_DAYS + 1);

        let flipped = scheduler.run_due_jobs(horizon).await.unwrap();
        assert_eq!(flipped, 1);
        assert!(registry.get_donor(donor_id).unwrap().available);

        // Second pass finds an empty queue
        let flipped = scheduler.run_due_jobs(horizon).await.unwrap();
        assert_eq!(flipped, 0);
    }

    #[tokio::test]
    async fn test_pass_covers_multiple_donors() {
        let (scheduler, registry, _temp) = test_setup();
        let a = completed_blood_donation(&registry).await;
        let b = completed_blood_donation(&registry).await;

        let horizon = Utc::now() + chrono::Duration::days(RECOVERY_WINDOW_DAYS + 1);
        let flipped = scheduler.run_due_jobs(horizon).await.unwrap();
        assert_eq!(flipped, 2);
        assert!(registry.get_donor(a).unwrap().available);
        assert!(registry.get_donor(b).unwrap().available);
    }
}
