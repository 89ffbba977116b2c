//! Main registry orchestration layer
//!
//! Ties together storage, the lifecycle guard, and metrics into the
//! high-level API for booking and donation workflows. Every mutation
//! runs inside a guarded section: re-read current state, validate the
//! transition, stage all effects, commit one atomic batch.
//!
//! # Example
//!
//! ```no_run
//! use registry_core::{Config, Registry};
//!
//! #[tokio::main]
//! async fn main() -> registry_core::Result<()> {
//!     let config = Config::default();
//!     let registry = Registry::open(config)?;
//!
//!     // let appointment = registry.book_appointment(..).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    external::{PaymentGateway, PaymentOutcome},
    guard::LifecycleGuard,
    metrics::Metrics,
    types::{
        Appointment, AppointmentStatus, Caller, Doctor, SlotKey,
    },
    Config, Error, Result, Storage,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Main registry interface
pub struct Registry {
    /// Storage backend
    pub(crate) storage: Arc<Storage>,

    /// Per-resource exclusive sections
    pub(crate) guard: LifecycleGuard,

    /// Prometheus metrics
    pub(crate) metrics: Metrics,
}

impl Registry {
    /// Open registry with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;

        Ok(Self {
            storage,
            guard: LifecycleGuard::new(),
            metrics,
        })
    }

    /// Metrics handle (for exporters)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Doctor operations

    /// Register a doctor
    pub fn register_doctor(
        &self,
        user_id: Uuid,
        name: impl Into<String>,
        speciality: impl Into<String>,
        fee: Decimal,
    ) -> Result<Doctor> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Unprocessable("Doctor name is required".to_string()));
        }
        if fee < Decimal::ZERO {
            return Err(Error::Unprocessable("Fee cannot be negative".to_string()));
        }

        let doctor = Doctor {
            doctor_id: Uuid::now_v7(),
            user_id,
            name,
            speciality: speciality.into(),
            available: true,
            fee,
            created_at: Utc::now(),
        };

        let mut batch = self.storage.batch();
        self.storage.stage_doctor(&mut batch, &doctor)?;
        self.storage.commit(batch)?;

        tracing::info!(doctor_id = %doctor.doctor_id, "Doctor registered");
        Ok(doctor)
    }

    /// Get doctor by id
    pub fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor> {
        self.storage.get_doctor(doctor_id)
    }

    /// List all doctors
    pub fn list_doctors(&self) -> Result<Vec<Doctor>> {
        self.storage.list_doctors()
    }

    /// Flip a doctor's availability.
    ///
    /// The true→false flip is rejected while the doctor still has
    /// pending appointments in the future, so existing bookings are
    /// never orphaned.
    pub async fn set_doctor_availability(
        &self,
        doctor_id: Uuid,
        available: bool,
    ) -> Result<Doctor> {
        self.guarded(doctor_id, || {
            let mut doctor = self.storage.get_doctor(doctor_id)?;

            if !available {
                let now = Utc::now();
                let pending_future = self
                    .storage
                    .appointments_for_doctor(doctor_id)?
                    .into_iter()
                    .any(|a| {
                        a.status == AppointmentStatus::Pending
                            && a.slot_date.and_time(a.slot_time).and_utc() > now
                    });
                if pending_future {
                    return Err(Error::Conflict(
                        "Cannot change availability: you have pending appointments"
                            .to_string(),
                    ));
                }
            }

            doctor.available = available;

            let mut write = self.storage.batch();
            self.storage.stage_doctor(&mut write, &doctor)?;
            self.storage.commit(write)?;

            tracing::info!(doctor_id = %doctor_id, available, "Doctor availability changed");
            self.metrics.transitions_total.inc();
            Ok(doctor)
        })
        .await
    }

    // Slot ledger

    /// Occupant of a slot, if any
    pub fn slot_occupant(&self, slot: &SlotKey) -> Result<Option<Uuid>> {
        self.storage.get_slot(slot)
    }

    /// Release a slot regardless of holder (admin repair path).
    ///
    /// Idempotent; releasing a free slot is a no-op.
    pub async fn release_slot(&self, slot: SlotKey) -> Result<()> {
        self.guarded(slot.doctor_id, || {
            let mut write = self.storage.batch();
            self.storage.clear_slot(&mut write, &slot)?;
            self.storage.commit(write)
        })
        .await
    }

    // Appointment operations

    /// Book an appointment.
    ///
    /// Occupies the (doctor, date, time) slot and creates the Pending
    /// appointment in one atomic batch. Serialized per doctor, so two
    /// concurrent bookings of the same slot cannot both succeed.
    pub async fn book_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Appointment> {
        self.guarded(doctor_id, || {
            let doctor = self.storage.get_doctor(doctor_id)?;
            if !doctor.available {
                return Err(Error::Conflict("Doctor not available".to_string()));
            }

            let slot = SlotKey::new(doctor_id, date, time);
            if self.storage.get_slot(&slot)?.is_some() {
                self.metrics.booking_conflicts_total.inc();
                return Err(Error::Conflict("Slot not available".to_string()));
            }

            let now = Utc::now();
            let appointment = Appointment {
                appointment_id: Uuid::now_v7(),
                patient_id,
                doctor_id,
                slot_date: date,
                slot_time: time,
                amount: doctor.fee,
                status: AppointmentStatus::Pending,
                payment_confirmed: false,
                created_at: now,
                updated_at: now,
            };

            let mut write = self.storage.batch();
            self.storage.stage_appointment(&mut write, &appointment)?;
            self.storage
                .stage_slot(&mut write, &slot, appointment.appointment_id)?;
            self.storage.commit(write)?;

            tracing::info!(
                appointment_id = %appointment.appointment_id,
                doctor_id = %doctor_id,
                slot = %slot,
                "Appointment booked"
            );
            self.metrics.bookings_total.inc();
            Ok(appointment)
        })
        .await
    }

    /// Cancel an appointment.
    ///
    /// Either party (or an admin) may cancel. Releases the slot in the
    /// same atomic batch, so the tuple becomes re-bookable exactly when
    /// the cancellation is visible.
    pub async fn cancel_appointment(
        &self,
        caller: Caller,
        appointment_id: Uuid,
    ) -> Result<Appointment> {
        self.transition_appointment(caller, appointment_id, AppointmentStatus::Cancelled)
            .await
    }

    /// Complete an appointment. Either party (or an admin) may complete.
    /// The slot stays consumed.
    pub async fn complete_appointment(
        &self,
        caller: Caller,
        appointment_id: Uuid,
    ) -> Result<Appointment> {
        self.transition_appointment(caller, appointment_id, AppointmentStatus::Completed)
            .await
    }

    async fn transition_appointment(
        &self,
        caller: Caller,
        appointment_id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment> {
        self.guarded(appointment_id, || {
            let mut appointment = self.storage.get_appointment(appointment_id)?;

            if !appointment.is_party(&caller) {
                return Err(Error::Forbidden(
                    "Not authorized to modify this appointment".to_string(),
                ));
            }
            if !appointment.status.can_transition_to(next) {
                return Err(Error::Conflict(format!(
                    "Appointment already {:?}",
                    appointment.status
                )));
            }

            appointment.status = next;
            appointment.updated_at = Utc::now();

            let mut write = self.storage.batch();
            self.storage.stage_appointment(&mut write, &appointment)?;

            if next == AppointmentStatus::Cancelled {
                // Release only if this appointment still holds the slot;
                // after cancel + re-book the tuple belongs to someone else.
                let slot = appointment.slot();
                if self.storage.get_slot(&slot)? == Some(appointment_id) {
                    self.storage.clear_slot(&mut write, &slot)?;
                }
            }

            self.storage.commit(write)?;

            tracing::info!(
                appointment_id = %appointment_id,
                status = ?next,
                "Appointment transitioned"
            );
            self.metrics.transitions_total.inc();
            Ok(appointment)
        })
        .await
    }

    /// Verify payment for an appointment against the injected gateway
    /// and record the confirmation.
    ///
    /// Returns the gateway's verdict; only `Paid` is persisted. A
    /// cancelled appointment cannot be paid for.
    pub async fn confirm_payment(
        &self,
        gateway: &dyn PaymentGateway,
        appointment_id: Uuid,
        order_ref: &str,
    ) -> Result<PaymentOutcome> {
        self.guarded(appointment_id, || {
            let mut appointment = self.storage.get_appointment(appointment_id)?;

            if appointment.status == AppointmentStatus::Cancelled {
                return Err(Error::Conflict(
                    "Appointment cancelled or not found".to_string(),
                ));
            }

            let outcome = gateway.verify_order(order_ref)?;
            if outcome == PaymentOutcome::Paid {
                appointment.payment_confirmed = true;
                appointment.updated_at = Utc::now();

                let mut write = self.storage.batch();
                self.storage.stage_appointment(&mut write, &appointment)?;
                self.storage.commit(write)?;

                tracing::info!(appointment_id = %appointment_id, "Payment confirmed");
            }
            Ok(outcome)
        })
        .await
    }

    /// Get appointment by id
    pub fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment> {
        self.storage.get_appointment(appointment_id)
    }

    /// All appointments for a doctor
    pub fn appointments_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>> {
        self.storage.appointments_for_doctor(doctor_id)
    }

    /// All appointments for a patient
    pub fn appointments_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>> {
        self.storage.appointments_for_patient(patient_id)
    }

    // Guard plumbing

    /// Run a closure in the exclusive section for one resource,
    /// recording section time and rejection counts.
    pub(crate) async fn guarded<T>(
        &self,
        resource_id: Uuid,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let timer = self.metrics.guard_section.start_timer();
        let result = self.guard.with_exclusive(resource_id, f).await;
        timer.observe_duration();

        if let Err(e) = &result {
            if e.is_rejection() {
                self.metrics.rejections_total.inc();
                tracing::warn!(resource_id = %resource_id, error = %e, "Transition rejected");
            }
        }
        result
    }

    /// Like [`Registry::guarded`] for the two entity pairs that commit
    /// together (appointment+slot owner, donation+donor).
    pub(crate) async fn guarded_pair<T>(
        &self,
        a: Uuid,
        b: Uuid,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let timer = self.metrics.guard_section.start_timer();
        let result = self.guard.with_exclusive_pair(a, b, f).await;
        timer.observe_duration();

        if let Err(e) = &result {
            if e.is_rejection() {
                self.metrics.rejections_total.inc();
                tracing::warn!(resource_a = %a, resource_b = %b, error = %e, "Transition rejected");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::testing::{DownGateway, FixedGateway};
    use crate::types::Role;
    use tempfile::TempDir;

    fn test_registry() -> (Arc<Registry>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Arc::new(Registry::open(config).unwrap()), temp_dir)
    }

    fn slot_at(h: u32) -> (NaiveDate, NaiveTime) {
        (
            NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
        )
    }

    async fn test_doctor(registry: &Registry) -> Doctor {
        registry
            .register_doctor(Uuid::new_v4(), "Dr. Vale", "cardiology", Decimal::new(5000, 2))
            .unwrap()
    }

    #[tokio::test]
    async fn test_book_and_double_book() {
        let (registry, _temp) = test_registry();
        let doctor = test_doctor(&registry).await;
        let (date, time) = slot_at(10);

        let appointment = registry
            .book_appointment(Uuid::new_v4(), doctor.doctor_id, date, time)
            .await
            .unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.amount, doctor.fee);

        // Second booking of the same tuple must conflict
        let second = registry
            .book_appointment(Uuid::new_v4(), doctor.doctor_id, date, time)
            .await;
        match second {
            Err(Error::Conflict(msg)) => assert_eq!(msg, "Slot not available"),
            other => panic!("expected Conflict, got {:?}", other.map(|a| a.appointment_id)),
        }

        // A different time is fine
        let (_, other_time) = slot_at(11);
        registry
            .book_appointment(Uuid::new_v4(), doctor.doctor_id, date, other_time)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_book_unknown_or_unavailable_doctor() {
        let (registry, _temp) = test_registry();
        let (date, time) = slot_at(10);

        let missing = registry
            .book_appointment(Uuid::new_v4(), Uuid::new_v4(), date, time)
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        let doctor = test_doctor(&registry).await;
        registry
            .set_doctor_availability(doctor.doctor_id, false)
            .await
            .unwrap();
        let unavailable = registry
            .book_appointment(Uuid::new_v4(), doctor.doctor_id, date, time)
            .await;
        assert!(matches!(unavailable, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_concurrent_bookings_single_winner() {
        let (registry, _temp) = test_registry();
        let doctor = test_doctor(&registry).await;
        let (date, time) = slot_at(10);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let registry = registry.clone();
            let doctor_id = doctor.doctor_id;
            handles.push(tokio::spawn(async move {
                registry
                    .book_appointment(Uuid::new_v4(), doctor_id, date, time)
                    .await
            }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(Error::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(conflicts, 11);
    }

    #[tokio::test]
    async fn test_cancel_releases_slot_for_rebooking() {
        let (registry, _temp) = test_registry();
        let doctor = test_doctor(&registry).await;
        let (date, time) = slot_at(10);
        let patient = Uuid::new_v4();

        let appointment = registry
            .book_appointment(patient, doctor.doctor_id, date, time)
            .await
            .unwrap();

        let caller = Caller::new(patient, Role::Patient);
        let cancelled = registry
            .cancel_appointment(caller, appointment.appointment_id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        let slot = SlotKey::new(doctor.doctor_id, date, time);
        assert_eq!(registry.slot_occupant(&slot).unwrap(), None);

        // Re-booking the freed tuple succeeds
        registry
            .book_appointment(Uuid::new_v4(), doctor.doctor_id, date, time)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_terminal_appointment_rejects_transitions() {
        let (registry, _temp) = test_registry();
        let doctor = test_doctor(&registry).await;
        let (date, time) = slot_at(10);
        let patient = Uuid::new_v4();

        let appointment = registry
            .book_appointment(patient, doctor.doctor_id, date, time)
            .await
            .unwrap();

        // Parties are matched on the doctor record id
        let doc_caller = Caller::new(doctor.doctor_id, Role::Doctor);
        registry
            .complete_appointment(doc_caller, appointment.appointment_id)
            .await
            .unwrap();

        // Completing or cancelling again must conflict and change nothing
        let again = registry
            .cancel_appointment(doc_caller, appointment.appointment_id)
            .await;
        assert!(matches!(again, Err(Error::Conflict(_))));

        let stored = registry.get_appointment(appointment.appointment_id).unwrap();
        assert_eq!(stored.status, AppointmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_stranger_cannot_touch_appointment() {
        let (registry, _temp) = test_registry();
        let doctor = test_doctor(&registry).await;
        let (date, time) = slot_at(10);

        let appointment = registry
            .book_appointment(Uuid::new_v4(), doctor.doctor_id, date, time)
            .await
            .unwrap();

        let stranger = Caller::new(Uuid::new_v4(), Role::Patient);
        let denied = registry
            .cancel_appointment(stranger, appointment.appointment_id)
            .await;
        assert!(matches!(denied, Err(Error::Forbidden(_))));

        // Admin passes the ownership check
        let admin = Caller::new(Uuid::new_v4(), Role::Admin);
        registry
            .cancel_appointment(admin, appointment.appointment_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_availability_flip_blocked_by_pending_future() {
        let (registry, _temp) = test_registry();
        let doctor = test_doctor(&registry).await;
        let (date, time) = slot_at(10);
        let patient = Uuid::new_v4();

        let appointment = registry
            .book_appointment(patient, doctor.doctor_id, date, time)
            .await
            .unwrap();

        let blocked = registry
            .set_doctor_availability(doctor.doctor_id, false)
            .await;
        match blocked {
            Err(Error::Conflict(msg)) => assert!(msg.contains("pending appointments")),
            other => panic!("expected Conflict, got {:?}", other.map(|d| d.doctor_id)),
        }

        // After cancelling the pending booking the flip goes through
        registry
            .cancel_appointment(
                Caller::new(patient, Role::Patient),
                appointment.appointment_id,
            )
            .await
            .unwrap();
        let doctor = registry
            .set_doctor_availability(doctor.doctor_id, false)
            .await
            .unwrap();
        assert!(!doctor.available);

        // And the flip back is unconditional
        let doctor = registry
            .set_doctor_availability(doctor.doctor_id, true)
            .await
            .unwrap();
        assert!(doctor.available);
    }

    #[tokio::test]
    async fn test_confirm_payment() {
        let (registry, _temp) = test_registry();
        let doctor = test_doctor(&registry).await;
        let (date, time) = slot_at(10);
        let patient = Uuid::new_v4();

        let appointment = registry
            .book_appointment(patient, doctor.doctor_id, date, time)
            .await
            .unwrap();

        // Unpaid verdict is reported, nothing persisted
        let unpaid = registry
            .confirm_payment(
                &FixedGateway(PaymentOutcome::Unpaid),
                appointment.appointment_id,
                "order-1",
            )
            .await
            .unwrap();
        assert_eq!(unpaid, PaymentOutcome::Unpaid);
        assert!(!registry
            .get_appointment(appointment.appointment_id)
            .unwrap()
            .payment_confirmed);

        // Gateway outage surfaces as UpstreamUnavailable
        let down = registry
            .confirm_payment(&DownGateway, appointment.appointment_id, "order-1")
            .await;
        assert!(matches!(down, Err(Error::UpstreamUnavailable(_))));

        // Paid verdict persists the flag
        let paid = registry
            .confirm_payment(
                &FixedGateway(PaymentOutcome::Paid),
                appointment.appointment_id,
                "order-1",
            )
            .await
            .unwrap();
        assert_eq!(paid, PaymentOutcome::Paid);
        assert!(registry
            .get_appointment(appointment.appointment_id)
            .unwrap()
            .payment_confirmed);

        // Cancelled appointments cannot be paid for
        registry
            .cancel_appointment(
                Caller::new(patient, Role::Patient),
                appointment.appointment_id,
            )
            .await
            .unwrap();
        let cancelled = registry
            .confirm_payment(
                &FixedGateway(PaymentOutcome::Paid),
                appointment.appointment_id,
                "order-1",
            )
            .await;
        assert!(matches!(cancelled, Err(Error::Conflict(_))));
    }
}
