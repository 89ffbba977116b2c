//! Donor, donation-request, and donation lifecycle operations
//!
//! Same shape as the appointment side: every mutation re-reads state
//! inside a guarded section, validates the transition, and commits one
//! atomic batch. A donation and its donor commit together (availability
//! flips and organ retirement ride the donation's batch); the linked
//! request transitions in its own section afterwards, so two writers can
//! never race on the same request.

use crate::{
    types::{
        BloodType, Caller, Donation, DonationKind, DonationRequest, DonationStatus, Donor,
        GeoPoint, Organ, ReactivationJob, RequestStatus, Urgency, RECOVERY_WINDOW_DAYS,
    },
    Error, Registry, Result,
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

/// Input for donor registration
#[derive(Debug, Clone)]
pub struct NewDonor {
    /// ABO/Rh blood type
    pub blood_type: BloodType,
    /// Registering as an organ donor
    pub organ_donor: bool,
    /// Organs on offer (ignored unless `organ_donor`)
    pub organs: Vec<Organ>,
    /// Self-reported conditions
    pub medical_conditions: Vec<String>,
    /// Current medications
    pub medications: Vec<String>,
    /// Home coordinate
    pub location: GeoPoint,
}

/// Partial donor profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct DonorUpdate {
    /// New blood type
    pub blood_type: Option<BloodType>,
    /// New organ-donor flag
    pub organ_donor: Option<bool>,
    /// Replacement organ set
    pub organs: Option<Vec<Organ>>,
    /// Replacement conditions
    pub medical_conditions: Option<Vec<String>>,
    /// Replacement medications
    pub medications: Option<Vec<String>>,
    /// New home coordinate
    pub location: Option<GeoPoint>,
}

/// Input for creating a donation request
#[derive(Debug, Clone)]
pub struct NewRequest {
    /// Blood type or organ needed
    pub kind: DonationKind,
    /// Urgency; drives expiry
    pub urgency: Urgency,
    /// Free-text condition summary
    pub patient_condition: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
}

/// Partial request update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct RequestUpdate {
    /// New urgency (recomputes expiry from creation time)
    pub urgency: Option<Urgency>,
    /// New condition summary
    pub patient_condition: Option<String>,
    /// New notes
    pub notes: Option<String>,
}

/// Input for scheduling a donation
#[derive(Debug, Clone)]
pub struct NewDonation {
    /// Giving donor
    pub donor_id: Uuid,
    /// Request being fulfilled, if any
    pub request_id: Option<Uuid>,
    /// Blood type or organ donated
    pub kind: DonationKind,
    /// Scheduled date
    pub donation_date: NaiveDate,
    /// Free-text notes
    pub notes: Option<String>,
}

/// Filter for open-request listings
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// Only blood requests of this type
    pub blood_type: Option<BloodType>,
    /// Only organ requests for this organ
    pub organ: Option<Organ>,
    /// Only this urgency
    pub urgency: Option<Urgency>,
}

impl RequestFilter {
    fn matches(&self, request: &DonationRequest) -> bool {
        if let Some(bt) = self.blood_type {
            if request.kind != DonationKind::Blood(bt) {
                return false;
            }
        }
        if let Some(organ) = self.organ {
            if request.kind != DonationKind::Organ(organ) {
                return false;
            }
        }
        if let Some(urgency) = self.urgency {
            if request.urgency != urgency {
                return false;
            }
        }
        true
    }
}

impl Registry {
    // Donor operations

    /// Register a donor profile for a user.
    ///
    /// A user carries at most one donor profile; a second registration
    /// is a `Conflict`. Organs are only retained for organ donors.
    pub async fn register_donor(&self, user_id: Uuid, new: NewDonor) -> Result<Donor> {
        self.guarded(user_id, || {
            if self.storage.donor_for_user(user_id)?.is_some() {
                return Err(Error::Conflict(
                    "User is already registered as a donor".to_string(),
                ));
            }

            let donor = Donor {
                donor_id: Uuid::now_v7(),
                user_id,
                blood_type: new.blood_type,
                organ_donor: new.organ_donor,
                organs: if new.organ_donor { new.organs } else { vec![] },
                medical_conditions: new.medical_conditions,
                medications: new.medications,
                available: true,
                last_donated: None,
                location: new.location,
                created_at: Utc::now(),
            };

            let mut write = self.storage.batch();
            self.storage.stage_donor(&mut write, &donor)?;
            self.storage.commit(write)?;

            tracing::info!(donor_id = %donor.donor_id, "Donor registered");
            Ok(donor)
        })
        .await
    }

    /// Update the caller's donor profile
    pub async fn update_donor_profile(
        &self,
        caller: Caller,
        update: DonorUpdate,
    ) -> Result<Donor> {
        let donor = self
            .storage
            .donor_for_user(caller.user_id)?
            .ok_or_else(|| Error::NotFound("Donor profile not found".to_string()))?;

        self.guarded(donor.donor_id, || {
            let mut donor = self.storage.get_donor(donor.donor_id)?;

            if let Some(bt) = update.blood_type {
                donor.blood_type = bt;
            }
            if let Some(flag) = update.organ_donor {
                donor.organ_donor = flag;
            }
            if let Some(organs) = update.organs {
                donor.organs = organs;
            }
            if !donor.organ_donor {
                donor.organs.clear();
            }
            if let Some(conditions) = update.medical_conditions {
                donor.medical_conditions = conditions;
            }
            if let Some(medications) = update.medications {
                donor.medications = medications;
            }
            if let Some(location) = update.location {
                donor.location = location;
            }

            let mut write = self.storage.batch();
            self.storage.stage_donor(&mut write, &donor)?;
            self.storage.commit(write)?;

            Ok(donor)
        })
        .await
    }

    /// Direct availability set, used by lifecycle transitions, the
    /// re-activation scheduler, and the donor's own toggle.
    pub async fn set_donor_availability(
        &self,
        donor_id: Uuid,
        available: bool,
    ) -> Result<Donor> {
        self.guarded(donor_id, || {
            let mut donor = self.storage.get_donor(donor_id)?;
            donor.available = available;

            let mut write = self.storage.batch();
            self.storage.stage_donor(&mut write, &donor)?;
            self.storage.commit(write)?;

            tracing::info!(donor_id = %donor_id, available, "Donor availability set");
            Ok(donor)
        })
        .await
    }

    /// Get donor by id
    pub fn get_donor(&self, donor_id: Uuid) -> Result<Donor> {
        self.storage.get_donor(donor_id)
    }

    /// Donor profile registered by a user, if any
    pub fn donor_for_user(&self, user_id: Uuid) -> Result<Option<Donor>> {
        self.storage.donor_for_user(user_id)
    }

    /// All donors (the matching engine filters in memory)
    pub fn list_donors(&self) -> Result<Vec<Donor>> {
        self.storage.list_donors()
    }

    // Donation request operations

    /// Create a donation request; expiry derives from urgency.
    pub fn create_request(&self, hospital_id: Uuid, new: NewRequest) -> Result<DonationRequest> {
        let now = Utc::now();
        let request = DonationRequest {
            request_id: Uuid::now_v7(),
            hospital_id,
            kind: new.kind,
            urgency: new.urgency,
            status: RequestStatus::Open,
            matched_donors: vec![],
            patient_condition: new.patient_condition,
            notes: new.notes,
            expires_at: now + new.urgency.expiry_window(),
            created_at: now,
        };

        let mut write = self.storage.batch();
        self.storage.stage_request(&mut write, &request)?;
        self.storage.commit(write)?;

        tracing::info!(
            request_id = %request.request_id,
            kind = request.kind.name(),
            urgency = ?request.urgency,
            "Donation request created"
        );
        Ok(request)
    }

    /// Update a request's mutable fields. Hospital-owner only; terminal
    /// requests cannot be edited.
    pub async fn update_request(
        &self,
        caller: Caller,
        request_id: Uuid,
        update: RequestUpdate,
    ) -> Result<DonationRequest> {
        self.guarded(request_id, || {
            let mut request = self.storage.get_request(request_id)?;

            if !caller.is_admin() && caller.user_id != request.hospital_id {
                return Err(Error::Forbidden(
                    "Not authorized to update this request".to_string(),
                ));
            }
            if request.status.is_terminal() {
                return Err(Error::Conflict(format!(
                    "Request already {:?}",
                    request.status
                )));
            }

            if let Some(urgency) = update.urgency {
                request.urgency = urgency;
                request.expires_at = request.created_at + urgency.expiry_window();
            }
            if let Some(condition) = update.patient_condition {
                request.patient_condition = Some(condition);
            }
            if let Some(notes) = update.notes {
                request.notes = Some(notes);
            }

            let mut write = self.storage.batch();
            self.storage.stage_request(&mut write, &request)?;
            self.storage.commit(write)?;

            Ok(request)
        })
        .await
    }

    /// Cancel a request (hospital-owner or admin)
    pub async fn cancel_request(
        &self,
        caller: Caller,
        request_id: Uuid,
    ) -> Result<DonationRequest> {
        self.transition_request(caller, request_id, RequestStatus::Cancelled)
            .await
    }

    /// Complete a request (hospital-owner or admin)
    pub async fn complete_request(
        &self,
        caller: Caller,
        request_id: Uuid,
    ) -> Result<DonationRequest> {
        self.transition_request(caller, request_id, RequestStatus::Completed)
            .await
    }

    async fn transition_request(
        &self,
        caller: Caller,
        request_id: Uuid,
        next: RequestStatus,
    ) -> Result<DonationRequest> {
        self.guarded(request_id, || {
            let mut request = self.storage.get_request(request_id)?;

            if !caller.is_admin() && caller.user_id != request.hospital_id {
                return Err(Error::Forbidden(
                    "Not authorized to modify this request".to_string(),
                ));
            }
            if !request.status.can_transition_to(next) {
                return Err(Error::Conflict(format!(
                    "Request already {:?}",
                    request.status
                )));
            }

            request.status = next;

            let mut write = self.storage.batch();
            self.storage.stage_request(&mut write, &request)?;
            self.storage.commit(write)?;

            tracing::info!(request_id = %request_id, status = ?next, "Request transitioned");
            self.metrics.transitions_total.inc();
            Ok(request)
        })
        .await
    }

    /// Store a successful match: request → Matched with the donor set.
    ///
    /// Rejected once the request is terminal; re-matching an already
    /// Matched request replaces the stored donor set.
    pub async fn mark_request_matched(
        &self,
        request_id: Uuid,
        donor_ids: Vec<Uuid>,
    ) -> Result<DonationRequest> {
        self.guarded(request_id, || {
            let mut request = self.storage.get_request(request_id)?;

            if request.status.is_terminal() {
                return Err(Error::Conflict(format!(
                    "Request already {:?}",
                    request.status
                )));
            }

            request.status = RequestStatus::Matched;
            request.matched_donors = donor_ids;

            let mut write = self.storage.batch();
            self.storage.stage_request(&mut write, &request)?;
            self.storage.commit(write)?;

            tracing::info!(
                request_id = %request_id,
                matched = request.matched_donors.len(),
                "Request matched"
            );
            self.metrics.transitions_total.inc();
            Ok(request)
        })
        .await
    }

    /// Get request by id
    pub fn get_request(&self, request_id: Uuid) -> Result<DonationRequest> {
        self.storage.get_request(request_id)
    }

    /// All requests created by a hospital, newest first
    pub fn requests_for_hospital(&self, hospital_id: Uuid) -> Result<Vec<DonationRequest>> {
        let mut requests = self.storage.requests_for_hospital(hospital_id)?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Open, unexpired requests matching the filter; most urgent first,
    /// then newest.
    pub fn open_requests(&self, filter: &RequestFilter) -> Result<Vec<DonationRequest>> {
        let now = Utc::now();
        let mut requests: Vec<DonationRequest> = self
            .storage
            .list_requests()?
            .into_iter()
            .filter(|r| {
                r.status == RequestStatus::Open && !r.is_expired(now) && filter.matches(r)
            })
            .collect();
        requests.sort_by(|a, b| {
            b.urgency
                .cmp(&a.urgency)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(requests)
    }

    // Donation operations

    /// Schedule a donation.
    ///
    /// The donor flips unavailable and `last_donated` is stamped in the
    /// donation's batch. A linked request must belong to the scheduling
    /// hospital and carry the same kind; it moves to Matched in its own
    /// guarded section afterwards.
    pub async fn schedule_donation(
        &self,
        hospital_id: Uuid,
        new: NewDonation,
    ) -> Result<Donation> {
        let donation = self
            .guarded(new.donor_id, || {
                let mut donor = self.storage.get_donor(new.donor_id)?;
                if !donor.available {
                    return Err(Error::Conflict("Donor is not available".to_string()));
                }

                if let Some(request_id) = new.request_id {
                    let request = self.storage.get_request(request_id)?;
                    if request.hospital_id != hospital_id {
                        return Err(Error::Forbidden(
                            "Not authorized to schedule donations for this request"
                                .to_string(),
                        ));
                    }
                    if request.status.is_terminal() {
                        return Err(Error::Conflict(format!(
                            "Request already {:?}",
                            request.status
                        )));
                    }
                    if request.kind != new.kind {
                        return Err(Error::Unprocessable(
                            "Donation kind does not match the request".to_string(),
                        ));
                    }
                }

                let donation = Donation {
                    donation_id: Uuid::now_v7(),
                    donor_id: new.donor_id,
                    request_id: new.request_id,
                    hospital_id,
                    kind: new.kind,
                    status: DonationStatus::Scheduled,
                    donation_date: new.donation_date,
                    notes: new.notes.unwrap_or_default(),
                    created_at: Utc::now(),
                };

                donor.available = false;
                donor.last_donated = Some(new.donation_date);

                let mut write = self.storage.batch();
                self.storage.stage_donation(&mut write, &donation)?;
                self.storage.stage_donor(&mut write, &donor)?;
                self.storage.commit(write)?;

                tracing::info!(
                    donation_id = %donation.donation_id,
                    donor_id = %donation.donor_id,
                    kind = donation.kind.name(),
                    "Donation scheduled"
                );
                self.metrics.transitions_total.inc();
                Ok(donation)
            })
            .await?;

        if let Some(request_id) = donation.request_id {
            self.note_request_matched(request_id, donation.donor_id)
                .await?;
        }

        Ok(donation)
    }

    /// Complete a donation (receiving hospital only).
    ///
    /// Blood: a durable re-activation job for 56 days out commits with
    /// the completion. Organ: the organ leaves the donor's offer set in
    /// the same batch; availability stays false.
    pub async fn complete_donation(
        &self,
        hospital_id: Uuid,
        donation_id: Uuid,
        notes: Option<String>,
    ) -> Result<Donation> {
        // donor_id is immutable on the donation, safe to read outside
        let donor_id = self.storage.get_donation(donation_id)?.donor_id;

        let donation = self
            .guarded_pair(donation_id, donor_id, || {
                let mut donation = self.storage.get_donation(donation_id)?;

                if donation.hospital_id != hospital_id {
                    return Err(Error::Forbidden(
                        "Not authorized to update this donation".to_string(),
                    ));
                }
                if !donation.status.can_transition_to(DonationStatus::Completed) {
                    return Err(Error::Conflict(format!(
                        "Donation already {:?}",
                        donation.status
                    )));
                }

                donation.status = DonationStatus::Completed;
                if let Some(extra) = notes {
                    if !donation.notes.is_empty() {
                        donation.notes.push('\n');
                    }
                    donation.notes.push_str(&extra);
                }

                let mut write = self.storage.batch();
                self.storage.stage_donation(&mut write, &donation)?;

                match donation.kind {
                    DonationKind::Blood(_) => {
                        let job = ReactivationJob {
                            job_id: Uuid::now_v7(),
                            donor_id: donation.donor_id,
                            donation_id: donation.donation_id,
                            due_at: Utc::now()
                                + chrono::Duration::days(RECOVERY_WINDOW_DAYS),
                        };
                        self.storage.stage_job(&mut write, &job)?;
                        tracing::info!(
                            donor_id = %donation.donor_id,
                            due_at = %job.due_at,
                            "Recovery window started"
                        );
                    }
                    DonationKind::Organ(organ) => {
                        let mut donor = self.storage.get_donor(donation.donor_id)?;
                        donor.retire_organ(organ);
                        self.storage.stage_donor(&mut write, &donor)?;
                    }
                }

                self.storage.commit(write)?;

                tracing::info!(donation_id = %donation_id, "Donation completed");
                self.metrics.transitions_total.inc();
                Ok(donation)
            })
            .await?;

        if let Some(request_id) = donation.request_id {
            self.note_request_completed(request_id).await?;
        }

        Ok(donation)
    }

    /// Cancel a donation (the donor, the receiving hospital, or an
    /// admin). The donor becomes available again in the same batch; the
    /// linked request re-opens only when this was its last live
    /// donation.
    pub async fn cancel_donation(
        &self,
        caller: Caller,
        donation_id: Uuid,
        reason: Option<String>,
    ) -> Result<Donation> {
        let donor_id = self.storage.get_donation(donation_id)?.donor_id;

        let donation = self
            .guarded_pair(donation_id, donor_id, || {
                let mut donation = self.storage.get_donation(donation_id)?;
                let mut donor = self.storage.get_donor(donation.donor_id)?;

                let is_donor = caller.user_id == donor.user_id;
                let is_hospital = caller.user_id == donation.hospital_id;
                if !caller.is_admin() && !is_donor && !is_hospital {
                    return Err(Error::Forbidden(
                        "Not authorized to cancel this donation".to_string(),
                    ));
                }
                if !donation.status.can_transition_to(DonationStatus::Cancelled) {
                    return Err(Error::Conflict(format!(
                        "Donation already {:?}",
                        donation.status
                    )));
                }

                donation.status = DonationStatus::Cancelled;
                let by = if is_donor {
                    "donor"
                } else if is_hospital {
                    "hospital"
                } else {
                    "admin"
                };
                let note = format!(
                    "Cancelled by {}. Reason: {}",
                    by,
                    reason.as_deref().unwrap_or("not specified")
                );
                if !donation.notes.is_empty() {
                    donation.notes.push('\n');
                }
                donation.notes.push_str(&note);

                donor.available = true;

                let mut write = self.storage.batch();
                self.storage.stage_donation(&mut write, &donation)?;
                self.storage.stage_donor(&mut write, &donor)?;
                self.storage.commit(write)?;

                tracing::info!(donation_id = %donation_id, by, "Donation cancelled");
                self.metrics.transitions_total.inc();
                Ok(donation)
            })
            .await?;

        if let Some(request_id) = donation.request_id {
            self.maybe_reopen_request(request_id).await?;
        }

        Ok(donation)
    }

    /// Get donation by id
    pub fn get_donation(&self, donation_id: Uuid) -> Result<Donation> {
        self.storage.get_donation(donation_id)
    }

    /// All donations by a donor, newest first
    pub fn donations_for_donor(&self, donor_id: Uuid) -> Result<Vec<Donation>> {
        let mut donations = self.storage.donations_for_donor(donor_id)?;
        donations.sort_by(|a, b| b.donation_date.cmp(&a.donation_date));
        Ok(donations)
    }

    /// All donations received by a hospital, newest first
    pub fn donations_for_hospital(&self, hospital_id: Uuid) -> Result<Vec<Donation>> {
        let mut donations = self.storage.donations_for_hospital(hospital_id)?;
        donations.sort_by(|a, b| b.donation_date.cmp(&a.donation_date));
        Ok(donations)
    }

    // Downstream request transitions.
    //
    // The donation is already committed when these run; a request that
    // raced into a terminal state in the meantime is logged and left
    // alone rather than failing the caller.

    async fn note_request_matched(&self, request_id: Uuid, donor_id: Uuid) -> Result<()> {
        self.guarded(request_id, || {
            let mut request = self.storage.get_request(request_id)?;
            if request.status.is_terminal() {
                tracing::warn!(request_id = %request_id, "Scheduled against a closed request");
                return Ok(());
            }

            request.status = RequestStatus::Matched;
            if !request.matched_donors.contains(&donor_id) {
                request.matched_donors.push(donor_id);
            }

            let mut write = self.storage.batch();
            self.storage.stage_request(&mut write, &request)?;
            self.storage.commit(write)?;
            self.metrics.transitions_total.inc();
            Ok(())
        })
        .await
    }

    async fn note_request_completed(&self, request_id: Uuid) -> Result<()> {
        self.guarded(request_id, || {
            let mut request = self.storage.get_request(request_id)?;
            if request.status.is_terminal() {
                return Ok(());
            }

            request.status = RequestStatus::Completed;

            let mut write = self.storage.batch();
            self.storage.stage_request(&mut write, &request)?;
            self.storage.commit(write)?;
            self.metrics.transitions_total.inc();
            Ok(())
        })
        .await
    }

    async fn maybe_reopen_request(&self, request_id: Uuid) -> Result<()> {
        self.guarded(request_id, || {
            let live = self
                .storage
                .donations_for_request(request_id)?
                .into_iter()
                .filter(|d| d.status != DonationStatus::Cancelled)
                .count();
            if live > 0 {
                return Ok(());
            }

            let mut request = self.storage.get_request(request_id)?;
            if !request.status.can_transition_to(RequestStatus::Open) {
                return Ok(());
            }

            request.status = RequestStatus::Open;

            let mut write = self.storage.batch();
            self.storage.stage_request(&mut write, &request)?;
            self.storage.commit(write)?;

            tracing::info!(request_id = %request_id, "Request re-opened");
            self.metrics.transitions_total.inc();
            Ok(())
        })
        .await
    }

    // Re-activation jobs

    /// Jobs whose due time has passed, oldest first
    pub fn due_reactivations(&self, now: chrono::DateTime<Utc>) -> Result<Vec<ReactivationJob>> {
        self.storage.due_jobs(now)
    }

    /// Execute one re-activation job: donor available again, job
    /// removed, atomically. Idempotent — re-running after a crash or a
    /// duplicate delivery changes nothing and reports `false`.
    pub async fn execute_reactivation(&self, job: &ReactivationJob) -> Result<bool> {
        self.guarded(job.donor_id, || {
            let donor = match self.storage.get_donor(job.donor_id) {
                Ok(donor) => Some(donor),
                Err(Error::NotFound(_)) => None,
                Err(e) => return Err(e),
            };

            let mut write = self.storage.batch();
            self.storage.clear_job(&mut write, job)?;

            let flipped = match donor {
                Some(mut donor) if !donor.available => {
                    donor.available = true;
                    self.storage.stage_donor(&mut write, &donor)?;
                    true
                }
                _ => false,
            };

            self.storage.commit(write)?;

            if flipped {
                tracing::info!(donor_id = %job.donor_id, "Donor re-activated");
                self.metrics.reactivations_total.inc();
            }
            Ok(flipped)
        })
        .await
    }
}
