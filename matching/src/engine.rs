//! Donor matching engine
//!
//! Computes the eligible donor set for a donation request or a hospital
//! search. The filter itself is read-only over a snapshot of the donor
//! records; persisting a successful match (request → Matched with the
//! donor set stored) goes through the registry's lifecycle guard so that
//! two writers can never race on the same request.
//!
//! An empty result is a [`MatchOutcome::NoMatch`], not an error: "no one
//! currently eligible" is an expected answer, distinct from failure.

use crate::{config::MatchingConfig, Error, Result};
use registry_core::{
    BloodType, Caller, DonationKind, DonationRequest, Donor, GeoPoint, NewRequest, Organ,
    Registry, Urgency,
};
use std::sync::Arc;
use uuid::Uuid;

/// What to match against
#[derive(Debug, Clone)]
pub struct MatchCriteria {
    /// Blood type or organ needed
    pub kind: DonationKind,
    /// Search origin; enables radius filtering and distance ordering
    pub origin: Option<GeoPoint>,
    /// Search radius in km (falls back to the configured default)
    pub radius_km: Option<f64>,
}

/// One eligible donor, with distance when an origin was supplied
#[derive(Debug, Clone)]
pub struct DonorMatch {
    /// The eligible donor
    pub donor: Donor,
    /// Distance from the search origin, km
    pub distance_km: Option<f64>,
}

/// Result of a matching pass
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// At least one eligible donor, nearest first when ordered
    Matched(Vec<DonorMatch>),
    /// No donor currently eligible — expected, not a fault
    NoMatch,
}

impl MatchOutcome {
    /// Matched donor ids, empty on NoMatch
    pub fn donor_ids(&self) -> Vec<Uuid> {
        match self {
            MatchOutcome::Matched(matches) => {
                matches.iter().map(|m| m.donor.donor_id).collect()
            }
            MatchOutcome::NoMatch => vec![],
        }
    }
}

/// Hospital-facing donor search parameters
#[derive(Debug, Clone, Default)]
pub struct DonorSearch {
    /// Only donors of this blood type
    pub blood_type: Option<BloodType>,
    /// Only organ donors offering this organ
    pub organ: Option<Organ>,
    /// Search origin
    pub origin: Option<GeoPoint>,
    /// Search radius in km
    pub radius_km: Option<f64>,
}

/// Matching engine
pub struct MatchingEngine {
    /// Registry core
    registry: Arc<Registry>,

    /// Configuration
    config: MatchingConfig,
}

/// Filter a donor snapshot against criteria; pure so the invariants are
/// testable without storage.
fn eligible(
    donors: Vec<Donor>,
    kind: &DonationKind,
    origin: Option<GeoPoint>,
    radius_km: Option<f64>,
) -> Vec<DonorMatch> {
    let mut matches: Vec<DonorMatch> = donors
        .into_iter()
        .filter(|d| d.can_serve(kind))
        .map(|donor| {
            let distance_km = origin.map(|o| o.distance_km(&donor.location));
            DonorMatch { donor, distance_km }
        })
        .filter(|m| match (m.distance_km, radius_km) {
            (Some(d), Some(r)) => d <= r,
            _ => true,
        })
        .collect();

    // Nearest first when distances are known
    if origin.is_some() {
        matches.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    matches
}

impl MatchingEngine {
    /// Create new matching engine
    pub fn new(registry: Arc<Registry>, config: MatchingConfig) -> Self {
        Self { registry, config }
    }

    /// Compute the eligible donor set for the criteria. Read-only.
    pub fn find_eligible(&self, criteria: &MatchCriteria) -> Result<MatchOutcome> {
        let radius_km = match (criteria.origin, criteria.radius_km) {
            (Some(_), None) => Some(self.config.default_radius_km),
            (_, radius) => radius,
        };

        let matches = eligible(
            self.registry.list_donors()?,
            &criteria.kind,
            criteria.origin,
            radius_km,
        );

        if matches.is_empty() {
            Ok(MatchOutcome::NoMatch)
        } else {
            Ok(MatchOutcome::Matched(matches))
        }
    }

    /// Hospital donor search; same filter with both dimensions optional.
    pub fn search_donors(&self, search: &DonorSearch) -> Result<Vec<DonorMatch>> {
        let radius_km = match (search.origin, search.radius_km) {
            (Some(_), None) => Some(self.config.default_radius_km),
            (_, radius) => radius,
        };

        let mut matches: Vec<DonorMatch> = self
            .registry
            .list_donors()?
            .into_iter()
            .filter(|d| d.available)
            .filter(|d| search.blood_type.map_or(true, |bt| d.blood_type == bt))
            .filter(|d| {
                search
                    .organ
                    .map_or(true, |organ| d.organ_donor && d.organs.contains(&organ))
            })
            .map(|donor| {
                let distance_km = search.origin.map(|o| o.distance_km(&donor.location));
                DonorMatch { donor, distance_km }
            })
            .filter(|m| match (m.distance_km, radius_km) {
                (Some(d), Some(r)) => d <= r,
                _ => true,
            })
            .collect();

        if search.origin.is_some() {
            matches.sort_by(|a, b| {
                a.distance_km
                    .partial_cmp(&b.distance_km)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        Ok(matches)
    }

    /// Match donors against a stored request and persist the result.
    ///
    /// On a non-empty match the request moves to Matched with the donor
    /// set stored, through the lifecycle guard. NoMatch persists nothing.
    pub async fn match_request(
        &self,
        request_id: Uuid,
        origin: Option<GeoPoint>,
        radius_km: Option<f64>,
    ) -> Result<MatchOutcome> {
        let request = self.registry.get_request(request_id)?;
        if request.status.is_terminal() {
            return Err(Error::Registry(registry_core::Error::Conflict(format!(
                "Request already {:?}",
                request.status
            ))));
        }

        let outcome = self.find_eligible(&MatchCriteria {
            kind: request.kind,
            origin,
            radius_km,
        })?;

        match &outcome {
            MatchOutcome::Matched(matches) => {
                self.registry
                    .mark_request_matched(request_id, outcome.donor_ids())
                    .await?;
                tracing::info!(
                    request_id = %request_id,
                    matched = matches.len(),
                    "Donors matched to request"
                );
            }
            MatchOutcome::NoMatch => {
                tracing::info!(request_id = %request_id, "No eligible donors");
            }
        }

        Ok(outcome)
    }

    /// Create a request, auto-matching emergencies.
    ///
    /// Emergency-urgency requests are matched immediately at creation
    /// (when enabled); the match outcome rides along so the caller can
    /// tell "created and matched" from "created, none eligible".
    pub async fn create_request(
        &self,
        hospital_id: Uuid,
        new: NewRequest,
    ) -> Result<(DonationRequest, Option<MatchOutcome>)> {
        let urgency = new.urgency;
        let request = self.registry.create_request(hospital_id, new)?;

        let outcome = if urgency == Urgency::Emergency && self.config.auto_match_emergency {
            Some(self.match_request(request.request_id, None, None).await?)
        } else {
            None
        };

        // Re-read so the returned record reflects any auto-match
        let request = self.registry.get_request(request.request_id)?;
        Ok((request, outcome))
    }

    /// Cancel a request through the registry (convenience passthrough)
    pub async fn cancel_request(
        &self,
        caller: Caller,
        request_id: Uuid,
    ) -> Result<DonationRequest> {
        Ok(self.registry.cancel_request(caller, request_id).await?)
    }
}
