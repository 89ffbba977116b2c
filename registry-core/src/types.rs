//! Core types for the booking and donation registry
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)
//!
//! Status enums carry their own transition tables; the Lifecycle Guard
//! consults them inside the exclusive section so that every mutation path
//! enforces the same state machine.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Days a donor stays unavailable after a completed blood donation.
pub const RECOVERY_WINDOW_DAYS: i64 = 56;

/// ABO/Rh blood type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    /// A positive
    APos,
    /// A negative
    ANeg,
    /// B positive
    BPos,
    /// B negative
    BNeg,
    /// AB positive
    AbPos,
    /// AB negative
    AbNeg,
    /// O positive
    OPos,
    /// O negative
    ONeg,
}

impl BloodType {
    /// Clinical notation
    pub fn code(&self) -> &'static str {
        match self {
            BloodType::APos => "A+",
            BloodType::ANeg => "A-",
            BloodType::BPos => "B+",
            BloodType::BNeg => "B-",
            BloodType::AbPos => "AB+",
            BloodType::AbNeg => "AB-",
            BloodType::OPos => "O+",
            BloodType::ONeg => "O-",
        }
    }

    /// Parse from clinical notation
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "A+" => Some(BloodType::APos),
            "A-" => Some(BloodType::ANeg),
            "B+" => Some(BloodType::BPos),
            "B-" => Some(BloodType::BNeg),
            "AB+" => Some(BloodType::AbPos),
            "AB-" => Some(BloodType::AbNeg),
            "O+" => Some(BloodType::OPos),
            "O-" => Some(BloodType::ONeg),
            _ => None,
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Donatable organ or tissue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Organ {
    /// Kidney
    Kidney,
    /// Liver
    Liver,
    /// Heart
    Heart,
    /// Lungs
    Lungs,
    /// Pancreas
    Pancreas,
    /// Corneas
    Corneas,
    /// Tissue
    Tissue,
    /// Bone marrow
    BoneMarrow,
}

impl Organ {
    /// Lowercase wire name
    pub fn code(&self) -> &'static str {
        match self {
            Organ::Kidney => "kidney",
            Organ::Liver => "liver",
            Organ::Heart => "heart",
            Organ::Lungs => "lungs",
            Organ::Pancreas => "pancreas",
            Organ::Corneas => "corneas",
            Organ::Tissue => "tissue",
            Organ::BoneMarrow => "bone marrow",
        }
    }

    /// Parse from wire name
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "kidney" => Some(Organ::Kidney),
            "liver" => Some(Organ::Liver),
            "heart" => Some(Organ::Heart),
            "lungs" => Some(Organ::Lungs),
            "pancreas" => Some(Organ::Pancreas),
            "corneas" => Some(Organ::Corneas),
            "tissue" => Some(Organ::Tissue),
            "bone marrow" => Some(Organ::BoneMarrow),
            _ => None,
        }
    }
}

impl fmt::Display for Organ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Request/donation urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Urgency {
    /// No time pressure
    Routine = 1,
    /// Needed within days
    Urgent = 2,
    /// Needed immediately; triggers auto-matching
    Emergency = 3,
}

impl Urgency {
    /// How long a request at this urgency stays open before expiring
    pub fn expiry_window(&self) -> chrono::Duration {
        match self {
            Urgency::Routine => chrono::Duration::days(7),
            Urgency::Urgent => chrono::Duration::days(2),
            Urgency::Emergency => chrono::Duration::days(1),
        }
    }
}

/// What is being requested or donated.
///
/// Exactly one of blood type / organ is carried, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DonationKind {
    /// Whole-blood donation of the given type
    Blood(BloodType),
    /// Donation of the given organ
    Organ(Organ),
}

impl DonationKind {
    /// "blood" or "organ"
    pub fn name(&self) -> &'static str {
        match self {
            DonationKind::Blood(_) => "blood",
            DonationKind::Organ(_) => "organ",
        }
    }
}

/// Caller role resolved by the authentication middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Patient account
    Patient,
    /// Doctor account
    Doctor,
    /// Hospital account
    Hospital,
    /// Platform administrator
    Admin,
}

/// Resolved caller identity.
///
/// Credential validity is checked upstream; the registry only checks
/// ownership against this identity. Doctors authenticate as their
/// doctor record id, hospitals as their hospital id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// Authenticated principal id (user, doctor record, or hospital)
    pub user_id: Uuid,
    /// Resolved role
    pub role: Role,
}

impl Caller {
    /// Construct a caller identity
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Admins pass every ownership check
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// WGS-84 coordinate (longitude, latitude in degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude in degrees
    pub longitude: f64,
    /// Latitude in degrees
    pub latitude: f64,
}

impl GeoPoint {
    /// Construct a coordinate
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// A bookable (doctor, date, time) triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    /// Owning doctor
    pub doctor_id: Uuid,
    /// Calendar date
    pub date: NaiveDate,
    /// Start time
    pub time: NaiveTime,
}

impl SlotKey {
    /// Construct a slot key
    pub fn new(doctor_id: Uuid, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            doctor_id,
            date,
            time,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.doctor_id, self.date, self.time)
    }
}

/// Doctor record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    /// Doctor id
    pub doctor_id: Uuid,

    /// Backing user account
    pub user_id: Uuid,

    /// Display name
    pub name: String,

    /// Medical speciality
    pub speciality: String,

    /// Accepting new bookings
    pub available: bool,

    /// Consultation fee (exact decimal)
    pub fee: Decimal,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Appointment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AppointmentStatus {
    /// Booked, not yet seen
    Pending = 1,
    /// Consultation happened (terminal)
    Completed = 2,
    /// Booking cancelled (terminal)
    Cancelled = 3,
}

impl AppointmentStatus {
    /// Terminal states admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }

    /// Transition table
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (
                AppointmentStatus::Pending,
                AppointmentStatus::Completed | AppointmentStatus::Cancelled
            )
        )
    }
}

/// Booking of a slot by a patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    /// Appointment id
    pub appointment_id: Uuid,

    /// Booking patient (user id)
    pub patient_id: Uuid,

    /// Booked doctor
    pub doctor_id: Uuid,

    /// Slot date
    pub slot_date: NaiveDate,

    /// Slot time
    pub slot_time: NaiveTime,

    /// Fee charged at booking time
    pub amount: Decimal,

    /// Current status
    pub status: AppointmentStatus,

    /// Payment verified against the gateway
    pub payment_confirmed: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// The slot this appointment occupies
    pub fn slot(&self) -> SlotKey {
        SlotKey::new(self.doctor_id, self.slot_date, self.slot_time)
    }

    /// Whether the caller is a party to this appointment
    pub fn is_party(&self, caller: &Caller) -> bool {
        caller.is_admin()
            || caller.user_id == self.patient_id
            || caller.user_id == self.doctor_id
    }
}

/// Donor record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donor {
    /// Donor id
    pub donor_id: Uuid,

    /// Backing user account
    pub user_id: Uuid,

    /// ABO/Rh blood type
    pub blood_type: BloodType,

    /// Registered as an organ donor
    pub organ_donor: bool,

    /// Organs still on offer (shrinks as organ donations complete)
    pub organs: Vec<Organ>,

    /// Self-reported conditions
    pub medical_conditions: Vec<String>,

    /// Current medications
    pub medications: Vec<String>,

    /// Eligible for matching right now
    pub available: bool,

    /// Date of the most recent donation
    pub last_donated: Option<NaiveDate>,

    /// Home coordinate for radius search
    pub location: GeoPoint,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Donor {
    /// Eligible to serve a blood request of the given type
    pub fn can_give_blood(&self, blood_type: BloodType) -> bool {
        self.available && self.blood_type == blood_type
    }

    /// Eligible to serve an organ request for the given organ
    pub fn can_give_organ(&self, organ: Organ) -> bool {
        self.available && self.organ_donor && self.organs.contains(&organ)
    }

    /// Eligible to serve the given request kind
    pub fn can_serve(&self, kind: &DonationKind) -> bool {
        match kind {
            DonationKind::Blood(bt) => self.can_give_blood(*bt),
            DonationKind::Organ(organ) => self.can_give_organ(*organ),
        }
    }

    /// Remove a donated organ from the offer set.
    ///
    /// Clears the organ-donor flag once the set empties. Availability is
    /// untouched; the donor may still give blood or other organs.
    pub fn retire_organ(&mut self, organ: Organ) {
        self.organs.retain(|o| *o != organ);
        if self.organs.is_empty() {
            self.organ_donor = false;
        }
    }
}

/// Donation request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestStatus {
    /// Accepting matches
    Open = 1,
    /// Donors matched, awaiting fulfilment
    Matched = 2,
    /// Fulfilled (terminal)
    Completed = 3,
    /// Withdrawn (terminal)
    Cancelled = 4,
}

impl RequestStatus {
    /// Terminal states admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Transition table
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        match self {
            RequestStatus::Open => matches!(
                next,
                RequestStatus::Matched | RequestStatus::Completed | RequestStatus::Cancelled
            ),
            RequestStatus::Matched => {
                // Re-opens when the last non-cancelled donation for it is cancelled
                matches!(
                    next,
                    RequestStatus::Open | RequestStatus::Completed | RequestStatus::Cancelled
                )
            }
            RequestStatus::Completed | RequestStatus::Cancelled => false,
        }
    }
}

/// Hospital's call for donors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationRequest {
    /// Request id
    pub request_id: Uuid,

    /// Requesting hospital
    pub hospital_id: Uuid,

    /// Blood type or organ needed
    pub kind: DonationKind,

    /// Urgency; drives expiry and auto-matching
    pub urgency: Urgency,

    /// Current status
    pub status: RequestStatus,

    /// Donor ids stored by the last successful match
    pub matched_donors: Vec<Uuid>,

    /// Free-text condition summary
    pub patient_condition: Option<String>,

    /// Free-text notes
    pub notes: Option<String>,

    /// Derived from urgency at creation
    pub expires_at: DateTime<Utc>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl DonationRequest {
    /// Past its expiry deadline
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Donation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DonationStatus {
    /// Booked with the hospital
    Scheduled = 1,
    /// Donation happened (terminal)
    Completed = 2,
    /// Called off (terminal)
    Cancelled = 3,
}

impl DonationStatus {
    /// Terminal states admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, DonationStatus::Completed | DonationStatus::Cancelled)
    }

    /// Transition table
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        matches!(
            (self, next),
            (
                DonationStatus::Scheduled,
                DonationStatus::Completed | DonationStatus::Cancelled
            )
        )
    }
}

/// One donor → hospital fulfilment, optionally tied to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    /// Donation id
    pub donation_id: Uuid,

    /// Giving donor
    pub donor_id: Uuid,

    /// Request being fulfilled, if any
    pub request_id: Option<Uuid>,

    /// Receiving hospital
    pub hospital_id: Uuid,

    /// Blood type or organ donated
    pub kind: DonationKind,

    /// Current status
    pub status: DonationStatus,

    /// Scheduled donation date
    pub donation_date: NaiveDate,

    /// Free-text notes (appended on complete/cancel)
    pub notes: String,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Persisted trigger that re-opens a donor's availability after the
/// blood recovery window. Written in the same atomic batch as the
/// donation completion so a restart cannot lose it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactivationJob {
    /// Job id
    pub job_id: Uuid,

    /// Donor to re-activate
    pub donor_id: Uuid,

    /// Completed donation that started the window
    pub donation_id: Uuid,

    /// When the donor becomes available again
    pub due_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_type_codes() {
        assert_eq!(BloodType::from_code("O-"), Some(BloodType::ONeg));
        assert_eq!(BloodType::from_code("AB+"), Some(BloodType::AbPos));
        assert_eq!(BloodType::from_code("C+"), None);
        assert_eq!(BloodType::ONeg.code(), "O-");
    }

    #[test]
    fn test_urgency_expiry_windows() {
        assert_eq!(Urgency::Routine.expiry_window(), chrono::Duration::days(7));
        assert_eq!(Urgency::Urgent.expiry_window(), chrono::Duration::days(2));
        assert_eq!(
            Urgency::Emergency.expiry_window(),
            chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_appointment_transitions() {
        assert!(AppointmentStatus::Pending.can_transition_to(AppointmentStatus::Completed));
        assert!(AppointmentStatus::Pending.can_transition_to(AppointmentStatus::Cancelled));
        assert!(!AppointmentStatus::Completed.can_transition_to(AppointmentStatus::Cancelled));
        assert!(!AppointmentStatus::Cancelled.can_transition_to(AppointmentStatus::Completed));
        assert!(AppointmentStatus::Completed.is_terminal());
    }

    #[test]
    fn test_request_transitions() {
        assert!(RequestStatus::Open.can_transition_to(RequestStatus::Matched));
        assert!(RequestStatus::Open.can_transition_to(RequestStatus::Cancelled));
        assert!(RequestStatus::Matched.can_transition_to(RequestStatus::Open));
        assert!(RequestStatus::Matched.can_transition_to(RequestStatus::Completed));
        assert!(!RequestStatus::Completed.can_transition_to(RequestStatus::Open));
        assert!(!RequestStatus::Cancelled.can_transition_to(RequestStatus::Matched));
    }

    #[test]
    fn test_donation_transitions() {
        assert!(DonationStatus::Scheduled.can_transition_to(DonationStatus::Completed));
        assert!(DonationStatus::Scheduled.can_transition_to(DonationStatus::Cancelled));
        assert!(!DonationStatus::Completed.can_transition_to(DonationStatus::Cancelled));
    }

    #[test]
    fn test_donor_eligibility() {
        let donor = Donor {
            donor_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            blood_type: BloodType::ONeg,
            organ_donor: true,
            organs: vec![Organ::Kidney, Organ::Corneas],
            medical_conditions: vec![],
            medications: vec![],
            available: true,
            last_donated: None,
            location: GeoPoint::new(0.0, 0.0),
            created_at: Utc::now(),
        };

        assert!(donor.can_give_blood(BloodType::ONeg));
        assert!(!donor.can_give_blood(BloodType::APos));
        assert!(donor.can_give_organ(Organ::Kidney));
        assert!(!donor.can_give_organ(Organ::Heart));

        let mut unavailable = donor.clone();
        unavailable.available = false;
        assert!(!unavailable.can_give_blood(BloodType::ONeg));
        assert!(!unavailable.can_give_organ(Organ::Kidney));
    }

    #[test]
    fn test_retire_organ_keeps_flag_until_empty() {
        let mut donor = Donor {
            donor_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            blood_type: BloodType::APos,
            organ_donor: true,
            organs: vec![Organ::Kidney, Organ::Corneas],
            medical_conditions: vec![],
            medications: vec![],
            available: true,
            last_donated: None,
            location: GeoPoint::new(0.0, 0.0),
            created_at: Utc::now(),
        };

        donor.retire_organ(Organ::Kidney);
        assert_eq!(donor.organs, vec![Organ::Corneas]);
        assert!(donor.organ_donor);

        donor.retire_organ(Organ::Corneas);
        assert!(donor.organs.is_empty());
        assert!(!donor.organ_donor);
    }

    #[test]
    fn test_request_expiry() {
        let now = Utc::now();
        let request = DonationRequest {
            request_id: Uuid::new_v4(),
            hospital_id: Uuid::new_v4(),
            kind: DonationKind::Blood(BloodType::ONeg),
            urgency: Urgency::Emergency,
            status: RequestStatus::Open,
            matched_donors: vec![],
            patient_condition: None,
            notes: None,
            expires_at: now + Urgency::Emergency.expiry_window(),
            created_at: now,
        };

        assert!(!request.is_expired(now));
        assert!(!request.is_expired(now + chrono::Duration::hours(23)));
        assert!(request.is_expired(now + chrono::Duration::hours(25)));
    }

    #[test]
    fn test_haversine_distance() {
        // London → Paris, roughly 344 km
        let london = GeoPoint::new(-0.1278, 51.5074);
        let paris = GeoPoint::new(2.3522, 48.8566);

        let d = london.distance_km(&paris);
        assert!((d - 344.0).abs() < 5.0, "got {}", d);

        // Zero distance to self
        assert!(london.distance_km(&london) < 1e-9);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_distance_symmetric_and_nonnegative(
                lon_a in -180.0..180.0f64,
                lat_a in -90.0..90.0f64,
                lon_b in -180.0..180.0f64,
                lat_b in -90.0..90.0f64,
            ) {
                let a = GeoPoint::new(lon_a, lat_a);
                let b = GeoPoint::new(lon_b, lat_b);

                let ab = a.distance_km(&b);
                let ba = b.distance_km(&a);

                prop_assert!(ab >= 0.0);
                prop_assert!((ab - ba).abs() < 1e-6);
                // Nothing on Earth is further than half the circumference
                prop_assert!(ab <= 20_038.0);
            }

            #[test]
            fn prop_terminal_states_admit_nothing(
                next in prop::sample::select(vec![
                    AppointmentStatus::Pending,
                    AppointmentStatus::Completed,
                    AppointmentStatus::Cancelled,
                ]),
            ) {
                prop_assert!(!AppointmentStatus::Completed.can_transition_to(next));
                prop_assert!(!AppointmentStatus::Cancelled.can_transition_to(next));
            }
        }
    }
}
