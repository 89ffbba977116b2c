//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `doctors` - Doctor records (key: doctor_id)
//! - `appointments` - Appointment records (key: appointment_id)
//! - `donors` - Donor records (key: donor_id)
//! - `requests` - Donation requests (key: request_id)
//! - `donations` - Donation records (key: donation_id)
//! - `slots` - Slot occupancy (key: doctor_id || date || time, value: appointment_id)
//! - `indices` - Secondary indices for fast lookups
//! - `jobs` - Durable re-activation jobs (key: due_at || job_id)
//!
//! All multi-record mutations go through [`Storage::commit`] on a single
//! `WriteBatch`, so one lifecycle transition is either fully persisted or
//! not at all.

use crate::{
    error::{Error, Result},
    types::{
        Appointment, Doctor, Donation, DonationRequest, Donor, ReactivationJob, SlotKey,
    },
    Config,
};
use chrono::{DateTime, Datelike, Timelike, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_DOCTORS: &str = "doctors";
const CF_APPOINTMENTS: &str = "appointments";
const CF_DONORS: &str = "donors";
const CF_REQUESTS: &str = "requests";
const CF_DONATIONS: &str = "donations";
const CF_SLOTS: &str = "slots";
const CF_INDICES: &str = "indices";
const CF_JOBS: &str = "jobs";

/// Index key prefixes (entity id appended after the prefix and owner id)
const IDX_DOCTOR_APPOINTMENT: &[u8] = b"da";
const IDX_PATIENT_APPOINTMENT: &[u8] = b"pa";
const IDX_USER_DONOR: &[u8] = b"ud";
const IDX_HOSPITAL_REQUEST: &[u8] = b"hr";
const IDX_REQUEST_DONATION: &[u8] = b"rd";
const IDX_DONOR_DONATION: &[u8] = b"dd";
const IDX_HOSPITAL_DONATION: &[u8] = b"hd";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_DOCTORS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_APPOINTMENTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_DONORS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_REQUESTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_DONATIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_SLOTS, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_JOBS, Self::cf_options_records()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Records are frequently re-read inside guard sections
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Start an atomic batch
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    /// Atomically commit a staged batch
    pub fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }

    // Doctor operations

    /// Stage a doctor record into a batch
    pub fn stage_doctor(&self, batch: &mut WriteBatch, doctor: &Doctor) -> Result<()> {
        let cf = self.cf_handle(CF_DOCTORS)?;
        batch.put_cf(cf, doctor.doctor_id.as_bytes(), bincode::serialize(doctor)?);
        Ok(())
    }

    /// Get doctor by id
    pub fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor> {
        let cf = self.cf_handle(CF_DOCTORS)?;
        let value = self
            .db
            .get_cf(cf, doctor_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("Doctor {}", doctor_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// List all doctors
    pub fn list_doctors(&self) -> Result<Vec<Doctor>> {
        let cf = self.cf_handle(CF_DOCTORS)?;
        let mut doctors = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            doctors.push(bincode::deserialize(&value)?);
        }
        Ok(doctors)
    }

    // Slot operations

    /// Occupant of a slot, if any
    pub fn get_slot(&self, slot: &SlotKey) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_SLOTS)?;
        let value = self.db.get_cf(cf, Self::slot_key(slot))?;
        match value {
            Some(bytes) => {
                let id_bytes: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Malformed slot value".to_string()))?;
                Ok(Some(Uuid::from_bytes(id_bytes)))
            }
            None => Ok(None),
        }
    }

    /// Stage slot occupancy
    pub fn stage_slot(
        &self,
        batch: &mut WriteBatch,
        slot: &SlotKey,
        appointment_id: Uuid,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_SLOTS)?;
        batch.put_cf(cf, Self::slot_key(slot), appointment_id.as_bytes());
        Ok(())
    }

    /// Stage slot release (idempotent; deleting a free slot is a no-op)
    pub fn clear_slot(&self, batch: &mut WriteBatch, slot: &SlotKey) -> Result<()> {
        let cf = self.cf_handle(CF_SLOTS)?;
        batch.delete_cf(cf, Self::slot_key(slot));
        Ok(())
    }

    // Appointment operations

    /// Stage an appointment with its doctor/patient indices
    pub fn stage_appointment(
        &self,
        batch: &mut WriteBatch,
        appointment: &Appointment,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_APPOINTMENTS)?;
        batch.put_cf(
            cf,
            appointment.appointment_id.as_bytes(),
            bincode::serialize(appointment)?,
        );

        let cf_idx = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_idx,
            Self::index_key(
                IDX_DOCTOR_APPOINTMENT,
                appointment.doctor_id,
                appointment.appointment_id,
            ),
            &[],
        );
        batch.put_cf(
            cf_idx,
            Self::index_key(
                IDX_PATIENT_APPOINTMENT,
                appointment.patient_id,
                appointment.appointment_id,
            ),
            &[],
        );
        Ok(())
    }

    /// Get appointment by id
    pub fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment> {
        let cf = self.cf_handle(CF_APPOINTMENTS)?;
        let value = self
            .db
            .get_cf(cf, appointment_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("Appointment {}", appointment_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All appointments for a doctor
    pub fn appointments_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>> {
        self.appointments_by_index(IDX_DOCTOR_APPOINTMENT, doctor_id)
    }

    /// All appointments for a patient
    pub fn appointments_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>> {
        self.appointments_by_index(IDX_PATIENT_APPOINTMENT, patient_id)
    }

    fn appointments_by_index(&self, prefix: &[u8], owner: Uuid) -> Result<Vec<Appointment>> {
        let mut appointments = Vec::new();
        for id in self.scan_index(prefix, owner)? {
            appointments.push(self.get_appointment(id)?);
        }
        Ok(appointments)
    }

    // Donor operations

    /// Stage a donor with its user index
    pub fn stage_donor(&self, batch: &mut WriteBatch, donor: &Donor) -> Result<()> {
        let cf = self.cf_handle(CF_DONORS)?;
        batch.put_cf(cf, donor.donor_id.as_bytes(), bincode::serialize(donor)?);

        let cf_idx = self.cf_handle(CF_INDICES)?;
        let mut key = IDX_USER_DONOR.to_vec();
        key.extend_from_slice(donor.user_id.as_bytes());
        batch.put_cf(cf_idx, key, donor.donor_id.as_bytes());
        Ok(())
    }

    /// Get donor by id
    pub fn get_donor(&self, donor_id: Uuid) -> Result<Donor> {
        let cf = self.cf_handle(CF_DONORS)?;
        let value = self
            .db
            .get_cf(cf, donor_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("Donor {}", donor_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Donor registered by a user, if any
    pub fn donor_for_user(&self, user_id: Uuid) -> Result<Option<Donor>> {
        let cf_idx = self.cf_handle(CF_INDICES)?;
        let mut key = IDX_USER_DONOR.to_vec();
        key.extend_from_slice(user_id.as_bytes());

        match self.db.get_cf(cf_idx, key)? {
            Some(bytes) => {
                let id_bytes: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Malformed donor index value".to_string()))?;
                Ok(Some(self.get_donor(Uuid::from_bytes(id_bytes))?))
            }
            None => Ok(None),
        }
    }

    /// All donors (matching scans filter in memory)
    pub fn list_donors(&self) -> Result<Vec<Donor>> {
        let cf = self.cf_handle(CF_DONORS)?;
        let mut donors = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            donors.push(bincode::deserialize(&value)?);
        }
        Ok(donors)
    }

    // Donation request operations

    /// Stage a request with its hospital index
    pub fn stage_request(&self, batch: &mut WriteBatch, request: &DonationRequest) -> Result<()> {
        let cf = self.cf_handle(CF_REQUESTS)?;
        batch.put_cf(
            cf,
            request.request_id.as_bytes(),
            bincode::serialize(request)?,
        );

        let cf_idx = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_idx,
            Self::index_key(IDX_HOSPITAL_REQUEST, request.hospital_id, request.request_id),
            &[],
        );
        Ok(())
    }

    /// Get request by id
    pub fn get_request(&self, request_id: Uuid) -> Result<DonationRequest> {
        let cf = self.cf_handle(CF_REQUESTS)?;
        let value = self
            .db
            .get_cf(cf, request_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("Donation request {}", request_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All requests (open-request listings filter in memory)
    pub fn list_requests(&self) -> Result<Vec<DonationRequest>> {
        let cf = self.cf_handle(CF_REQUESTS)?;
        let mut requests = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            requests.push(bincode::deserialize(&value)?);
        }
        Ok(requests)
    }

    /// All requests created by a hospital
    pub fn requests_for_hospital(&self, hospital_id: Uuid) -> Result<Vec<DonationRequest>> {
        let mut requests = Vec::new();
        for id in self.scan_index(IDX_HOSPITAL_REQUEST, hospital_id)? {
            requests.push(self.get_request(id)?);
        }
        Ok(requests)
    }

    // Donation operations

    /// Stage a donation with its request/donor/hospital indices
    pub fn stage_donation(&self, batch: &mut WriteBatch, donation: &Donation) -> Result<()> {
        let cf = self.cf_handle(CF_DONATIONS)?;
        batch.put_cf(
            cf,
            donation.donation_id.as_bytes(),
            bincode::serialize(donation)?,
        );

        let cf_idx = self.cf_handle(CF_INDICES)?;
        if let Some(request_id) = donation.request_id {
            batch.put_cf(
                cf_idx,
                Self::index_key(IDX_REQUEST_DONATION, request_id, donation.donation_id),
                &[],
            );
        }
        batch.put_cf(
            cf_idx,
            Self::index_key(IDX_DONOR_DONATION, donation.donor_id, donation.donation_id),
            &[],
        );
        batch.put_cf(
            cf_idx,
            Self::index_key(
                IDX_HOSPITAL_DONATION,
                donation.hospital_id,
                donation.donation_id,
            ),
            &[],
        );
        Ok(())
    }

    /// Get donation by id
    pub fn get_donation(&self, donation_id: Uuid) -> Result<Donation> {
        let cf = self.cf_handle(CF_DONATIONS)?;
        let value = self
            .db
            .get_cf(cf, donation_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("Donation {}", donation_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All donations tied to a request
    pub fn donations_for_request(&self, request_id: Uuid) -> Result<Vec<Donation>> {
        self.donations_by_index(IDX_REQUEST_DONATION, request_id)
    }

    /// All donations by a donor
    pub fn donations_for_donor(&self, donor_id: Uuid) -> Result<Vec<Donation>> {
        self.donations_by_index(IDX_DONOR_DONATION, donor_id)
    }

    /// All donations received by a hospital
    pub fn donations_for_hospital(&self, hospital_id: Uuid) -> Result<Vec<Donation>> {
        self.donations_by_index(IDX_HOSPITAL_DONATION, hospital_id)
    }

    fn donations_by_index(&self, prefix: &[u8], owner: Uuid) -> Result<Vec<Donation>> {
        let mut donations = Vec::new();
        for id in self.scan_index(prefix, owner)? {
            donations.push(self.get_donation(id)?);
        }
        Ok(donations)
    }

    // Re-activation job operations

    /// Stage a re-activation job keyed by due time
    pub fn stage_job(&self, batch: &mut WriteBatch, job: &ReactivationJob) -> Result<()> {
        let cf = self.cf_handle(CF_JOBS)?;
        batch.put_cf(cf, Self::job_key(job), bincode::serialize(job)?);
        Ok(())
    }

    /// Stage removal of an executed job
    pub fn clear_job(&self, batch: &mut WriteBatch, job: &ReactivationJob) -> Result<()> {
        let cf = self.cf_handle(CF_JOBS)?;
        batch.delete_cf(cf, Self::job_key(job));
        Ok(())
    }

    /// Jobs whose due time has passed, oldest first
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ReactivationJob>> {
        let cf = self.cf_handle(CF_JOBS)?;
        let cutoff = now.timestamp_nanos_opt().unwrap_or(i64::MAX);

        let mut jobs = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            if key.len() < 8 {
                continue;
            }
            let due_nanos = i64::from_be_bytes(key[..8].try_into().unwrap());
            if due_nanos > cutoff {
                break;
            }
            jobs.push(bincode::deserialize(&value)?);
        }
        Ok(jobs)
    }

    // Key helpers

    fn slot_key(slot: &SlotKey) -> Vec<u8> {
        let mut key = slot.doctor_id.as_bytes().to_vec();
        key.extend_from_slice(&slot.date.num_days_from_ce().to_be_bytes());
        key.extend_from_slice(&slot.time.num_seconds_from_midnight().to_be_bytes());
        key
    }

    fn index_key(prefix: &[u8], owner: Uuid, entity: Uuid) -> Vec<u8> {
        let mut key = prefix.to_vec();
        key.extend_from_slice(owner.as_bytes());
        key.extend_from_slice(entity.as_bytes());
        key
    }

    fn job_key(job: &ReactivationJob) -> Vec<u8> {
        let mut key = job
            .due_at
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_be_bytes()
            .to_vec();
        key.extend_from_slice(job.job_id.as_bytes());
        key
    }

    /// Scan an index prefix, returning the entity ids
    fn scan_index(&self, prefix: &[u8], owner: Uuid) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut seek = prefix.to_vec();
        seek.extend_from_slice(owner.as_bytes());

        let mut ids = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&seek, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&seek) {
                break;
            }
            if key.len() >= seek.len() + 16 {
                let id_bytes: [u8; 16] =
                    key[seek.len()..seek.len() + 16].try_into().unwrap();
                ids.push(Uuid::from_bytes(id_bytes));
            }
        }
        Ok(ids)
    }
}
