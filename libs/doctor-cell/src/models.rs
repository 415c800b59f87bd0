use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// CLOSED SETS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    ClinicVisit,
    HomeVisit,
    Video,
    Phone,
}

impl ConsultationMode {
    /// Slot lookups and availability edits key on the presence of a clinic.
    pub fn for_clinic(clinic_id: Option<&Uuid>) -> Self {
        match clinic_id {
            Some(_) => ConsultationMode::ClinicVisit,
            None => ConsultationMode::HomeVisit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationMode::ClinicVisit => "clinic_visit",
            ConsultationMode::HomeVisit => "home_visit",
            ConsultationMode::Video => "video",
            ConsultationMode::Phone => "phone",
        }
    }
}

impl fmt::Display for ConsultationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clinic_visit" => Ok(ConsultationMode::ClinicVisit),
            "home_visit" => Ok(ConsultationMode::HomeVisit),
            "video" => Ok(ConsultationMode::Video),
            "phone" => Ok(ConsultationMode::Phone),
            other => Err(format!(
                "Invalid consultation type '{}'. Expected one of clinic_visit, home_visit, video, phone",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DayOfWeek::ALL
            .into_iter()
            .find(|day| day.as_str() == normalized)
            .ok_or_else(|| format!(
                "Invalid day '{}'. Expected one of monday, tuesday, wednesday, thursday, friday, saturday, sunday",
                s
            ))
    }
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

/// A recurring weekly time range during which a doctor accepts bookings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub consultation_type: ConsultationMode,
    pub clinic_id: Option<Uuid>,
    pub day: DayOfWeek,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub slot_duration: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub is_booked: bool,
}

impl Slot {
    pub fn open(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self { start_time, end_time, is_booked: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateSlots {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub day: DayOfWeek,
    pub consultation_type: ConsultationMode,
    pub clinic_id: Option<Uuid>,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowWithSlots {
    pub id: Uuid,
    pub consultation_type: ConsultationMode,
    pub clinic_id: Option<Uuid>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub slot_duration: i32,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityDay {
    pub day: DayOfWeek,
    pub windows: Vec<WindowWithSlots>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRangeInput {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertAvailabilityRequest {
    pub day: String,
    pub clinic_id: Option<Uuid>,
    pub slot_duration: i32,
    #[serde(default)]
    pub slots: Vec<TimeRangeInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub date: Option<String>,
    pub clinic_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeeklyAvailabilityQuery {
    pub clinic_id: Option<String>,
}

// ==============================================================================
// DOCTORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub role: String,
    pub is_active: bool,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::SupabaseError> for AvailabilityError {
    fn from(e: shared_database::SupabaseError) -> Self {
        AvailabilityError::DatabaseError(e.to_string())
    }
}

/// Times of day on the wire are `HH:MM`; stored values may carry seconds.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }
}
