use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::models::{
    AddressSource, ClinicContact, ConsultationMode, Participants, PostalAddress, ResolvedAddress,
    UserContact,
};

/// Where a visit takes place.
///
/// Clinic visits use the clinic's address. Otherwise the first present
/// address wins in this order: the one given at booking, the caregiver's
/// stored address, the patient's stored address.
pub fn resolve_visit_address(
    consultation_type: ConsultationMode,
    clinic: Option<&ClinicContact>,
    booked: Option<&PostalAddress>,
    caregiver: Option<&UserContact>,
    patient: Option<&UserContact>,
) -> Option<ResolvedAddress> {
    let clinic_address = match consultation_type {
        ConsultationMode::ClinicVisit => clinic.map(|c| &c.address),
        _ => None,
    };

    let candidates = [
        (AddressSource::Clinic, clinic_address),
        (AddressSource::Appointment, booked),
        (AddressSource::Caregiver, caregiver.map(|c| &c.address)),
        (AddressSource::Patient, patient.map(|p| &p.address)),
    ];

    candidates
        .into_iter()
        .find_map(|(source, address)| {
            address.filter(|a| a.is_present()).map(|a| ResolvedAddress {
                source,
                address: a.clone(),
                formatted: a.formatted(),
            })
        })
}

pub fn resolve_for_participants(
    consultation_type: ConsultationMode,
    booked: Option<&PostalAddress>,
    participants: &Participants,
) -> Option<ResolvedAddress> {
    resolve_visit_address(
        consultation_type,
        participants.clinic.as_ref(),
        booked,
        participants.caregiver.as_ref(),
        participants.patient.as_ref(),
    )
}

/// "5th March 2030"
pub fn format_long_date(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };

    format!("{}{} {}", day, suffix, date.format("%B %Y"))
}

/// "09:20 AM"
pub fn format_clock_time(time: NaiveTime) -> String {
    time.format("%I:%M %p").to_string()
}
