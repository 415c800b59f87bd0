use chrono::{Duration, NaiveTime};

use crate::models::{
    hhmm, AvailabilityError, AvailabilityWindow, ConsultationMode, DayOfWeek, Slot,
    UpsertAvailabilityRequest,
};

/// Expand windows into fixed-length slots.
///
/// Each window is walked from its start in `slot_duration` steps while a whole
/// slot still fits before the end; the remainder is dropped. Windows are
/// concatenated in the order given, without re-sorting across windows.
pub fn derive_slots(windows: &[AvailabilityWindow]) -> Vec<Slot> {
    windows.iter().flat_map(slots_for_window).collect()
}

pub fn slots_for_window(window: &AvailabilityWindow) -> Vec<Slot> {
    if !window.is_active || window.slot_duration <= 0 {
        return Vec::new();
    }

    let step = Duration::minutes(window.slot_duration as i64);
    let mut slots = Vec::new();
    let mut cursor = window.start_time;

    loop {
        let (slot_end, wrapped) = cursor.overflowing_add_signed(step);
        // a slot running past midnight never fits in a same-day window
        if wrapped != 0 || slot_end > window.end_time {
            break;
        }
        slots.push(Slot::open(cursor, slot_end));
        cursor = slot_end;
    }

    slots
}

/// Flag every slot whose start time is taken by a live appointment.
pub fn mark_booked(slots: &mut [Slot], booked_times: &[NaiveTime]) {
    for slot in slots.iter_mut() {
        slot.is_booked = booked_times.contains(&slot.start_time);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAvailability {
    pub day: DayOfWeek,
    pub consultation_type: ConsultationMode,
    pub slot_duration: i32,
    pub ranges: Vec<(NaiveTime, NaiveTime)>,
}

/// Checks every field of an availability edit. Nothing is written unless this passes.
pub fn validate_availability(request: &UpsertAvailabilityRequest) -> Result<ValidatedAvailability, AvailabilityError> {
    let day: DayOfWeek = request.day.parse().map_err(AvailabilityError::ValidationError)?;

    if request.slot_duration <= 0 {
        return Err(AvailabilityError::ValidationError(
            "slot_duration must be a positive number of minutes".to_string(),
        ));
    }

    if request.slots.is_empty() {
        return Err(AvailabilityError::ValidationError(
            "At least one time range is required".to_string(),
        ));
    }

    let mut ranges = Vec::with_capacity(request.slots.len());
    for (index, range) in request.slots.iter().enumerate() {
        let start = hhmm::parse(&range.start_time).ok_or_else(|| AvailabilityError::ValidationError(
            format!("slots[{}].start_time '{}' is not a valid HH:MM time", index, range.start_time),
        ))?;
        let end = hhmm::parse(&range.end_time).ok_or_else(|| AvailabilityError::ValidationError(
            format!("slots[{}].end_time '{}' is not a valid HH:MM time", index, range.end_time),
        ))?;

        if start >= end {
            return Err(AvailabilityError::ValidationError(
                format!("slots[{}]: start_time must be before end_time", index),
            ));
        }
        ranges.push((start, end));
    }

    Ok(ValidatedAvailability {
        day,
        consultation_type: ConsultationMode::for_clinic(request.clinic_id.as_ref()),
        slot_duration: request.slot_duration,
        ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRangeInput;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: NaiveTime, end: NaiveTime, duration: i32) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            consultation_type: ConsultationMode::HomeVisit,
            clinic_id: None,
            day: DayOfWeek::Monday,
            start_time: start,
            end_time: end,
            slot_duration: duration,
            is_active: true,
        }
    }

    fn request(day: &str, duration: i32, slots: &[(&str, &str)]) -> UpsertAvailabilityRequest {
        UpsertAvailabilityRequest {
            day: day.to_string(),
            clinic_id: None,
            slot_duration: duration,
            slots: slots
                .iter()
                .map(|(s, e)| TimeRangeInput { start_time: s.to_string(), end_time: e.to_string() })
                .collect(),
        }
    }

    #[test]
    fn hour_window_with_twenty_minute_slots() {
        let slots = derive_slots(&[window(t(9, 0), t(10, 0), 20)]);

        assert_eq!(slots, vec![
            Slot::open(t(9, 0), t(9, 20)),
            Slot::open(t(9, 20), t(9, 40)),
            Slot::open(t(9, 40), t(10, 0)),
        ]);
    }

    #[test]
    fn remainder_is_dropped() {
        let slots = derive_slots(&[window(t(9, 0), t(10, 0), 25)]);

        assert_eq!(slots, vec![
            Slot::open(t(9, 0), t(9, 25)),
            Slot::open(t(9, 25), t(9, 50)),
        ]);
    }

    #[test]
    fn no_windows_no_slots() {
        assert!(derive_slots(&[]).is_empty());
    }

    #[test]
    fn windows_keep_iteration_order() {
        let afternoon = window(t(14, 0), t(14, 30), 15);
        let morning = window(t(9, 0), t(9, 30), 30);

        let slots = derive_slots(&[afternoon, morning]);
        let starts: Vec<NaiveTime> = slots.iter().map(|s| s.start_time).collect();

        assert_eq!(starts, vec![t(14, 0), t(14, 15), t(9, 0)]);
    }

    #[test]
    fn window_shorter_than_duration_yields_nothing() {
        assert!(derive_slots(&[window(t(9, 0), t(9, 10), 15)]).is_empty());
    }

    #[test]
    fn late_window_does_not_wrap_past_midnight() {
        let slots = derive_slots(&[window(t(23, 0), NaiveTime::from_hms_opt(23, 59, 59).unwrap(), 30)]);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].end_time, t(23, 30));
    }

    #[test]
    fn inactive_and_zero_length_windows_are_skipped() {
        let mut inactive = window(t(9, 0), t(10, 0), 20);
        inactive.is_active = false;

        assert!(derive_slots(&[inactive, window(t(9, 0), t(10, 0), 0)]).is_empty());
    }

    #[test]
    fn booked_times_are_flagged() {
        let mut slots = derive_slots(&[window(t(9, 0), t(10, 0), 20)]);
        mark_booked(&mut slots, &[t(9, 20)]);

        let booked: Vec<bool> = slots.iter().map(|s| s.is_booked).collect();
        assert_eq!(booked, vec![false, true, false]);
    }

    #[test]
    fn appointments_off_the_slot_start_do_not_book_it() {
        let mut slots = derive_slots(&[window(t(9, 0), t(10, 0), 20)]);
        mark_booked(&mut slots, &[t(9, 25), t(10, 0)]);

        assert!(slots.iter().all(|s| !s.is_booked));
    }

    #[test]
    fn invalid_day_is_rejected() {
        let result = validate_availability(&request("Funday", 30, &[("09:00", "10:00")]));
        assert_matches!(result, Err(AvailabilityError::ValidationError(msg)) if msg.contains("Funday"));
    }

    #[test]
    fn empty_ranges_and_bad_duration_are_rejected() {
        assert_matches!(
            validate_availability(&request("monday", 30, &[])),
            Err(AvailabilityError::ValidationError(_))
        );
        assert_matches!(
            validate_availability(&request("monday", 0, &[("09:00", "10:00")])),
            Err(AvailabilityError::ValidationError(_))
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let result = validate_availability(&request("monday", 30, &[("09:00", "10:00"), ("12:00", "11:00")]));
        assert_matches!(result, Err(AvailabilityError::ValidationError(msg)) if msg.contains("slots[1]"));
    }

    #[test]
    fn valid_request_is_normalized() {
        let validated = validate_availability(&request("Tuesday", 20, &[("09:00", "12:00:00")])).unwrap();

        assert_eq!(validated.day, DayOfWeek::Tuesday);
        assert_eq!(validated.consultation_type, ConsultationMode::HomeVisit);
        assert_eq!(validated.ranges, vec![(t(9, 0), t(12, 0))]);
    }
}
