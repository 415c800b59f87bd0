use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::*;
use appointment_cell::services::{AppointmentQueryService, AppointmentStatusService, ContactService, ReminderService};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn status_request(status: &str) -> UpdateStatusRequest {
    UpdateStatusRequest {
        status: status.to_string(),
        reason: None,
        appointment_date: None,
        appointment_time: None,
    }
}

async fn mock_appointment(mock_server: &MockServer, row: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(mock_server)
        .await;
}

// ==============================================================================
// STATUS UPDATES
// ==============================================================================

#[tokio::test]
async fn unchanged_status_is_still_audited() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::default().to_app_config();
    let config = shared_config::AppConfig { supabase_url: mock_server.uri(), ..config };
    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mock_appointment(
        &mock_server,
        MockSupabaseResponses::appointment_response(&appointment_id, &patient.id, &Uuid::new_v4().to_string()),
    ).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_appointment_status"))
        .and(body_partial_json(json!({
            "p_appointment_id": appointment_id,
            "p_status": "pending",
            "p_changed_by": patient.id,
            "p_date": null
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": appointment_id,
            "previous_status": "pending",
            "status": "pending"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentStatusService::new(&config);
    let transition = service
        .update_appointment_status(&appointment_id, status_request("pending"), &patient.to_user(), "test_token")
        .await
        .unwrap();

    assert_eq!(transition.previous_status, AppointmentStatus::Pending);
    assert_eq!(transition.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn reschedule_without_new_time_is_rejected_up_front() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let patient = TestUser::patient("patient@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut request = status_request("rescheduled");
    request.appointment_date = Some("2030-03-06".to_string());

    let service = AppointmentStatusService::new(&config);
    let result = service
        .update_appointment_status(&Uuid::new_v4().to_string(), request, &patient.to_user(), "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::ValidationError(msg)) if msg.contains("appointment_time"));
}

#[tokio::test]
async fn reschedule_sends_new_slot_and_default_reason() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::default().to_app_config();
    let config = shared_config::AppConfig { supabase_url: mock_server.uri(), ..config };
    let doctor = TestUser::doctor("doctor@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mock_appointment(
        &mock_server,
        MockSupabaseResponses::appointment_response(&appointment_id, &Uuid::new_v4().to_string(), &doctor.id),
    ).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_appointment_status"))
        .and(body_partial_json(json!({
            "p_status": "rescheduled",
            "p_reason": "Rescheduled",
            "p_date": "2030-03-06",
            "p_time": "10:40:00"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": appointment_id,
            "previous_status": "pending",
            "status": "rescheduled"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut request = status_request("rescheduled");
    request.appointment_date = Some("2030-03-06".to_string());
    request.appointment_time = Some("10:40".to_string());

    let service = AppointmentStatusService::new(&config);
    let transition = service
        .update_appointment_status(&appointment_id, request, &doctor.to_user(), "test_token")
        .await
        .unwrap();

    assert_eq!(transition.status, AppointmentStatus::Rescheduled);
}

#[tokio::test]
async fn reschedule_into_taken_slot_is_a_conflict() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::default().to_app_config();
    let config = shared_config::AppConfig { supabase_url: mock_server.uri(), ..config };
    let admin = TestUser::admin("admin@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mock_appointment(
        &mock_server,
        MockSupabaseResponses::appointment_response(&appointment_id, &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string()),
    ).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_appointment_status"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation("appointments_active_slot_key"),
        ))
        .mount(&mock_server)
        .await;

    let mut request = status_request("rescheduled");
    request.appointment_date = Some("2030-03-06".to_string());
    request.appointment_time = Some("10:40".to_string());

    let service = AppointmentStatusService::new(&config);
    let result = service
        .update_appointment_status(&appointment_id, request, &admin.to_user(), "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn strangers_cannot_change_status() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let other_patient = TestUser::patient("other@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mock_appointment(
        &mock_server,
        MockSupabaseResponses::appointment_response(&appointment_id, &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string()),
    ).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_appointment_status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = AppointmentStatusService::new(&config);
    let result = service
        .update_appointment_status(&appointment_id, status_request("cancelled"), &other_patient.to_user(), "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));
}

#[tokio::test]
async fn missing_appointment_is_not_found() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let admin = TestUser::admin("admin@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = AppointmentStatusService::new(&config);
    let result = service
        .update_appointment_status(&Uuid::new_v4().to_string(), status_request("confirmed"), &admin.to_user(), "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn status_change_notifies_patient_and_doctor() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    let patient_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();

    mock_appointment(
        &mock_server,
        MockSupabaseResponses::appointment_response(&appointment_id, &patient_id, &doctor.id),
    ).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id),
            MockSupabaseResponses::doctor_response(&doctor.id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_appointment_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": appointment_id,
            "previous_status": "pending",
            "status": "confirmed"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/email"))
        .and(body_partial_json(json!({ "subject": "Appointment confirmed" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = AppointmentStatusService::new(&config);
    let result = service
        .update_appointment_status(&appointment_id, status_request("confirmed"), &doctor.to_user(), "test_token")
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn status_notice_uses_the_booked_home_visit_address() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let admin = TestUser::admin("admin@example.com");
    let patient_id = Uuid::new_v4().to_string();
    let doctor_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();

    mock_appointment(
        &mock_server,
        MockSupabaseResponses::appointment_response(&appointment_id, &patient_id, &doctor_id),
    ).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id),
            MockSupabaseResponses::doctor_response(&doctor_id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_addresses"))
        .and(query_param("appointment_id", format!("in.({})", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "appointment_id": appointment_id,
            "address_line1": "99 Booked Road",
            "address_line2": null,
            "city": "Pune",
            "state": "MH",
            "country": "India",
            "pin_code": "411003"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_appointment_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": appointment_id,
            "previous_status": "pending",
            "status": "confirmed"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/email"))
        .and(body_string_contains("Address: 99 Booked Road"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = AppointmentStatusService::new(&config);
    let result = service
        .update_appointment_status(&appointment_id, status_request("confirmed"), &admin.to_user(), "test_token")
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn patient_acting_as_own_caregiver_fills_both_roles() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let caregiver = TestUser::caregiver("self@example.com");
    let doctor_id = Uuid::new_v4().to_string();

    let mut row = MockSupabaseResponses::appointment_response(&Uuid::new_v4().to_string(), &caregiver.id, &doctor_id);
    row["caregiver_id"] = json!(caregiver.id);
    let appointment: Appointment = serde_json::from_value(row).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&caregiver.id),
            MockSupabaseResponses::doctor_response(&doctor_id)
        ])))
        .mount(&mock_server)
        .await;

    let participants = ContactService::new(&config)
        .participants_for(&appointment, "test_token")
        .await
        .unwrap();

    assert_eq!(participants.patient.unwrap().id.to_string(), caregiver.id);
    assert_eq!(participants.caregiver.unwrap().id.to_string(), caregiver.id);
    assert!(participants.doctor.is_some());
}

// ==============================================================================
// FETCH AND LIST
// ==============================================================================

#[tokio::test]
async fn patient_listing_is_scoped_and_paginated() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient.id)))
        .and(query_param("order", "appointment_date.desc,appointment_time.desc"))
        .and(query_param("limit", "5"))
        .and(query_param("offset", "5"))
        .and(query_param("status", "eq.pending"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "5-5/6")
                .set_body_json(json!([
                    MockSupabaseResponses::appointment_response(&appointment_id, &patient.id, &Uuid::new_v4().to_string())
                ])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_addresses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "appointment_id": appointment_id,
            "address_line1": "99 Hill Road",
            "address_line2": null,
            "city": "Pune",
            "state": "MH",
            "country": "India",
            "pin_code": "411004"
        }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient.id)
        ])))
        .mount(&mock_server)
        .await;

    let query = ListAppointmentsQuery {
        page: Some(2),
        limit: Some(5),
        status: Some("pending".to_string()),
        // Ignored for patients
        doctor_id: Some(Uuid::new_v4()),
        ..Default::default()
    };

    let service = AppointmentQueryService::new(&config);
    let page = service.list_appointments(query, &patient.to_user(), "test_token").await.unwrap();

    assert_eq!(page.total, 6);
    assert_eq!(page.page, 2);
    assert_eq!(page.limit, 5);
    assert_eq!(page.items.len(), 1);

    let visit = page.items[0].visit_address.as_ref().unwrap();
    assert_eq!(visit.source, AddressSource::Appointment);
    assert_eq!(visit.formatted, "99 Hill Road, Pune, MH, India, 411004");
}

#[tokio::test]
async fn oversized_page_is_rejected_without_querying() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let admin = TestUser::admin("admin@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let query = ListAppointmentsQuery { limit: Some(500), ..Default::default() };
    let service = AppointmentQueryService::new(&config);
    let result = service.list_appointments(query, &admin.to_user(), "test_token").await;

    assert_matches!(result, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn clinic_visit_resolves_to_clinic_address() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let clinic = TestUser::clinic("clinic@example.com");
    let patient_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();

    let mut row = MockSupabaseResponses::appointment_response(&appointment_id, &patient_id, &Uuid::new_v4().to_string());
    row["consultation_type"] = json!("clinic_visit");
    row["clinic_id"] = json!(clinic.id);
    mock_appointment(&mock_server, row).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_addresses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::clinic_response(&clinic.id)
        ])))
        .mount(&mock_server)
        .await;

    let service = AppointmentQueryService::new(&config);
    let view = service.get_appointment(&appointment_id, &clinic.to_user(), "test_token").await.unwrap();

    assert!(view.address.is_none());
    let visit = view.visit_address.unwrap();
    assert_eq!(visit.source, AddressSource::Clinic);
    assert_eq!(visit.formatted, "4 River Road, Floor 2, Pune, MH, India, 411002");
}

#[tokio::test]
async fn other_doctors_cannot_view_an_appointment() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mock_appointment(
        &mock_server,
        MockSupabaseResponses::appointment_response(&appointment_id, &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string()),
    ).await;

    let service = AppointmentQueryService::new(&config);
    let result = service.get_appointment(&appointment_id, &doctor.to_user(), "test_token").await;

    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));
}

// ==============================================================================
// REMINDERS
// ==============================================================================

async fn mock_due_reminder(mock_server: &MockServer, appointment_id: &str, patient_id: &str, doctor_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_date", "eq.2030-03-05"))
        .and(query_param("status", "in.(pending,confirmed)"))
        .and(query_param("reminder_sent", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(appointment_id, patient_id, doctor_id)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(patient_id),
            MockSupabaseResponses::doctor_response(doctor_id)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_addresses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn reminders_are_marked_once_delivered() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let appointment_id = Uuid::new_v4().to_string();

    mock_due_reminder(&mock_server, &appointment_id, &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string()).await;

    Mock::given(method("POST"))
        .and(path("/email"))
        .and(body_partial_json(json!({ "subject": "Appointment reminder" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_json(json!({ "reminder_sent": true })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = ReminderService::new(&config);
    let reminded = service.run_once(NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()).await.unwrap();

    assert_eq!(reminded, 1);
}

#[tokio::test]
async fn failed_reminder_is_left_for_the_next_pass() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let appointment_id = Uuid::new_v4().to_string();

    mock_due_reminder(&mock_server, &appointment_id, &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string()).await;

    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = ReminderService::new(&config);
    let reminded = service.run_once(NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()).await.unwrap();

    assert_eq!(reminded, 0);
}

#[tokio::test]
async fn reminders_are_skipped_without_email() {
    let config = TestConfig::default().to_app_config();

    let service = ReminderService::new(&config);
    let reminded = service.run_once(NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()).await.unwrap();

    assert_eq!(reminded, 0);
}
