use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Datelike, Duration, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::{SchedulingError, SlotConflictKind};
use scheduling_cell::router::appointment_routes;
use scheduling_cell::services::SchedulingService;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseRows, TestConfig, TestUser};

fn test_app(config: &TestConfig) -> Router {
    appointment_routes(config.to_arc())
}

/// A weekday at least a week out, so bookings are comfortably in the
/// future and outside any cancellation window.
fn future_date() -> chrono::NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(7);
    while date.weekday() == chrono::Weekday::Sat || date.weekday() == chrono::Weekday::Sun {
        date = date.succ_opt().unwrap();
    }
    date
}

async fn mount_provider_and_template(
    mock_server: &MockServer,
    provider_id: Uuid,
    verified: bool,
    accepting: bool,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseRows::provider_row(&provider_id.to_string(), verified, accepting, 75.0)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseRows::template_row(&provider_id.to_string())
        ])))
        .mount(mock_server)
        .await;
}

async fn mount_notifications_sink(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

fn booking_body(patient_id: Uuid, provider_id: Uuid, date: chrono::NaiveDate, time: &str) -> Value {
    json!({
        "patient_id": patient_id,
        "provider_id": provider_id,
        "date": date.to_string(),
        "time": time,
        "duration_minutes": 30,
        "appointment_type": "initial_consultation",
        "reason": "Recurring headaches",
    })
}

async fn post_booking(app: Router, token: &str, body: &Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn lists_available_slots_minus_active_bookings() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let date = future_date();

    mount_provider_and_template(&mock_server, provider_id, true, true).await;

    // One active booking at 09:30 held against the grid.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .and(query_param("date", format!("eq.{}", date)))
        .and(query_param("status", "in.(scheduled,confirmed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseRows::appointment_row(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &provider_id.to_string(),
                &date.to_string(),
                "09:30",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);

    let response = test_app(&config)
        .oneshot(
            Request::builder()
                .uri(format!("/slots?provider_id={}&date={}", provider_id, date))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    let slots: Vec<String> = body["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap().to_string())
        .collect();

    assert!(slots.contains(&"09:00".to_string()));
    assert!(!slots.contains(&"09:30".to_string()), "booked slot must be excluded");
    // The 12:00-13:00 break is never offered.
    assert!(!slots.contains(&"12:00".to_string()));
    assert!(!slots.contains(&"12:30".to_string()));
}

#[tokio::test]
async fn books_an_appointment_into_scheduled() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let date = future_date();

    mount_provider_and_template(&mock_server, provider_id, true, true).await;
    mount_notifications_sink(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseRows::appointment_row(
                &Uuid::new_v4().to_string(),
                &patient.id,
                &provider_id.to_string(),
                &date.to_string(),
                "09:00",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);
    let body = booking_body(patient_id, provider_id, date, "09:00");
    let (status, response) = post_booking(test_app(&config), &token, &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["appointment"]["status"], json!("scheduled"));
    assert_eq!(response["appointment"]["payment_status"], json!("pending"));
}

#[tokio::test]
async fn provider_slot_conflict_returns_409() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let date = future_date();

    mount_provider_and_template(&mock_server, provider_id, true, true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"uq_appointments_provider_slot_active\""
        })))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);
    let body = booking_body(patient_id, provider_id, date, "09:00");
    let (status, response) = post_booking(test_app(&config), &token, &body).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["code"], json!("conflict"));
    assert!(response["error"].as_str().unwrap().contains("provider"));
}

#[tokio::test]
async fn patient_double_booking_is_distinguished() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let date = future_date();

    mount_provider_and_template(&mock_server, provider_id, true, true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"uq_appointments_patient_slot_active\""
        })))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);
    let body = booking_body(patient_id, provider_id, date, "09:00");
    let (status, response) = post_booking(test_app(&config), &token, &body).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(response["error"].as_str().unwrap().contains("patient"));
}

/// N concurrent reserves on the same slot: the constraint admits exactly
/// one insert; everyone else sees ProviderSlotTaken. The mock plays the
/// database's role by honouring the first insert and rejecting the rest.
#[tokio::test]
async fn concurrent_reserves_have_a_single_winner() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let date = future_date();

    mount_provider_and_template(&mock_server, provider_id, true, true).await;
    mount_notifications_sink(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseRows::appointment_row(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &provider_id.to_string(),
                &date.to_string(),
                "09:00",
                "scheduled",
            )
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"uq_appointments_provider_slot_active\""
        })))
        .mount(&mock_server)
        .await;

    let app_config = config.to_app_config();
    let calls = (0..5).map(|_| {
        let config = app_config.clone();
        let date = date;
        async move {
            let service = SchedulingService::new(&config);
            let request = serde_json::from_value(booking_body(
                Uuid::new_v4(),
                provider_id,
                date,
                "09:00",
            ))
            .unwrap();
            service.book_appointment(request, "test-token").await
        }
    });

    let outcomes = join_all(calls).await;
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(SchedulingError::SlotConflict(SlotConflictKind::ProviderSlotTaken))
            )
        })
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 4);
}

#[tokio::test]
async fn rejects_a_time_off_the_slot_grid() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let date = future_date();

    mount_provider_and_template(&mock_server, provider_id, true, true).await;

    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);

    // 09:10 is not on the 30-minute grid; 12:00 is inside the break.
    for time in ["09:10", "12:00"] {
        let body = booking_body(patient_id, provider_id, date, time);
        let (status, response) = post_booking(test_app(&config), &token, &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "time {} must be rejected", time);
        assert_eq!(response["code"], json!("validation"));
    }
}

#[tokio::test]
async fn rejects_provider_not_accepting_new_patients() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();

    mount_provider_and_template(&mock_server, provider_id, true, false).await;

    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);
    let body = booking_body(patient_id, provider_id, future_date(), "09:00");
    let (status, response) = post_booking(test_app(&config), &token, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"]
        .as_str()
        .unwrap()
        .contains("not accepting new patients"));
}

#[tokio::test]
async fn rejects_out_of_range_duration_and_empty_reason() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let date = future_date();

    mount_provider_and_template(&mock_server, provider_id, true, true).await;

    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);

    let mut too_long = booking_body(patient_id, provider_id, date, "09:00");
    too_long["duration_minutes"] = json!(180);
    let (status, _) = post_booking(test_app(&config), &token, &too_long).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut no_reason = booking_body(patient_id, provider_id, date, "09:00");
    no_reason["reason"] = json!("   ");
    let (status, _) = post_booking(test_app(&config), &token, &no_reason).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_provider_returns_404() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);

    let body = booking_body(patient_id, provider_id, future_date(), "09:00");
    let (status, _) = post_booking(test_app(&config), &token, &body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = test_app(&config)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/slots?provider_id={}&date={}",
                    provider_id,
                    future_date()
                ))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patients_cannot_book_for_someone_else() {
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&patient, &config.jwt_secret);

    // A different patient's id in the body.
    let body = booking_body(Uuid::new_v4(), Uuid::new_v4(), future_date(), "09:00");
    let (status, _) = post_booking(test_app(&config), &token, &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
