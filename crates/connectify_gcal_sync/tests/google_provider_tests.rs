//! Drives the Google provider against a local mock of the token and Calendar endpoints.

use chrono::{NaiveDate, TimeZone, Utc};
use connectify_common::{CalendarProvider, EventPayload, ProviderError, RemoteEventTime};
use connectify_config::GcalConfig;
use connectify_gcal_sync::provider::GoogleCalendarProvider;
use serde_json::json;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENTS_PATH: &str = "/calendar/v3/calendars/primary/events";

fn provider(server: &MockServer) -> GoogleCalendarProvider {
    let mut config = GcalConfig::with_client(
        "client-id",
        "client-secret",
        "https://connectify.example/api/gcal-sync/oauth/callback",
    );
    config.auth_url = format!("{}/o/oauth2/auth", server.uri());
    config.token_url = format!("{}/token", server.uri());
    config.api_base_url = format!("{}/calendar/v3/", server.uri());
    config.request_timeout_secs = 5;
    GoogleCalendarProvider::new(&config).expect("provider")
}

fn event() -> EventPayload {
    EventPayload {
        title: "Massage".to_string(),
        description: "Booking ID: 42".to_string(),
        start_utc: Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap(),
        end_utc: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
        location: Some("Str. Lipscani 1".to_string()),
        time_zone: "Europe/Bucharest".to_string(),
    }
}

#[tokio::test]
async fn test_authorization_url_requests_offline_access() {
    let server = MockServer::start().await;
    let url = provider(&server).authorization_url("abc123").unwrap();

    assert!(url.starts_with(&format!("{}/o/oauth2/auth?", server.uri())));
    assert!(url.contains("client_id=client-id"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("prompt=consent"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("state=abc123"));
    assert!(url.contains("redirect_uri=https%3A%2F%2Fconnectify.example"));
}

#[tokio::test]
async fn test_exchange_code_returns_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let grant = provider(&server).exchange_code("the-code").await.unwrap();

    assert_eq!(grant.access_token, "ya29.access");
    assert_eq!(grant.refresh_token.as_deref(), Some("1//refresh"));
    assert_eq!(grant.expires_in, 3599);
}

#[tokio::test]
async fn test_refresh_without_new_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh"
        })))
        .mount(&server)
        .await;

    let grant = provider(&server).refresh_token("1//refresh").await.unwrap();

    assert_eq!(grant.access_token, "ya29.fresh");
    assert!(grant.refresh_token.is_none());
    assert_eq!(grant.expires_in, 3600);
}

#[tokio::test]
async fn test_invalid_grant_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = provider(&server).refresh_token("revoked").await.unwrap_err();

    assert!(matches!(err, ProviderError::Auth(ref m) if m.contains("expired or revoked")));
}

#[tokio::test]
async fn test_rejected_client_secret_is_not_a_revocation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "The OAuth client was not found."
        })))
        .mount(&server)
        .await;

    let err = provider(&server).refresh_token("1//refresh").await.unwrap_err();

    assert!(matches!(
        err,
        ProviderError::Provider { status: Some(401), ref message } if message.starts_with("invalid_client")
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_token_endpoint_outage_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = provider(&server).refresh_token("r").await.unwrap_err();

    assert!(matches!(err, ProviderError::Provider { status: Some(503), .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_create_event_sends_zoned_times() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer token-1"))
        .and(body_partial_json(json!({
            "summary": "Massage",
            "location": "Str. Lipscani 1",
            "start": { "dateTime": "2026-07-01T11:00:00Z", "timeZone": "Europe/Bucharest" },
            "end": { "dateTime": "2026-07-01T12:00:00Z", "timeZone": "Europe/Bucharest" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt123" })))
        .expect(1)
        .mount(&server)
        .await;

    let id = provider(&server)
        .create_event("token-1", "primary", &event())
        .await
        .unwrap();

    assert_eq!(id, "evt123");
}

#[tokio::test]
async fn test_update_and_delete_address_the_event() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/evt123", EVENTS_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt123" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/evt123", EVENTS_PATH)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let provider = provider(&server);

    let id = provider
        .update_event("token-1", "primary", "evt123", &event())
        .await
        .unwrap();
    provider
        .delete_event("token-1", "primary", "evt123")
        .await
        .unwrap();

    assert_eq!(id, "evt123");
}

#[tokio::test]
async fn test_missing_event_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "Not Found", "errors": [{ "reason": "notFound" }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    let provider = provider(&server);

    let update = provider
        .update_event("t", "primary", "gone", &event())
        .await
        .unwrap_err();
    let delete = provider
        .delete_event("t", "primary", "gone")
        .await
        .unwrap_err();

    assert!(matches!(update, ProviderError::NotFound(ref m) if m == "Not Found"));
    assert!(matches!(delete, ProviderError::NotFound(_)));
}

#[tokio::test]
async fn test_rate_limits_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "Rate Limit Exceeded",
                "errors": [{ "reason": "rateLimitExceeded" }]
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    let provider = provider(&server);

    let forbidden = provider
        .create_event("t", "primary", &event())
        .await
        .unwrap_err();
    let too_many = provider
        .create_event("t", "primary", &event())
        .await
        .unwrap_err();

    assert!(matches!(forbidden, ProviderError::RateLimited(_)));
    assert!(matches!(too_many, ProviderError::RateLimited(_)));
    assert!(too_many.is_retryable());
}

#[tokio::test]
async fn test_rejected_token_and_bad_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer valid"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "Invalid start time." }
        })))
        .mount(&server)
        .await;
    let provider = provider(&server);

    let auth = provider
        .create_event("expired", "primary", &event())
        .await
        .unwrap_err();
    let payload = provider
        .create_event("valid", "primary", &event())
        .await
        .unwrap_err();

    assert!(matches!(auth, ProviderError::Auth(_)));
    assert!(!auth.is_retryable());
    assert!(matches!(payload, ProviderError::Payload(ref m) if m == "Invalid start time."));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "late" }))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    let mut config = GcalConfig::with_client("id", "secret", "https://example.test/cb");
    config.api_base_url = format!("{}/calendar/v3", server.uri());
    config.request_timeout_secs = 1;
    let provider = GoogleCalendarProvider::new(&config).unwrap();

    let err = provider
        .create_event("t", "primary", &event())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Provider { status: None, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_list_events_follows_pages_and_drops_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer token-1"))
        .and(query_param("timeMin", "2026-07-01T00:00:00Z"))
        .and(query_param("timeMax", "2026-08-01T00:00:00Z"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "evt-a",
                    "summary": "Ana Pop tel 0722 123 456",
                    "start": { "dateTime": "2026-07-02T10:00:00+03:00", "timeZone": "Europe/Bucharest" },
                    "end": { "dateTime": "2026-07-02T11:00:00+03:00", "timeZone": "Europe/Bucharest" }
                },
                {
                    "id": "evt-b",
                    "summary": "Holiday",
                    "start": { "date": "2026-07-03" },
                    "end": { "date": "2026-07-04" }
                }
            ],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "evt-c", "status": "cancelled" },
                {
                    "id": "evt-d",
                    "description": "Client: Ion",
                    "start": { "dateTime": "2026-07-05T09:30:00Z" },
                    "end": { "dateTime": "2026-07-05T10:00:00Z" }
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let events = provider(&server)
        .list_events(
            "token-1",
            "primary",
            Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
            100,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["evt-a", "evt-b", "evt-d"]);
    assert_eq!(
        events[0].start.instant(),
        Some(Utc.with_ymd_and_hms(2026, 7, 2, 7, 0, 0).unwrap())
    );
    assert_eq!(
        events[1].start,
        RemoteEventTime::Date(NaiveDate::from_ymd_opt(2026, 7, 3).unwrap())
    );
    assert_eq!(events[2].description.as_deref(), Some("Client: Ion"));
    assert!(events[2].summary.is_none());
}

#[tokio::test]
async fn test_list_events_with_rejected_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 401, "message": "Invalid Credentials" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .list_events(
            "stale",
            "primary",
            Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
            100,
        )
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::Auth("Invalid Credentials".to_string()));
}
