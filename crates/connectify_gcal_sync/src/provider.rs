//! Google Calendar implementation of the [`CalendarProvider`] trait.
//!
//! Talks to the OAuth token endpoint and the Calendar v3 events API over plain HTTPS with
//! `reqwest`. Every request runs under the configured timeout. Failures are classified into
//! [`ProviderError`] variants so the worker can decide between retrying and giving up.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use connectify_common::services::{
    BoxFuture, CalendarProvider, EventPayload, RemoteEvent, RemoteEventTime, TokenGrant,
};
use connectify_common::{create_client, ProviderError};
use connectify_config::GcalConfig;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

/// Token lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// Largest page the events list endpoint hands out.
const MAX_PAGE_SIZE: u32 = 250;

/// Google Calendar provider
#[derive(Debug, Clone)]
pub struct GoogleCalendarProvider {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    api_base_url: String,
    scope: String,
}

impl GoogleCalendarProvider {
    /// Create a provider from the OAuth client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Provider`] if the HTTP client cannot be built.
    pub fn new(config: &GcalConfig) -> Result<Self, ProviderError> {
        let client = create_client(config.request_timeout_secs, false).map_err(|e| {
            ProviderError::provider(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            scope: config.scope.clone(),
        })
    }

    /// `{api}/calendars/{calendar_id}/events[/{event_id}]` with each segment escaped.
    fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.api_base_url)
            .map_err(|e| ProviderError::provider(format!("Invalid API base URL: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ProviderError::provider("API base URL cannot carry a path"))?;
            segments.pop_if_empty().push("calendars").push(calendar_id).push("events");
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status, &body));
        }

        let token: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::provider(format!("Failed to parse token response: {}", e)))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_in: token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        })
    }

    async fn send_event(
        &self,
        request: reqwest::RequestBuilder,
        access_token: &str,
        event: &EventPayload,
    ) -> Result<String, ProviderError> {
        let response = request
            .bearer_auth(access_token)
            .json(&GoogleEvent::from_payload(event))
            .send()
            .await
            .map_err(transport_error)?;

        let response = ensure_success(response).await?;
        let created: GoogleEventResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::provider(format!("Failed to parse event response: {}", e)))?;
        Ok(created.id)
    }
}

impl CalendarProvider for GoogleCalendarProvider {
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scope.as_str()),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ];
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| ProviderError::provider(format!("Failed to encode auth URL: {}", e)))?;
        let separator = if self.auth_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", self.auth_url, separator, query))
    }

    fn exchange_code(&self, code: &str) -> BoxFuture<'_, TokenGrant, ProviderError> {
        let code = code.to_string();
        Box::pin(async move {
            debug!("Exchanging authorization code for tokens");
            let grant = self
                .token_request(&[
                    ("code", code.as_str()),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("redirect_uri", self.redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                ])
                .await?;
            if grant.refresh_token.is_none() {
                info!("Token exchange returned no refresh token; the stored one stays in use");
            }
            Ok(grant)
        })
    }

    fn refresh_token(&self, refresh_token: &str) -> BoxFuture<'_, TokenGrant, ProviderError> {
        let refresh_token = refresh_token.to_string();
        Box::pin(async move {
            debug!("Refreshing access token");
            self.token_request(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .await
        })
    }

    fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventPayload,
    ) -> BoxFuture<'_, String, ProviderError> {
        let access_token = access_token.to_string();
        let calendar_id = calendar_id.to_string();
        let event = event.clone();
        Box::pin(async move {
            let url = self.events_url(&calendar_id, None)?;
            let id = self
                .send_event(self.client.post(url), &access_token, &event)
                .await?;
            debug!("Created remote event {} in calendar {}", id, calendar_id);
            Ok(id)
        })
    }

    fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &EventPayload,
    ) -> BoxFuture<'_, String, ProviderError> {
        let access_token = access_token.to_string();
        let calendar_id = calendar_id.to_string();
        let event_id = event_id.to_string();
        let event = event.clone();
        Box::pin(async move {
            let url = self.events_url(&calendar_id, Some(event_id.as_str()))?;
            let id = self
                .send_event(self.client.put(url), &access_token, &event)
                .await?;
            debug!("Updated remote event {} in calendar {}", id, calendar_id);
            Ok(id)
        })
    }

    fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> BoxFuture<'_, (), ProviderError> {
        let access_token = access_token.to_string();
        let calendar_id = calendar_id.to_string();
        let event_id = event_id.to_string();
        Box::pin(async move {
            let url = self.events_url(&calendar_id, Some(event_id.as_str()))?;
            let response = self
                .client
                .delete(url)
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(transport_error)?;
            ensure_success(response).await?;
            debug!("Deleted remote event {} from calendar {}", event_id, calendar_id);
            Ok(())
        })
    }

    fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> BoxFuture<'_, Vec<RemoteEvent>, ProviderError> {
        let access_token = access_token.to_string();
        let calendar_id = calendar_id.to_string();
        Box::pin(async move {
            let url = self.events_url(&calendar_id, None)?;
            let time_min = time_min.to_rfc3339_opts(SecondsFormat::Secs, true);
            let time_max = time_max.to_rfc3339_opts(SecondsFormat::Secs, true);
            let limit = usize::try_from(max_results).unwrap_or(usize::MAX);

            let mut events = Vec::new();
            let mut page_token: Option<String> = None;
            while events.len() < limit {
                let page_size = (limit - events.len()).min(MAX_PAGE_SIZE as usize).to_string();
                let request = {
                    let mut query = vec![
                        ("timeMin", time_min.as_str()),
                        ("timeMax", time_max.as_str()),
                        ("singleEvents", "true"),
                        ("orderBy", "startTime"),
                        ("maxResults", page_size.as_str()),
                    ];
                    if let Some(token) = page_token.as_deref() {
                        query.push(("pageToken", token));
                    }
                    self.client
                        .get(url.clone())
                        .bearer_auth(&access_token)
                        .query(&query)
                };
                let response = request.send().await.map_err(transport_error)?;
                let response = ensure_success(response).await?;
                let page: GoogleEventList = response.json().await.map_err(|e| {
                    ProviderError::provider(format!("Failed to parse event list: {}", e))
                })?;

                for item in page.items {
                    let id = item.id.clone();
                    match item.into_remote() {
                        Some(event) => events.push(event),
                        None => debug!("Ignoring cancelled or undated remote event {}", id),
                    }
                }
                match page.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }
            events.truncate(limit);
            debug!("Listed {} remote events from calendar {}", events.len(), calendar_id);
            Ok(events)
        })
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        warn!("Calendar provider request timed out: {}", err);
        ProviderError::provider(format!("Request timed out: {}", err))
    } else {
        ProviderError::provider(format!("Request failed: {}", err))
    }
}

async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_api_error(status, &body))
}

/// Map a failed Calendar API response onto a [`ProviderError`].
pub fn classify_api_error(status: StatusCode, body: &str) -> ProviderError {
    let detail = GoogleApiError::parse(body);
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Auth(message),
        StatusCode::FORBIDDEN => {
            let rate_limited = detail.map(|d| d.mentions_rate_limit()).unwrap_or(false)
                || mentions_rate_limit(body);
            if rate_limited {
                ProviderError::RateLimited(message)
            } else {
                ProviderError::Auth(message)
            }
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => ProviderError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
        StatusCode::BAD_REQUEST => ProviderError::Payload(message),
        _ => ProviderError::Provider {
            status: Some(status.as_u16()),
            message,
        },
    }
}

/// Map a failed token endpoint response onto a [`ProviderError`].
///
/// Only `invalid_grant` means the code or refresh token is expired, used or revoked. Client
/// errors such as `invalid_client` point at our own OAuth configuration and leave the stored
/// grant untouched.
pub fn classify_token_error(status: StatusCode, body: &str) -> ProviderError {
    let detail: Option<GoogleTokenError> = serde_json::from_str(body).ok();
    let code = detail.as_ref().map(|d| d.error.as_str()).unwrap_or_default();
    let message = detail
        .as_ref()
        .and_then(|d| d.error_description.clone())
        .unwrap_or_else(|| format!("token endpoint returned HTTP {}", status.as_u16()));

    match (status, code) {
        (_, "invalid_grant") => {
            ProviderError::Auth(format!("Grant expired, used or revoked: {}", message))
        }
        (StatusCode::TOO_MANY_REQUESTS, _) => ProviderError::RateLimited(message),
        (_, "invalid_client" | "unauthorized_client") => {
            error!("OAuth client rejected by token endpoint ({}): {}", code, message);
            ProviderError::Provider {
                status: Some(status.as_u16()),
                message: format!("{}: {}", code, message),
            }
        }
        _ => ProviderError::Provider {
            status: Some(status.as_u16()),
            message: if code.is_empty() {
                message
            } else {
                format!("{}: {}", code, message)
            },
        },
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("rate") || lower.contains("quota")
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenError {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleApiErrorEnvelope {
    error: GoogleApiError,
}

#[derive(Debug, Deserialize)]
struct GoogleApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleApiErrorItem {
    #[serde(default)]
    reason: String,
}

impl GoogleApiError {
    fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<GoogleApiErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error)
    }

    fn mentions_rate_limit(&self) -> bool {
        mentions_rate_limit(&self.message)
            || self.errors.iter().any(|e| mentions_rate_limit(&e.reason))
    }
}

#[derive(Debug, Serialize)]
struct GoogleEvent {
    summary: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    start: GoogleEventTime,
    end: GoogleEventTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventTime {
    date_time: String,
    time_zone: String,
}

impl GoogleEventTime {
    fn new(instant: DateTime<Utc>, time_zone: &str) -> Self {
        Self {
            date_time: instant.to_rfc3339_opts(SecondsFormat::Secs, true),
            time_zone: time_zone.to_string(),
        }
    }
}

impl GoogleEvent {
    fn from_payload(event: &EventPayload) -> Self {
        Self {
            summary: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: GoogleEventTime::new(event.start_utc, &event.time_zone),
            end: GoogleEventTime::new(event.end_utc, &event.time_zone),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEventResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventList {
    #[serde(default)]
    items: Vec<GoogleEventItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventItem {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<GoogleEventBoundary>,
    end: Option<GoogleEventBoundary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventBoundary {
    date_time: Option<DateTime<FixedOffset>>,
    date: Option<NaiveDate>,
}

impl GoogleEventBoundary {
    fn into_time(self) -> Option<RemoteEventTime> {
        self.date_time
            .map(RemoteEventTime::At)
            .or(self.date.map(RemoteEventTime::Date))
    }
}

impl GoogleEventItem {
    fn into_remote(self) -> Option<RemoteEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        Some(RemoteEvent {
            id: self.id,
            summary: self.summary,
            description: self.description,
            location: self.location,
            start: self.start?.into_time()?,
            end: self.end?.into_time()?,
        })
    }
}
