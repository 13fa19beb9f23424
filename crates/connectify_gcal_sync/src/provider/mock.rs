//! In-memory calendar provider for tests.
//!
//! Keeps created events in a map, counts calls per operation and can be scripted to fail
//! the next N calls of an operation or to delay every call. Events that already exist on the
//! remote side, as seen by [`CalendarProvider::list_events`], are seeded separately.

use chrono::{DateTime, Utc};
use connectify_common::services::{
    BoxFuture, CalendarProvider, EventPayload, RemoteEvent, RemoteEventTime, TokenGrant,
};
use connectify_common::ProviderError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Provider operation, used to script failures and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Exchange,
    Refresh,
    Create,
    Update,
    Delete,
    List,
}

#[derive(Debug, Default)]
struct MockState {
    events: HashMap<String, EventPayload>,
    remote_events: Vec<RemoteEvent>,
    next_id: u64,
    calls: HashMap<MockOp, usize>,
    failures: HashMap<MockOp, VecDeque<ProviderError>>,
    delay: Option<Duration>,
    omit_refresh_token: bool,
    last_access_token: Option<String>,
}

/// In-memory [`CalendarProvider`].
#[derive(Debug, Default)]
pub struct MockCalendarProvider {
    state: Mutex<MockState>,
}

impl MockCalendarProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    /// Make the next `times` calls of `op` fail with `error`.
    pub fn fail_next(&self, op: MockOp, error: ProviderError, times: usize) {
        self.with_state(|s| {
            let queue = s.failures.entry(op).or_default();
            for _ in 0..times {
                queue.push_back(error.clone());
            }
        });
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.with_state(|s| s.delay = Some(delay));
    }

    /// Let token exchanges answer without a refresh token.
    pub fn omit_refresh_token(&self) {
        self.with_state(|s| s.omit_refresh_token = true);
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.with_state(|s| s.calls.get(&op).copied().unwrap_or(0))
    }

    pub fn event_count(&self) -> usize {
        self.with_state(|s| s.events.len())
    }

    pub fn event(&self, event_id: &str) -> Option<EventPayload> {
        self.with_state(|s| s.events.get(event_id).cloned())
    }

    /// Drop an event as if it had been deleted on the remote side.
    pub fn remove_event(&self, event_id: &str) {
        self.with_state(|s| {
            s.events.remove(event_id);
        });
    }

    /// Seed an event that `list_events` reports.
    pub fn add_remote_event(&self, event: RemoteEvent) {
        self.with_state(|s| s.remote_events.push(event));
    }

    pub fn last_access_token(&self) -> Option<String> {
        self.with_state(|s| s.last_access_token.clone())
    }

    /// Count the call and pop a scripted failure, if any.
    fn begin(&self, op: MockOp, access_token: Option<&str>) -> (Option<Duration>, Option<ProviderError>) {
        self.with_state(|s| {
            *s.calls.entry(op).or_default() += 1;
            if let Some(token) = access_token {
                s.last_access_token = Some(token.to_string());
            }
            let failure = s.failures.get_mut(&op).and_then(|q| q.pop_front());
            (s.delay, failure)
        })
    }

    async fn enter(&self, op: MockOp, access_token: Option<&str>) -> Result<(), ProviderError> {
        let (delay, failure) = self.begin(op, access_token);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl CalendarProvider for MockCalendarProvider {
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        Ok(format!("https://auth.example.test/authorize?state={}", state))
    }

    fn exchange_code(&self, code: &str) -> BoxFuture<'_, TokenGrant, ProviderError> {
        let code = code.to_string();
        Box::pin(async move {
            self.enter(MockOp::Exchange, None).await?;
            let omit = self.with_state(|s| s.omit_refresh_token);
            Ok(TokenGrant {
                access_token: format!("access-{}", code),
                refresh_token: (!omit).then(|| format!("refresh-{}", code)),
                expires_in: 3600,
            })
        })
    }

    fn refresh_token(&self, _refresh_token: &str) -> BoxFuture<'_, TokenGrant, ProviderError> {
        Box::pin(async move {
            self.enter(MockOp::Refresh, None).await?;
            let n = self.calls(MockOp::Refresh);
            Ok(TokenGrant {
                access_token: format!("refreshed-{}", n),
                refresh_token: None,
                expires_in: 3600,
            })
        })
    }

    fn create_event(
        &self,
        access_token: &str,
        _calendar_id: &str,
        event: &EventPayload,
    ) -> BoxFuture<'_, String, ProviderError> {
        let access_token = access_token.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.enter(MockOp::Create, Some(access_token.as_str())).await?;
            Ok(self.with_state(|s| {
                s.next_id += 1;
                let id = format!("evt-{}", s.next_id);
                s.events.insert(id.clone(), event);
                id
            }))
        })
    }

    fn update_event(
        &self,
        access_token: &str,
        _calendar_id: &str,
        event_id: &str,
        event: &EventPayload,
    ) -> BoxFuture<'_, String, ProviderError> {
        let access_token = access_token.to_string();
        let event_id = event_id.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.enter(MockOp::Update, Some(access_token.as_str())).await?;
            self.with_state(|s| match s.events.get_mut(&event_id) {
                Some(existing) => {
                    *existing = event;
                    Ok(event_id.clone())
                }
                None => Err(ProviderError::NotFound(event_id.clone())),
            })
        })
    }

    fn delete_event(
        &self,
        access_token: &str,
        _calendar_id: &str,
        event_id: &str,
    ) -> BoxFuture<'_, (), ProviderError> {
        let access_token = access_token.to_string();
        let event_id = event_id.to_string();
        Box::pin(async move {
            self.enter(MockOp::Delete, Some(access_token.as_str())).await?;
            self.with_state(|s| match s.events.remove(&event_id) {
                Some(_) => Ok(()),
                None => Err(ProviderError::NotFound(event_id.clone())),
            })
        })
    }

    fn list_events(
        &self,
        access_token: &str,
        _calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> BoxFuture<'_, Vec<RemoteEvent>, ProviderError> {
        let access_token = access_token.to_string();
        Box::pin(async move {
            self.enter(MockOp::List, Some(access_token.as_str())).await?;
            let in_window = |event: &RemoteEvent| match event.start {
                RemoteEventTime::At(at) => {
                    let at = at.with_timezone(&Utc);
                    at >= time_min && at < time_max
                }
                RemoteEventTime::Date(date) => {
                    date >= time_min.date_naive() && date <= time_max.date_naive()
                }
            };
            Ok(self.with_state(|s| {
                s.remote_events
                    .iter()
                    .filter(|e| in_window(*e))
                    .take(max_results as usize)
                    .cloned()
                    .collect()
            }))
        })
    }
}
