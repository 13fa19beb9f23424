#[cfg(test)]
mod tests {
    use crate::credentials::{CredentialManager, CredentialSettings};
    use crate::error::CredentialError;
    use crate::provider::mock::{MockCalendarProvider, MockOp};
    use chrono::{Duration, Utc};
    use connectify_common::models::CredentialStatus;
    use connectify_common::{CalendarProvider, ProviderError};
    use connectify_db::{CredentialRepository, DbClient, SqlCredentialRepository};
    use std::sync::Arc;

    struct Fixture {
        manager: Arc<CredentialManager>,
        repo: SqlCredentialRepository,
        provider: Arc<MockCalendarProvider>,
    }

    async fn fixture() -> Fixture {
        let client = DbClient::from_url("sqlite::memory:")
            .await
            .expect("in-memory database");
        let repo = SqlCredentialRepository::new(client);
        repo.init_schema().await.expect("schema");

        let provider = Arc::new(MockCalendarProvider::new());
        let dyn_provider: Arc<dyn CalendarProvider> = provider.clone();
        let manager = Arc::new(CredentialManager::new(
            repo.clone(),
            dyn_provider,
            CredentialSettings::default(),
        ));
        Fixture {
            manager,
            repo,
            provider,
        }
    }

    async fn pending_state(repo: &SqlCredentialRepository, specialist_id: i64) -> String {
        repo.find_by_specialist(specialist_id)
            .await
            .unwrap()
            .and_then(|c| c.oauth_state)
            .expect("pending state")
    }

    async fn connect(f: &Fixture, specialist_id: i64) {
        f.manager.begin_authorization(specialist_id).await.unwrap();
        let state = pending_state(&f.repo, specialist_id).await;
        f.manager
            .complete_authorization(specialist_id, &state, "code")
            .await
            .unwrap();
    }

    /// Overwrite the stored access token so it expires `in_minutes` from now.
    async fn expire_in(f: &Fixture, specialist_id: i64, in_minutes: i64) {
        let now = Utc::now();
        let stored = f
            .repo
            .store_refreshed_token(
                specialist_id,
                "old-token",
                None,
                now + Duration::minutes(in_minutes),
                now,
            )
            .await
            .unwrap();
        assert!(stored);
    }

    #[tokio::test]
    async fn test_begin_authorization_stores_pending_state() {
        let f = fixture().await;

        let url = f.manager.begin_authorization(7).await.unwrap();
        let state = pending_state(&f.repo, 7).await;

        assert_eq!(state.len(), 32);
        assert!(url.contains(&format!("state={}", state)));
        assert!(url.contains("&cache_bust="));
        let status = f.manager.status(7).await.unwrap();
        assert!(status.authorization_pending);
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn test_each_authorization_uses_a_new_state() {
        let f = fixture().await;

        f.manager.begin_authorization(7).await.unwrap();
        let first = pending_state(&f.repo, 7).await;
        f.manager.begin_authorization(7).await.unwrap();
        let second = pending_state(&f.repo, 7).await;

        assert_ne!(first, second);
        let result = f.manager.complete_authorization(7, &first, "code").await;
        assert!(matches!(result, Err(CredentialError::StateMismatch)));
        assert_eq!(f.provider.calls(MockOp::Exchange), 0);
    }

    #[tokio::test]
    async fn test_complete_authorization_activates_credential() {
        let f = fixture().await;
        f.manager.begin_authorization(7).await.unwrap();
        let state = pending_state(&f.repo, 7).await;

        let credential = f
            .manager
            .complete_authorization(7, &state, "abc")
            .await
            .unwrap();

        assert_eq!(credential.status, CredentialStatus::Active);
        assert_eq!(credential.access_token.as_deref(), Some("access-abc"));
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-abc"));
        assert!(credential.oauth_state.is_none());
        assert!(f.manager.is_connected(7).await.unwrap());
    }

    #[tokio::test]
    async fn test_state_cannot_be_redeemed_twice() {
        let f = fixture().await;
        f.manager.begin_authorization(7).await.unwrap();
        let state = pending_state(&f.repo, 7).await;

        f.manager
            .complete_authorization(7, &state, "abc")
            .await
            .unwrap();
        let replay = f.manager.complete_authorization(7, &state, "abc").await;

        assert!(matches!(replay, Err(CredentialError::StateMismatch)));
        assert_eq!(f.provider.calls(MockOp::Exchange), 1);
    }

    #[tokio::test]
    async fn test_complete_by_state_resolves_specialist() {
        let f = fixture().await;
        f.manager.begin_authorization(11).await.unwrap();
        let state = pending_state(&f.repo, 11).await;

        let unknown = f
            .manager
            .complete_authorization_by_state("not-a-state", "abc")
            .await;
        assert!(matches!(unknown, Err(CredentialError::StateMismatch)));

        let credential = f
            .manager
            .complete_authorization_by_state(&state, "abc")
            .await
            .unwrap();
        assert_eq!(credential.specialist_id, 11);
    }

    #[tokio::test]
    async fn test_stale_pending_state_is_rejected() {
        let f = fixture().await;
        f.repo
            .start_pending(7, "old-state", "primary", Utc::now() - Duration::hours(2))
            .await
            .unwrap();

        let result = f
            .manager
            .complete_authorization(7, "old-state", "abc")
            .await;

        assert!(matches!(result, Err(CredentialError::StateMismatch)));
        assert_eq!(f.provider.calls(MockOp::Exchange), 0);

        // A fresh attempt still works
        connect(&f, 7).await;
        assert!(f.manager.is_connected(7).await.unwrap());
    }

    #[tokio::test]
    async fn test_exchange_failure_keeps_pending() {
        let f = fixture().await;
        f.provider.fail_next(
            MockOp::Exchange,
            ProviderError::Auth("invalid_grant".to_string()),
            1,
        );
        f.manager.begin_authorization(7).await.unwrap();
        let state = pending_state(&f.repo, 7).await;

        let result = f.manager.complete_authorization(7, &state, "abc").await;

        assert!(matches!(
            result,
            Err(CredentialError::Provider(ProviderError::Auth(_)))
        ));
        let status = f.manager.status(7).await.unwrap();
        assert_eq!(status.status, Some(CredentialStatus::Pending));
    }

    #[tokio::test]
    async fn test_token_outside_refresh_buffer_is_used_as_is() {
        let f = fixture().await;
        connect(&f, 7).await;
        expire_in(&f, 7, 10).await;

        let token = f.manager.get_valid_access_token(7).await.unwrap();

        assert_eq!(token.token, "old-token");
        assert_eq!(token.calendar_id, "primary");
        assert_eq!(f.provider.calls(MockOp::Refresh), 0);
    }

    #[tokio::test]
    async fn test_token_inside_refresh_buffer_is_refreshed() {
        let f = fixture().await;
        connect(&f, 7).await;
        expire_in(&f, 7, 4).await;

        let token = f.manager.get_valid_access_token(7).await.unwrap();

        assert_eq!(token.token, "refreshed-1");
        assert!(token.expires_at > Utc::now() + Duration::minutes(50));
        assert_eq!(f.provider.calls(MockOp::Refresh), 1);

        let stored = f.repo.find_by_specialist(7).await.unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("refreshed-1"));
        // The provider sent no new refresh token, so the old one is kept
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-code"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_refresh_once() {
        let f = fixture().await;
        connect(&f, 7).await;
        expire_in(&f, 7, 1).await;
        f.provider.set_delay(std::time::Duration::from_millis(50));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let manager = f.manager.clone();
            handles.push(tokio::spawn(async move {
                manager.get_valid_access_token(7).await
            }));
        }
        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap().token);
        }

        assert_eq!(f.provider.calls(MockOp::Refresh), 1);
        assert!(tokens.iter().all(|t| t == "refreshed-1"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_disables_credential() {
        let f = fixture().await;
        connect(&f, 7).await;
        expire_in(&f, 7, 1).await;
        f.provider.fail_next(
            MockOp::Refresh,
            ProviderError::Auth("invalid_grant".to_string()),
            1,
        );

        let result = f.manager.get_valid_access_token(7).await;

        assert!(matches!(result, Err(CredentialError::CredentialRevoked(7))));
        let stored = f.repo.find_by_specialist(7).await.unwrap().unwrap();
        assert_eq!(stored.status, CredentialStatus::Disabled);
        assert!(stored.access_token.is_none());
        assert!(stored.refresh_token.is_none());

        let again = f.manager.get_valid_access_token(7).await;
        assert!(matches!(again, Err(CredentialError::NotConnected(7))));
    }

    #[tokio::test]
    async fn test_rejected_client_keeps_credential() {
        let f = fixture().await;
        connect(&f, 7).await;
        expire_in(&f, 7, 1).await;
        let before = f.repo.find_by_specialist(7).await.unwrap().unwrap();
        f.provider.fail_next(
            MockOp::Refresh,
            ProviderError::Provider {
                status: Some(401),
                message: "invalid_client: The OAuth client was not found.".to_string(),
            },
            1,
        );

        let result = f.manager.get_valid_access_token(7).await;

        assert!(matches!(
            result,
            Err(CredentialError::Provider(ProviderError::Provider { status: Some(401), .. }))
        ));
        let stored = f.repo.find_by_specialist(7).await.unwrap().unwrap();
        assert_eq!(stored.status, CredentialStatus::Active);
        assert_eq!(stored.refresh_token, before.refresh_token);
        assert!(stored.refresh_token.is_some());
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_keeps_credential() {
        let f = fixture().await;
        connect(&f, 7).await;
        expire_in(&f, 7, 1).await;
        f.provider.fail_next(
            MockOp::Refresh,
            ProviderError::RateLimited("slow down".to_string()),
            1,
        );

        let result = f.manager.get_valid_access_token(7).await;

        assert!(matches!(
            result,
            Err(CredentialError::Provider(ProviderError::RateLimited(_)))
        ));
        assert!(f.manager.is_connected(7).await.unwrap());
        assert_eq!(
            f.manager.get_valid_access_token(7).await.unwrap().token,
            "refreshed-2"
        );
    }

    #[tokio::test]
    async fn test_missing_refresh_token_revokes_on_expiry() {
        let f = fixture().await;
        f.provider.omit_refresh_token();
        connect(&f, 7).await;
        expire_in(&f, 7, 1).await;

        let result = f.manager.get_valid_access_token(7).await;

        assert!(matches!(result, Err(CredentialError::CredentialRevoked(7))));
        assert_eq!(f.provider.calls(MockOp::Refresh), 0);
    }

    #[tokio::test]
    async fn test_unknown_specialist_is_not_connected() {
        let f = fixture().await;

        let result = f.manager.get_valid_access_token(99).await;

        assert!(matches!(result, Err(CredentialError::NotConnected(99))));
        let status = f.manager.status(99).await.unwrap();
        assert!(status.status.is_none());
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let f = fixture().await;
        connect(&f, 7).await;

        f.manager.disconnect(7).await.unwrap();
        f.manager.disconnect(7).await.unwrap();
        f.manager.disconnect(99).await.unwrap();

        let status = f.manager.status(7).await.unwrap();
        assert_eq!(status.status, Some(CredentialStatus::Disabled));
        assert!(!status.connected);
        assert_eq!(f.manager.connected_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let f = fixture().await;
        connect(&f, 7).await;
        f.manager.disconnect(7).await.unwrap();

        connect(&f, 7).await;

        assert!(f.manager.is_connected(7).await.unwrap());
        assert_eq!(f.manager.connected_count().await.unwrap(), 1);
    }
}
