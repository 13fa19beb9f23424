#[cfg(test)]
mod tests {
    use crate::models::{
        Credential, CredentialEvent, CredentialStatus, QueueEvent, QueueStatusCounts, SyncAction,
        SyncStatus,
    };
    use crate::services::ProviderError;
    use chrono::{Duration, Utc};
    use std::str::FromStr;

    fn credential(expires_in: Option<Duration>) -> Credential {
        let now = Utc::now();
        Credential {
            specialist_id: 7,
            status: CredentialStatus::Active,
            oauth_state: None,
            access_token: Some("token".to_string()),
            refresh_token: Some("refresh".to_string()),
            expires_at: expires_in.map(|d| now + d),
            calendar_id: Some("primary".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_queue_transitions_follow_state_machine() {
        assert_eq!(
            SyncStatus::Pending.next(QueueEvent::Claim),
            Some(SyncStatus::Processing)
        );
        assert_eq!(
            SyncStatus::Processing.next(QueueEvent::Succeed),
            Some(SyncStatus::Completed)
        );
        assert_eq!(
            SyncStatus::Processing.next(QueueEvent::Retry),
            Some(SyncStatus::Pending)
        );
        assert_eq!(
            SyncStatus::Processing.next(QueueEvent::Fail),
            Some(SyncStatus::Failed)
        );
        assert_eq!(
            SyncStatus::Processing.next(QueueEvent::Reap),
            Some(SyncStatus::Pending)
        );
        // claiming twice is not a transition
        assert_eq!(SyncStatus::Processing.next(QueueEvent::Claim), None);
        assert_eq!(SyncStatus::Pending.next(QueueEvent::Succeed), None);
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_transitions() {
        let events = [
            QueueEvent::Claim,
            QueueEvent::Succeed,
            QueueEvent::Retry,
            QueueEvent::Fail,
            QueueEvent::Reap,
        ];
        for status in [SyncStatus::Completed, SyncStatus::Failed] {
            assert!(status.is_terminal());
            for event in events {
                assert_eq!(status.next(event), None, "{status} must stay terminal");
            }
        }
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in SyncStatus::all() {
            assert_eq!(SyncStatus::from_str(status.as_str()), Ok(status));
        }
        for status in CredentialStatus::all() {
            assert_eq!(CredentialStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(SyncStatus::from_str("done").is_err());
        assert!(SyncStatus::from_str("exploded").is_err());
        assert_eq!(SyncAction::from_str("deleted"), Ok(SyncAction::Delete));
        assert_eq!(
            CredentialStatus::from_str("active"),
            Ok(CredentialStatus::Active)
        );
    }

    #[test]
    fn test_credential_transitions() {
        use CredentialEvent::*;
        use CredentialStatus::*;

        assert_eq!(Pending.next(Authorize), Some(Active));
        assert_eq!(Active.next(Refresh), Some(Active));
        assert_eq!(Disabled.next(Authorize), None);
        assert_eq!(Active.next(Authorize), None);
        assert_eq!(Pending.next(Refresh), None);
        assert_eq!(Disabled.next(Refresh), None);
        for status in CredentialStatus::all() {
            assert_eq!(status.next(BeginAuthorization), Some(Pending));
            assert_eq!(status.next(Disable), Some(Disabled));
        }
    }

    #[test]
    fn test_needs_refresh_respects_buffer() {
        let buffer = Duration::minutes(5);
        assert!(credential(Some(Duration::minutes(4))).needs_refresh(Utc::now(), buffer));
        assert!(!credential(Some(Duration::minutes(10))).needs_refresh(Utc::now(), buffer));
        assert!(credential(None).needs_refresh(Utc::now(), buffer));
    }

    #[test]
    fn test_credential_serialization_hides_secrets() {
        let json = serde_json::to_value(credential(Some(Duration::hours(1)))).unwrap();
        assert!(json.get("access_token").is_none());
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("oauth_state").is_none());
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_counts_total() {
        let counts = QueueStatusCounts {
            pending: 1,
            processing: 2,
            completed: 3,
            failed: 4,
            completed_today: 3,
        };
        assert_eq!(counts.total(), 10);
    }

    #[test]
    fn test_provider_error_retryability() {
        assert!(ProviderError::RateLimited("slow down".into()).is_retryable());
        assert!(ProviderError::provider("boom").is_retryable());
        assert!(!ProviderError::Auth("revoked".into()).is_retryable());
        assert!(!ProviderError::Payload("bad".into()).is_retryable());
        assert!(!ProviderError::NotFound("gone".into()).is_retryable());
    }
}
