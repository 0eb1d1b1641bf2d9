//! Integration test: a token is accepted, cached, refreshed from a
//! credential source, and the cache follows along.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use roomlink_protocol::{ParticipantId, RoomName, TokenGrant};
use roomlink_token::{
    CredentialSource, KeyValueStore, MemoryStore, NoCredentialSource, TokenCache,
    TokenConfig, TokenError, TokenGuardian,
};

fn jwt_expiring_in(secs: u64) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(
        r#"{{"exp":{},"sub":"alice","video":{{"room":"standup"}}}}"#,
        now + secs
    ));
    format!("{header}.{payload}.sig")
}

/// Hands out a fresh one-hour token on every call.
struct FreshTokens;

impl CredentialSource for FreshTokens {
    async fn fetch(
        &self,
        _room: &RoomName,
        _identity: Option<&ParticipantId>,
    ) -> Result<TokenGrant, TokenError> {
        Ok(TokenGrant {
            token: jwt_expiring_in(3_600),
            expires_in_seconds: 3_600,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_refresh_cycle_replaces_cached_token() {
    let store = Arc::new(MemoryStore::new());
    let room = RoomName::new("standup");
    let cache = TokenCache::new(Arc::clone(&store), &room);
    let mut guardian = TokenGuardian::new(TokenConfig::default());

    let first = guardian.accept(&jwt_expiring_in(120)).unwrap().clone();
    cache.save(&first).unwrap();

    // 120s token, 60s cap: refresh fires after 60s.
    let expired = guardian.wait_for_refresh().await.expect("token was held");
    assert_eq!(expired, first);
    cache.clear().unwrap();
    assert_eq!(store.get(cache.key()).unwrap(), None);

    let grant = FreshTokens.fetch(&room, expired.identity()).await.unwrap();
    let second = guardian.accept(&grant.token).unwrap().clone();
    cache.save(&second).unwrap();

    assert_ne!(second, first);
    assert_eq!(cache.load().unwrap().as_deref(), Some(second.as_str()));
    assert!(guardian.refresh_at().is_some());
}

#[tokio::test]
async fn test_no_credential_source_reports_unavailable() {
    let result = NoCredentialSource.fetch(&RoomName::new("r"), None).await;
    assert!(matches!(result, Err(TokenError::SourceUnavailable(_))));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_fires_before_expiry() {
    let mut guardian = TokenGuardian::new(TokenConfig::default());
    let start = tokio::time::Instant::now();
    guardian.accept(&jwt_expiring_in(30)).unwrap();

    guardian.wait_for_refresh().await;

    // Whole-second `exp` means 29-30s remain; refresh lands at half.
    let waited = start.elapsed();
    assert!(waited <= Duration::from_secs(15), "waited {waited:?}");
    assert!(waited >= Duration::from_millis(14_500), "waited {waited:?}");
}
