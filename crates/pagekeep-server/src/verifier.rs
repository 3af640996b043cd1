//! Bearer token verification against the issuer's published key set.
//!
//! The key set (JWKS) is fetched through a [`KeySource`] and cached as an
//! immutable [`KeySnapshot`]. A refresh swaps in a whole new snapshot; readers
//! holding the previous `Arc` keep using it undisturbed. Refreshes happen when
//! the snapshot is older than the configured interval, or when a token names
//! a key id the snapshot does not know (key rotation), but never more often
//! than the minimum refresh interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Verified claim set of a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user identifier.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Everything else the issuer put in the token (`iss`, `exp`, `aud`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a token was refused. Only ever logged; callers see a single
/// "unauthenticated" outcome.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token rejected: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("algorithm {0:?} is not allowed")]
    DisallowedAlgorithm(Algorithm),

    #[error("token algorithm does not match key algorithm")]
    AlgorithmMismatch,

    #[error("no signing key matches kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("token subject is empty")]
    EmptySubject,

    #[error("key set unavailable: {0}")]
    KeySet(#[from] KeyFetchError),

    #[error("key set unavailable, next fetch deferred")]
    KeySetBackoff,
}

#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("key set endpoint returned {0}")]
    Status(reqwest::StatusCode),
}

// ---------------------------------------------------------------------------
// Key sources
// ---------------------------------------------------------------------------

/// Where signing keys come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, KeyFetchError>;
}

/// Fetches the key set over HTTPS.
pub struct HttpKeySource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(url: impl Into<String>) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSet, KeyFetchError> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(KeyFetchError::Status(resp.status()));
        }
        Ok(resp.json::<JwkSet>().await?)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One fetched key set. Never mutated after construction.
#[derive(Debug)]
pub struct KeySnapshot {
    keys: JwkSet,
    fetched_at: Instant,
}

impl KeySnapshot {
    fn new(keys: JwkSet) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    /// Key for `kid`; a token without a kid is accepted only when the set
    /// holds exactly one key.
    fn select(&self, kid: Option<&str>) -> Option<&Jwk> {
        match kid {
            Some(kid) => self.keys.find(kid),
            None if self.keys.keys.len() == 1 => self.keys.keys.first(),
            None => None,
        }
    }

    fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Verification policy.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Required value of the `iss` claim.
    pub issuer: String,
    /// Required `aud`, if any.
    pub audience: Option<String>,
    pub algorithms: Vec<Algorithm>,
    /// Maximum age of a snapshot before it is refreshed.
    pub refresh_interval: Duration,
    /// Minimum gap between two fetches.
    pub min_refresh_interval: Duration,
}

pub struct TokenVerifier {
    source: Arc<dyn KeySource>,
    settings: VerifierSettings,
    snapshot: RwLock<Option<Arc<KeySnapshot>>>,
    /// Serializes refreshes; holds the time of the last failed fetch.
    refresh_lock: Mutex<Option<Instant>>,
}

impl TokenVerifier {
    pub fn new(source: Arc<dyn KeySource>, settings: VerifierSettings) -> Self {
        Self {
            source,
            settings,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(None),
        }
    }

    /// Fetch the key set ahead of the first request.
    pub async fn prefetch(&self) -> Result<(), VerifyError> {
        self.refresh(None).await.map(|_| ())
    }

    /// Verify signature, expiry and issuer of `token` and return its claims.
    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let header = decode_header(token)?;
        if !self.settings.algorithms.contains(&header.alg) {
            return Err(VerifyError::DisallowedAlgorithm(header.alg));
        }

        let kid = header.kid.as_deref();
        let snapshot = self.snapshot_for(kid).await?;
        let jwk = snapshot
            .select(kid)
            .ok_or_else(|| VerifyError::UnknownKey(header.kid.clone()))?;

        if let Some(key_alg) = jwk.common.key_algorithm {
            if signing_algorithm(key_alg) != Some(header.alg) {
                return Err(VerifyError::AlgorithmMismatch);
            }
        }

        let key = DecodingKey::from_jwk(jwk)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        match &self.settings.audience {
            Some(aud) => validation.set_audience(&[aud.as_str()]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Claims>(token, &key, &validation)?;
        if data.claims.sub.is_empty() {
            return Err(VerifyError::EmptySubject);
        }

        debug!(subject = %data.claims.sub, "token verified");
        Ok(data.claims)
    }

    /// Current snapshot, refreshed first if it is stale or lacks `kid`.
    async fn snapshot_for(&self, kid: Option<&str>) -> Result<Arc<KeySnapshot>, VerifyError> {
        let current = self.snapshot.read().await.clone();

        if let Some(snap) = &current {
            let fresh = snap.age() < self.settings.refresh_interval;
            let knows_kid = snap.select(kid).is_some();
            let may_refresh = snap.age() >= self.settings.min_refresh_interval;

            if fresh && (knows_kid || !may_refresh) {
                return Ok(snap.clone());
            }
        }

        self.refresh(current).await
    }

    /// Replace the snapshot with a newly fetched one.
    ///
    /// `seen` is the snapshot the caller found stale. If another task swapped
    /// in a different snapshot while this one waited for the lock, that newer
    /// snapshot is returned without fetching again. After a failed fetch no
    /// new fetch is attempted until `min_refresh_interval` has passed; in the
    /// meantime the previous keys keep serving, or the call fails fast when
    /// there are none.
    async fn refresh(&self, seen: Option<Arc<KeySnapshot>>) -> Result<Arc<KeySnapshot>, VerifyError> {
        let mut last_failure = self.refresh_lock.lock().await;

        let latest = self.snapshot.read().await.clone();
        if let Some(latest) = &latest {
            let superseded = match &seen {
                Some(seen) => !Arc::ptr_eq(seen, latest),
                None => latest.age() < self.settings.min_refresh_interval,
            };
            if superseded {
                return Ok(latest.clone());
            }
        }

        if let Some(at) = *last_failure {
            if at.elapsed() < self.settings.min_refresh_interval {
                return latest.ok_or(VerifyError::KeySetBackoff);
            }
        }

        match self.source.fetch().await {
            Ok(keys) => {
                *last_failure = None;
                let snap = Arc::new(KeySnapshot::new(keys));
                *self.snapshot.write().await = Some(snap.clone());
                info!(keys = snap.keys.keys.len(), "signing key set refreshed");
                Ok(snap)
            }
            Err(e) => {
                *last_failure = Some(Instant::now());
                match latest {
                    Some(stale) => {
                        warn!(error = %e, "key set refresh failed, keeping previous keys");
                        Ok(stale)
                    }
                    None => Err(e.into()),
                }
            }
        }
    }
}

/// Signature algorithm a JWK's `alg` names; `None` for encryption algorithms.
fn signing_algorithm(key_alg: KeyAlgorithm) -> Option<Algorithm> {
    match key_alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn verifier_with(source: Arc<StaticKeySource>) -> TokenVerifier {
        TokenVerifier::new(source, settings())
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let key = TestKey::new("k1", b'a');
        let verifier = verifier_with(Arc::new(StaticKeySource::new(key_set(&[&key]))));

        let claims = verifier.verify(&key.sign(&claims_for("alice"))).await.unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role.as_deref(), Some("authenticated"));
        assert_eq!(claims.extra["iss"], ISSUER);
    }

    #[tokio::test]
    async fn rejects_bad_signature_expiry_and_issuer() {
        let key = TestKey::new("k1", b'a');
        let forged = TestKey::new("k1", b'b');
        let verifier = verifier_with(Arc::new(StaticKeySource::new(key_set(&[&key]))));

        let mut expired = claims_for("alice");
        expired["exp"] = serde_json::json!(chrono::Utc::now().timestamp() - 3600);

        let mut foreign = claims_for("alice");
        foreign["iss"] = serde_json::json!("https://evil.example.test");

        for token in [
            forged.sign(&claims_for("alice")),
            key.sign(&expired),
            key.sign(&foreign),
            "not-a-jwt".to_string(),
        ] {
            assert!(verifier.verify(&token).await.is_err());
        }
    }

    #[tokio::test]
    async fn rejects_missing_email_and_disallowed_algorithm() {
        let key = TestKey::new("k1", b'a');
        let source = Arc::new(StaticKeySource::new(key_set(&[&key])));

        let mut no_email = claims_for("alice");
        no_email.as_object_mut().unwrap().remove("email");
        assert!(verifier_with(source.clone())
            .verify(&key.sign(&no_email))
            .await
            .is_err());

        let mut strict = settings();
        strict.algorithms = vec![Algorithm::RS256];
        let verifier = TokenVerifier::new(source, strict);
        assert!(matches!(
            verifier.verify(&key.sign(&claims_for("alice"))).await,
            Err(VerifyError::DisallowedAlgorithm(Algorithm::HS256))
        ));
    }

    #[tokio::test]
    async fn caches_key_set_between_requests() {
        let key = TestKey::new("k1", b'a');
        let source = Arc::new(StaticKeySource::new(key_set(&[&key])));
        let verifier = verifier_with(source.clone());

        for _ in 0..3 {
            verifier.verify(&key.sign(&claims_for("alice"))).await.unwrap();
        }
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn picks_up_rotated_keys() {
        let old = TestKey::new("old", b'a');
        let new = TestKey::new("new", b'c');
        let source = Arc::new(StaticKeySource::new(key_set(&[&old])));
        let verifier = verifier_with(source.clone());

        verifier.verify(&old.sign(&claims_for("alice"))).await.unwrap();

        source.replace(key_set(&[&new]));
        let claims = verifier.verify(&new.sign(&claims_for("bob"))).await.unwrap();
        assert_eq!(claims.sub, "bob");
        assert_eq!(source.fetches(), 2);

        // The retired key is gone from the new snapshot.
        assert!(verifier.verify(&old.sign(&claims_for("alice"))).await.is_err());
    }

    #[tokio::test]
    async fn unknown_kid_does_not_refetch_within_min_interval() {
        let key = TestKey::new("k1", b'a');
        let stranger = TestKey::new("k2", b'z');
        let source = Arc::new(StaticKeySource::new(key_set(&[&key])));

        let mut throttled = settings();
        throttled.min_refresh_interval = Duration::from_secs(60);
        let verifier = TokenVerifier::new(source.clone(), throttled);

        verifier.verify(&key.sign(&claims_for("alice"))).await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                verifier.verify(&stranger.sign(&claims_for("eve"))).await,
                Err(VerifyError::UnknownKey(_))
            ));
        }
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_fetch() {
        let key = TestKey::new("k1", b'a');
        let source = Arc::new(StaticKeySource::new(key_set(&[&key])));

        let mut throttled = settings();
        throttled.min_refresh_interval = Duration::from_secs(60);
        let verifier = Arc::new(TokenVerifier::new(source.clone(), throttled));

        let token = key.sign(&claims_for("alice"));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let verifier = verifier.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move { verifier.verify(&token).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(source.fetches(), 1);
    }

    /// Serves `good` for the first `successes` fetches, then fails.
    struct FlakyKeySource {
        good: JwkSet,
        successes: usize,
        fetches: std::sync::atomic::AtomicUsize,
    }

    impl FlakyKeySource {
        fn new(good: JwkSet, successes: usize) -> Self {
            Self {
                good,
                successes,
                fetches: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySource for FlakyKeySource {
        async fn fetch(&self) -> Result<JwkSet, KeyFetchError> {
            let n = self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n < self.successes {
                Ok(self.good.clone())
            } else {
                Err(KeyFetchError::Status(reqwest::StatusCode::BAD_GATEWAY))
            }
        }
    }

    #[tokio::test]
    async fn failed_refresh_backs_off_and_keeps_old_keys() {
        let key = TestKey::new("k1", b'a');
        let source = Arc::new(FlakyKeySource::new(key_set(&[&key]), 1));

        let mut short_lived = settings();
        short_lived.refresh_interval = Duration::from_millis(50);
        short_lived.min_refresh_interval = Duration::from_secs(60);
        let verifier = TokenVerifier::new(source.clone(), short_lived);

        let token = key.sign(&claims_for("alice"));
        verifier.verify(&token).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        for _ in 0..5 {
            let claims = verifier.verify(&token).await.unwrap();
            assert_eq!(claims.sub, "alice");
        }

        // One initial fetch plus one failed refresh; the rest are deferred.
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn failed_first_fetch_is_not_retried_per_request() {
        let key = TestKey::new("k1", b'a');
        let source = Arc::new(FlakyKeySource::new(key_set(&[&key]), 0));

        let mut throttled = settings();
        throttled.min_refresh_interval = Duration::from_secs(60);
        let verifier = TokenVerifier::new(source.clone(), throttled);

        assert!(matches!(verifier.prefetch().await, Err(VerifyError::KeySet(_))));
        for _ in 0..5 {
            assert!(matches!(
                verifier.verify(&key.sign(&claims_for("alice"))).await,
                Err(VerifyError::KeySetBackoff)
            ));
        }
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn key_declaring_another_algorithm_is_refused() {
        let key = TestKey::new("k1", b'a');
        let mut jwk = key.jwk();
        jwk["alg"] = serde_json::json!("HS384");
        let keys: JwkSet = serde_json::from_value(serde_json::json!({ "keys": [jwk] })).unwrap();
        let verifier = verifier_with(Arc::new(StaticKeySource::new(keys)));

        assert!(matches!(
            verifier.verify(&key.sign(&claims_for("alice"))).await,
            Err(VerifyError::AlgorithmMismatch)
        ));
    }

    #[test]
    fn key_algorithms_map_to_signing_algorithms() {
        assert_eq!(signing_algorithm(KeyAlgorithm::RS256), Some(Algorithm::RS256));
        assert_eq!(signing_algorithm(KeyAlgorithm::ES256), Some(Algorithm::ES256));
        assert_eq!(signing_algorithm(KeyAlgorithm::EdDSA), Some(Algorithm::EdDSA));
        assert_eq!(signing_algorithm(KeyAlgorithm::RSA_OAEP), None);
    }
}
