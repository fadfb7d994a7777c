//! Key Manager
//!
//! Owns the process signing key and everything derived from it. The first
//! accessor call generates the key pair, publishes its public half to the
//! Key Set Store, and builds the Verification Resolver. All of that runs
//! behind a `tokio::sync::OnceCell`, which admits exactly one initializer at
//! a time: concurrent first callers wait for it and then see the finished
//! material, never a partly built one. A failed or cancelled initialization
//! leaves the cell empty so the next call retries.
//!
//! The manager is an ordinary value. Build one at startup and hand an `Arc`
//! of it to the endpoint handler, the token signer, and the verifier.

use std::future::Future;

use chrono::{DateTime, SubsecRound, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::EncodingKey;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::config::Args;
use crate::keys::generator::{KeySource, OsRngKeySource, SigningKeyPair};
use crate::keys::jwk::{KeyUse, PublishedKey, ALG_EDDSA};
use crate::keys::resolver::VerificationResolver;
use crate::keys::store::KeySetStore;
use crate::types::{KeywardError, Result};

/// Key manager configuration
#[derive(Debug, Clone, Default)]
pub struct KeyManagerConfig {
    /// Explicit key ID; the JWK thumbprint is used when unset
    pub key_id: Option<String>,
}

impl KeyManagerConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            key_id: args.key_id.clone(),
        }
    }
}

/// Everything produced by one successful initialization
struct KeyMaterial {
    key_pair: SigningKeyPair,
    encoding_key: EncodingKey,
    kid: String,
    store: KeySetStore,
    resolver: VerificationResolver,
    /// Generation time, whole seconds (HTTP dates have no sub-second part)
    generated_at: DateTime<Utc>,
}

/// Lazily initialized holder of the signing key and its published artifacts
pub struct KeyManager {
    config: KeyManagerConfig,
    source: Box<dyn KeySource>,
    material: OnceCell<KeyMaterial>,
}

impl KeyManager {
    /// Manager drawing keys from the OS random number generator
    pub fn new(config: KeyManagerConfig) -> Self {
        Self::with_source(config, OsRngKeySource)
    }

    /// Manager drawing keys from a custom source
    pub fn with_source(config: KeyManagerConfig, source: impl KeySource + 'static) -> Self {
        Self {
            config,
            source: Box::new(source),
            material: OnceCell::new(),
        }
    }

    /// Whether key material exists. Never triggers initialization.
    pub fn is_initialized(&self) -> bool {
        self.material.initialized()
    }

    /// Key ID if already initialized. Never triggers initialization.
    pub fn initialized_key_id(&self) -> Option<&str> {
        self.material.get().map(|m| m.kid.as_str())
    }

    /// Initialize key material if it does not exist yet. Idempotent.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.material().await.map(|_| ())
    }

    /// Like `ensure_initialized`, but gives up with `Cancelled` as soon as
    /// `cancelled` completes. An abandoned initialization leaves no state
    /// behind.
    ///
    /// `cancelled` is only checked between polls. `KeySource::generate` is
    /// synchronous and runs to completion inside a single poll, so a signal
    /// raised while generation is in progress cannot interrupt it; the call
    /// is cancelled only if the signal is ready before that poll, or while
    /// this caller is waiting on another caller's initialization.
    pub async fn ensure_initialized_until<F>(&self, cancelled: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancelled => {
                warn!("Key initialization cancelled by caller");
                Err(KeywardError::Cancelled(
                    "initialization abandoned before completion".into(),
                ))
            }
            result = self.material() => result.map(|_| ()),
        }
    }

    /// Private signing key, used to sign newly issued tokens
    pub async fn private_key(&self) -> Result<&SigningKey> {
        Ok(self.material().await?.key_pair.signing_key())
    }

    /// Public verification key
    pub async fn public_key(&self) -> Result<VerifyingKey> {
        Ok(self.material().await?.key_pair.verifying_key())
    }

    /// Store holding the published key set
    pub async fn key_set_store(&self) -> Result<&KeySetStore> {
        Ok(&self.material().await?.store)
    }

    /// Resolver for verifying tokens by `kid`
    pub async fn verification_resolver(&self) -> Result<&VerificationResolver> {
        Ok(&self.material().await?.resolver)
    }

    /// jsonwebtoken form of the private key
    pub async fn encoding_key(&self) -> Result<&EncodingKey> {
        Ok(&self.material().await?.encoding_key)
    }

    /// Published key ID of the signing key
    pub async fn key_id(&self) -> Result<&str> {
        Ok(self.material().await?.kid.as_str())
    }

    /// When the key was generated. Constant for the life of the manager.
    pub async fn generated_at(&self) -> Result<DateTime<Utc>> {
        Ok(self.material().await?.generated_at)
    }

    async fn material(&self) -> Result<&KeyMaterial> {
        self.material.get_or_try_init(|| self.initialize()).await
    }

    async fn initialize(&self) -> Result<KeyMaterial> {
        match self.build_material().await {
            Ok(material) => {
                info!(
                    kid = %material.kid,
                    alg = ALG_EDDSA,
                    generated_at = %material.generated_at,
                    "Signing key generated"
                );
                Ok(material)
            }
            Err(e) => {
                let e = e.into_initialization();
                error!(error = %e, "Signing key initialization failed");
                Err(e)
            }
        }
    }

    async fn build_material(&self) -> Result<KeyMaterial> {
        let key_pair = self.source.generate()?;
        let generated_at = Utc::now().trunc_subsecs(0);

        let encoding_key = encoding_key_for(key_pair.signing_key());

        let published = PublishedKey::ed25519(
            &key_pair.verifying_key(),
            self.config.key_id.clone(),
            KeyUse::Signature,
        );
        let kid = published.kid().to_string();

        let store = KeySetStore::new();
        store.write(published).await?;

        let resolver = VerificationResolver::from_store(&store).await?;
        if !resolver.contains(&kid) {
            return Err(KeywardError::KeyInitialization(format!(
                "Resolver does not expose signing key {kid}"
            )));
        }

        Ok(KeyMaterial {
            key_pair,
            encoding_key,
            kid,
            store,
            resolver,
            generated_at,
        })
    }
}

/// PKCS#8 v1 prefix for a bare Ed25519 private key (RFC 8410 section 7)
const ED25519_PKCS8_V1_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

fn encoding_key_for(signing_key: &SigningKey) -> EncodingKey {
    let mut der = Zeroizing::new(Vec::with_capacity(ED25519_PKCS8_V1_PREFIX.len() + 32));
    der.extend_from_slice(&ED25519_PKCS8_V1_PREFIX);
    der.extend_from_slice(signing_key.as_bytes());
    EncodingKey::from_ed_der(&der)
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(KeyManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::jwk::{thumbprint, KeySetDocument};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts generations
    #[derive(Clone, Default)]
    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    impl KeySource for CountingSource {
        fn generate(&self) -> Result<SigningKeyPair> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            OsRngKeySource.generate()
        }
    }

    /// Fails the first `failures` calls, as a broken randomness source would
    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
    }

    impl KeySource for FlakySource {
        fn generate(&self) -> Result<SigningKeyPair> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(KeywardError::KeyInitialization(
                    "Randomness source failed: entropy unavailable".into(),
                ));
            }
            OsRngKeySource.generate()
        }
    }

    #[tokio::test]
    async fn test_lazy_initialization() {
        let manager = KeyManager::default();
        assert!(!manager.is_initialized());
        assert!(manager.initialized_key_id().is_none());

        manager.public_key().await.unwrap();
        assert!(manager.is_initialized());
        assert!(manager.initialized_key_id().is_some());
    }

    #[tokio::test]
    async fn test_accessors_share_one_generation() {
        let source = CountingSource::default();
        let manager = KeyManager::with_source(KeyManagerConfig::default(), source.clone());

        let public = manager.public_key().await.unwrap();
        let private = manager.private_key().await.unwrap();
        assert_eq!(private.verifying_key(), public);

        let kid = manager.key_id().await.unwrap().to_string();
        let resolved = manager.verification_resolver().await.unwrap().resolve(&kid).unwrap();
        assert_eq!(resolved, public);

        let stored = manager.key_set_store().await.unwrap().read(&kid).await.unwrap();
        assert_eq!(stored.verifying_key().unwrap(), public);

        manager.ensure_initialized().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_first_access_generates_once() {
        let source = CountingSource::default();
        let manager = Arc::new(KeyManager::with_source(
            KeyManagerConfig::default(),
            source.clone(),
        ));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.public_key().await.unwrap().to_bytes()
            }));
        }

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap());
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(keys.iter().all(|k| *k == keys[0]));
    }

    #[tokio::test]
    async fn test_failed_initialization_is_retryable() {
        let manager = KeyManager::with_source(
            KeyManagerConfig::default(),
            FlakySource {
                failures: 1,
                calls: AtomicUsize::new(0),
            },
        );

        let err = manager.public_key().await.unwrap_err();
        assert!(matches!(err, KeywardError::KeyInitialization(_)));
        assert!(!manager.is_initialized());

        // Every accessor reports the same failure class while broken
        let manager = KeyManager::with_source(
            KeyManagerConfig::default(),
            FlakySource {
                failures: 4,
                calls: AtomicUsize::new(0),
            },
        );
        assert!(matches!(
            manager.private_key().await,
            Err(KeywardError::KeyInitialization(_))
        ));
        assert!(matches!(
            manager.key_set_store().await,
            Err(KeywardError::KeyInitialization(_))
        ));
        assert!(matches!(
            manager.verification_resolver().await,
            Err(KeywardError::KeyInitialization(_))
        ));
        assert!(matches!(
            manager.public_key().await,
            Err(KeywardError::KeyInitialization(_))
        ));

        // Fifth call succeeds
        manager.public_key().await.unwrap();
        assert!(manager.is_initialized());
    }

    #[tokio::test]
    async fn test_retry_after_failure_succeeds() {
        let manager = KeyManager::with_source(
            KeyManagerConfig::default(),
            FlakySource {
                failures: 1,
                calls: AtomicUsize::new(0),
            },
        );

        assert!(manager.ensure_initialized().await.is_err());
        manager.ensure_initialized().await.unwrap();

        let store = manager.key_set_store().await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_initialization_leaves_no_state() {
        let source = CountingSource::default();
        let manager = KeyManager::with_source(KeyManagerConfig::default(), source.clone());

        let err = manager
            .ensure_initialized_until(std::future::ready(()))
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::Cancelled(_)));
        assert!(!manager.is_initialized());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        manager
            .ensure_initialized_until(std::future::pending::<()>())
            .await
            .unwrap();
        assert!(manager.is_initialized());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    /// Raises its signal from inside `generate`
    struct SignallingSource {
        signal: Arc<tokio::sync::Notify>,
    }

    impl KeySource for SignallingSource {
        fn generate(&self) -> Result<SigningKeyPair> {
            self.signal.notify_one();
            OsRngKeySource.generate()
        }
    }

    #[tokio::test]
    async fn test_cancel_during_generation_does_not_interrupt_it() {
        let signal = Arc::new(tokio::sync::Notify::new());
        let manager = KeyManager::with_source(
            KeyManagerConfig::default(),
            SignallingSource {
                signal: Arc::clone(&signal),
            },
        );

        manager
            .ensure_initialized_until(signal.notified())
            .await
            .unwrap();
        assert!(manager.is_initialized());
    }

    #[tokio::test]
    async fn test_configured_key_id() {
        let manager = KeyManager::new(KeyManagerConfig {
            key_id: Some("auth-key-1".into()),
        });
        assert_eq!(manager.key_id().await.unwrap(), "auth-key-1");
        assert!(manager
            .verification_resolver()
            .await
            .unwrap()
            .resolve("auth-key-1")
            .is_ok());
    }

    #[tokio::test]
    async fn test_default_key_id_is_thumbprint() {
        let manager = KeyManager::default();
        let kid = manager.key_id().await.unwrap().to_string();
        let store = manager.key_set_store().await.unwrap();
        let published = store.read(&kid).await.unwrap();
        assert_eq!(kid, thumbprint(published.x()));
    }

    #[tokio::test]
    async fn test_store_holds_single_signature_key() {
        let manager = KeyManager::default();
        let body = manager.key_set_store().await.unwrap().marshal().await.unwrap();
        let doc: KeySetDocument = serde_json::from_slice(&body).unwrap();

        assert_eq!(doc.keys.len(), 1);
        assert_eq!(doc.keys[0].alg(), ALG_EDDSA);
        assert_eq!(doc.keys[0].key_use(), KeyUse::Signature);
    }

    #[tokio::test]
    async fn test_generated_at_is_stable() {
        let manager = KeyManager::default();
        let first = manager.generated_at().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = manager.generated_at().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.timestamp_subsec_nanos(), 0);
    }
}
