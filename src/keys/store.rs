//! Key Set Store
//!
//! In-memory registry of published public keys keyed by `kid`.
//! Keys are held in a `BTreeMap`, so a snapshot is always ordered by `kid`
//! and repeated marshals of an unchanged store are byte-identical.

use std::collections::BTreeMap;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use crate::keys::jwk::{KeySetDocument, KeyUse, PublishedKey};
use crate::types::{KeywardError, Result};

/// Thread-safe store of published keys
#[derive(Debug, Default)]
pub struct KeySetStore {
    keys: RwLock<BTreeMap<String, PublishedKey>>,
}

impl KeySetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key. Overwriting an existing `kid` is rejected.
    pub async fn write(&self, key: PublishedKey) -> Result<()> {
        let mut keys = self.keys.write().await;
        if keys.contains_key(key.kid()) {
            return Err(KeywardError::DuplicateKey(key.kid().to_string()));
        }
        debug!(kid = %key.kid(), "Key written to key set store");
        keys.insert(key.kid().to_string(), key);
        Ok(())
    }

    /// Get a key by ID
    pub async fn read(&self, kid: &str) -> Option<PublishedKey> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Consistent copy of all keys, ordered by `kid`
    pub async fn snapshot(&self) -> Vec<PublishedKey> {
        self.keys.read().await.values().cloned().collect()
    }

    /// Snapshot filtered to one intended use
    pub async fn snapshot_for_use(&self, key_use: KeyUse) -> Vec<PublishedKey> {
        self.keys
            .read()
            .await
            .values()
            .filter(|k| k.key_use() == key_use)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    /// Serialize the whole store as a pretty-printed JWKS document.
    pub async fn marshal(&self) -> Result<Bytes> {
        let document = KeySetDocument {
            keys: self.snapshot().await,
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| KeywardError::Marshal(format!("Failed to serialize key set: {e}")))?;
        Ok(Bytes::from(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generator::SigningKeyPair;

    fn key(seed: u8, kid: &str, key_use: KeyUse) -> PublishedKey {
        let pair = SigningKeyPair::from_seed(&[seed; 32]);
        PublishedKey::ed25519(&pair.verifying_key(), Some(kid.to_string()), key_use)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let store = KeySetStore::new();
        store.write(key(1, "k1", KeyUse::Signature)).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.read("k1").await.unwrap().kid(), "k1");
        assert!(store.read("k2").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_kid_rejected() {
        let store = KeySetStore::new();
        let original = key(1, "k1", KeyUse::Signature);
        store.write(original.clone()).await.unwrap();

        let err = store.write(key(2, "k1", KeyUse::Signature)).await.unwrap_err();
        assert!(matches!(err, KeywardError::DuplicateKey(ref kid) if kid == "k1"));

        // Original entry untouched
        assert_eq!(store.read("k1").await.unwrap(), original);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_marshal_is_deterministic() {
        let store = KeySetStore::new();
        store.write(key(2, "b", KeyUse::Signature)).await.unwrap();
        store.write(key(1, "a", KeyUse::Signature)).await.unwrap();

        let first = store.marshal().await.unwrap();
        let second = store.marshal().await.unwrap();
        assert_eq!(first, second);

        let doc: KeySetDocument = serde_json::from_slice(&first).unwrap();
        let kids: Vec<&str> = doc.keys.iter().map(|k| k.kid()).collect();
        assert_eq!(kids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_marshal_empty_store() {
        let store = KeySetStore::new();
        let doc: KeySetDocument = serde_json::from_slice(&store.marshal().await.unwrap()).unwrap();
        assert!(doc.keys.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_for_use() {
        let store = KeySetStore::new();
        store.write(key(1, "sig-1", KeyUse::Signature)).await.unwrap();
        store.write(key(2, "enc-1", KeyUse::Encryption)).await.unwrap();

        let sig = store.snapshot_for_use(KeyUse::Signature).await;
        assert_eq!(sig.len(), 1);
        assert_eq!(sig[0].kid(), "sig-1");
    }
}
