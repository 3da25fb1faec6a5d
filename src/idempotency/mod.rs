//! Idempotency records for unsafe HTTP operations.
//!
//! A record pairs the fingerprint of the request that first used a key with
//! the response that was produced for it. The middleware replays the stored
//! response for matching retries and rejects key reuse with a different
//! request. Keys are stored hashed, never verbatim.

pub mod middleware;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Fingerprint of the request a key was first used with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl StoredRequest {
    /// Whether a retry carries the same method, path and body as the
    /// original request.
    pub fn matches(&self, other: &StoredRequest) -> bool {
        self == other
    }
}

/// The buffered response to replay on a matching retry.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub request: StoredRequest,
    pub response: StoredResponse,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Look up a live (unexpired) record for a key. `Ok(None)` for a key
    /// never seen or already expired.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, Error>;

    /// Store or overwrite the record for a key with the given TTL.
    async fn save(&self, key: &str, record: IdempotencyRecord, ttl: Duration)
        -> Result<(), Error>;
}

/// SHA-256 digest of the client-supplied key. Storage only ever sees this
/// hash, so a leaked table does not reveal client key material.
pub fn hash_key(key: &str) -> Vec<u8> {
    Sha256::digest(key.as_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_key_is_stable_and_key_dependent() {
        assert_eq!(hash_key("abc"), hash_key("abc"));
        assert_ne!(hash_key("abc"), hash_key("abd"));
        assert_eq!(hash_key("abc").len(), 32);
    }

    #[test]
    fn stored_request_match_covers_all_fields() {
        let base = StoredRequest {
            method: "POST".into(),
            path: "/pullRequest/create".into(),
            body: b"{\"a\":1}".to_vec(),
        };
        assert!(base.matches(&base.clone()));

        let mut other = base.clone();
        other.body = b"{\"a\":2}".to_vec();
        assert!(!base.matches(&other));

        let mut other = base.clone();
        other.path = "/pullRequest/merge".into();
        assert!(!base.matches(&other));
    }
}
