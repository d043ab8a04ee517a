//! Claims and invite codes
//!
//! A claim is a durable token recorded against a pubkey; holding at least
//! one grants relay access. Claims come from the static `RELAY_CLAIMS` list
//! or from redeeming an invite code issued by someone with access.

use crate::storage::{get_string, tables, KvStore, StorageError};
use dashmap::DashMap;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Invite code alphabet
const INVITE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const INVITE_CODE_LEN: usize = 8;

/// Re-rolls before giving up on finding a free code
const MAX_INVITE_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("invalid invite code")]
    InvalidCode,

    #[error("could not allocate a free invite code")]
    Exhausted,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A single-use invite code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InviteCode(String);

impl InviteCode {
    /// Generate a random code
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..INVITE_CODE_LEN)
            .map(|_| INVITE_ALPHABET[rng.random_range(0..INVITE_ALPHABET.len())] as char)
            .collect();

        Self(code)
    }

    /// Parse a code (format check only)
    pub fn parse(code: &str) -> Result<Self, ClaimError> {
        if code.len() != INVITE_CODE_LEN || !code.bytes().all(|b| INVITE_ALPHABET.contains(&b)) {
            return Err(ClaimError::InvalidCode);
        }

        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stores claims and invites
pub struct ClaimRegistry {
    kv: Arc<dyn KvStore>,
    valid_claims: Vec<String>,
    /// Serializes read-modify-write of one pubkey's claim list
    writers: DashMap<String, Arc<Mutex<()>>>,
}

impl ClaimRegistry {
    pub fn new(kv: Arc<dyn KvStore>, valid_claims: Vec<String>) -> Self {
        Self {
            kv,
            valid_claims,
            writers: DashMap::new(),
        }
    }

    /// Whether a claim is one of the statically configured ones
    pub fn is_valid_claim(&self, claim: &str) -> bool {
        !claim.is_empty() && self.valid_claims.iter().any(|c| c == claim)
    }

    pub async fn user_claims(&self, pubkey: &str) -> Result<Vec<String>, StorageError> {
        let joined = get_string(self.kv.as_ref(), tables::CLAIM, pubkey).await?;

        Ok(joined
            .map(|s| split_claims(&s))
            .unwrap_or_default())
    }

    /// Record a claim for a pubkey; recording it twice is a no-op
    pub async fn add_user_claim(&self, pubkey: &str, claim: &str) -> Result<(), StorageError> {
        let writer = self.writers.entry(pubkey.to_string()).or_default().clone();
        let result = {
            let _guard = writer.lock().await;
            self.append_claim(pubkey, claim).await
        };

        drop(writer);
        self.writers.remove_if(pubkey, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn append_claim(&self, pubkey: &str, claim: &str) -> Result<(), StorageError> {
        let mut claims = self.user_claims(pubkey).await?;

        if claims.iter().any(|c| c == claim) {
            return Ok(());
        }

        claims.push(claim.to_string());
        self.kv
            .put(tables::CLAIM, pubkey, claims.join(",").as_bytes())
            .await?;

        info!(pubkey = %pubkey, "Recorded claim");
        Ok(())
    }

    /// Issue an invite code on behalf of `author`
    pub async fn generate_invite(&self, author: &str) -> Result<InviteCode, ClaimError> {
        for _ in 0..MAX_INVITE_ATTEMPTS {
            let code = InviteCode::generate();

            if self
                .kv
                .insert_new(tables::INVITE, code.as_str(), author.as_bytes())
                .await?
            {
                debug!(author = %author, "Issued invite");
                return Ok(code);
            }

            debug!("Invite code collision, re-rolling");
        }

        Err(ClaimError::Exhausted)
    }

    /// Redeem an invite, returning its issuer. A code redeems at most once.
    pub async fn consume_invite(&self, code: &str) -> Result<Option<String>, StorageError> {
        let Ok(code) = InviteCode::parse(code) else {
            return Ok(None);
        };

        match self.kv.take(tables::INVITE, code.as_str()).await? {
            Some(issuer) => Ok(String::from_utf8(issuer).ok().filter(|s| !s.is_empty())),
            None => Ok(None),
        }
    }
}

fn split_claims(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}
