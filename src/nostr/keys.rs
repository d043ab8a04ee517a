//! Relay signing key
//!
//! The relay authors the events it derives (membership changes, group
//! metadata, invites) and signs them with its own key.

use crate::nostr::{Event, EventTemplate};
use secp256k1::{Keypair, Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid secret key: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The relay's own keypair
#[derive(Clone)]
pub struct RelaySigner {
    keypair: Keypair,
    pubkey: String,
}

impl RelaySigner {
    /// Generate a fresh random key (used when no secret is configured)
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
        Self::from_secret(&secp, secret)
    }

    /// Parse a 32-byte hex secret key
    pub fn from_hex(secret: &str) -> Result<Self, SignError> {
        let bytes = hex::decode(secret.trim()).map_err(|e| SignError::InvalidKey(e.to_string()))?;
        let secret =
            SecretKey::from_slice(&bytes).map_err(|e| SignError::InvalidKey(e.to_string()))?;

        Ok(Self::from_secret(&Secp256k1::new(), secret))
    }

    fn from_secret(secp: &Secp256k1<secp256k1::All>, secret: SecretKey) -> Self {
        let keypair = Keypair::from_secret_key(secp, &secret);
        let (xonly, _parity) = keypair.x_only_public_key();
        let pubkey = hex::encode(xonly.serialize());

        Self { keypair, pubkey }
    }

    /// Hex public key of the relay
    pub fn public_key(&self) -> &str {
        &self.pubkey
    }

    /// Hex secret key (for `.env` bootstrapping)
    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    /// Hash and sign a template, producing a complete event authored by the relay
    pub fn sign(&self, template: EventTemplate) -> Result<Event, SignError> {
        let id = event_id(
            &self.pubkey,
            template.created_at,
            template.kind,
            &template.tags,
            &template.content,
        )?;

        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(id);
        let sig = secp.sign_schnorr_no_aux_rand(&message, &self.keypair);

        Ok(Event {
            id: hex::encode(id),
            pubkey: self.pubkey.clone(),
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
            sig: hex::encode(sig.serialize()),
        })
    }
}

impl fmt::Debug for RelaySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelaySigner({}, [REDACTED])", self.pubkey)
    }
}

/// NIP-01 event id: sha256 of `[0, pubkey, created_at, kind, tags, content]`
pub fn event_id(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<[u8; 32], SignError> {
    let serialized = serde_json::to_string(&(0, pubkey, created_at, kind, tags, content))
        .map_err(|e| SignError::Serialization(e.to_string()))?;

    Ok(Sha256::digest(serialized.as_bytes()).into())
}
