//! Key material for record bodies and log signatures.
//!
//! Record bodies are sealed with ChaCha20-Poly1305 under a per-log read key.
//! Records are signed with the Ed25519 key whose public half is the log ID.

use crate::error::{Result, ServiceError};
use crate::types::LogId;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Nonce length prepended to sealed bodies.
const NONCE_LEN: usize = 12;

/// Symmetric key used to seal record bodies.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        EncryptionKey(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        EncryptionKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Seal plaintext. Output is `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let nonce = ChaCha20Poly1305::generate_nonce(OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| ServiceError::Crypto(format!("encrypt failed: {e}")))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a body produced by [`EncryptionKey::encrypt`].
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(ServiceError::Crypto(
                "sealed body too short (missing nonce)".into(),
            ));
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let nonce = Nonce::from_slice(&sealed[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &sealed[NONCE_LEN..])
            .map_err(|e| ServiceError::Crypto(format!("decrypt failed: {e}")))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// A peer's signing identity. Its public key is the peer's [`LogId`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "[u8; 32]", into = "[u8; 32]")]
pub struct Identity {
    key: SigningKey,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(bytes),
        }
    }

    /// Load the identity stored at `path`, or generate and store a new one.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let text = fs::read_to_string(path)?;
            let bytes = hex::decode(text.trim())
                .map_err(|e| ServiceError::InvalidFormat(format!("identity file: {e}")))?;
            let secret: [u8; 32] = bytes.try_into().map_err(|_| {
                ServiceError::InvalidFormat("identity file: expected 32 bytes".into())
            })?;
            return Ok(Self::from_secret_bytes(&secret));
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, hex::encode(identity.key.to_bytes()))?;
        Ok(identity)
    }

    pub fn log_id(&self) -> LogId {
        LogId(self.key.verifying_key().to_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        self.key.sign(msg).to_bytes()
    }
}

impl From<[u8; 32]> for Identity {
    fn from(bytes: [u8; 32]) -> Self {
        Self::from_secret_bytes(&bytes)
    }
}

impl From<Identity> for [u8; 32] {
    fn from(identity: Identity) -> Self {
        identity.key.to_bytes()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.key.to_bytes() == other.key.to_bytes()
    }
}

impl Eq for Identity {}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:?})", self.log_id())
    }
}

/// Check `sig` over `msg` against the log's public key.
pub fn verify_signature(log: &LogId, msg: &[u8], sig: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(log.as_bytes())
        .map_err(|e| ServiceError::InvalidRecord(format!("log {log} is not a valid key: {e}")))?;
    let signature = Signature::from_slice(sig)
        .map_err(|e| ServiceError::InvalidRecord(format!("malformed signature: {e}")))?;
    key.verify(msg, &signature)
        .map_err(|_| ServiceError::InvalidRecord(format!("signature does not verify for log {log}")))
}
