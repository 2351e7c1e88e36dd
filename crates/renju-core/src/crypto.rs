//! Crypto collaborator seam.
//!
//! The byte-level key agreement is an external module per the system
//! contract: the session layer only needs `derive(peerPublic) → sharedKey`,
//! the server's public value, and an optional signature to transmit in the
//! `NewSession` reply. [`SessionCrypto`] is that seam.
//!
//! The symmetric half is built in: [`SessionKey`] is XChaCha20-Poly1305
//! with the frame's 16-byte IV expanded to the 24-byte AEAD nonce through
//! HKDF-SHA256. Authentication failure surfaces as a decrypt error; replay
//! protection is the IV/nonce handling's concern, not the session layer's.
//!
//! [`DevKeyExchange`] ships for development and tests only. It derives the
//! shared key from the two public values alone, which any eavesdropper can
//! also do (the same status as a self-signed TLS certificate). Production
//! deployments plug a real Diffie-Hellman implementation behind
//! [`SessionCrypto`].

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::env::Environment;

/// Label bound into the nonce expansion.
const NONCE_LABEL: &[u8] = b"renju-frame-nonce-v1";

/// Label bound into the development key derivation.
const DEV_KEY_LABEL: &[u8] = b"renju-dev-exchange-v1";

/// Size of peer public values accepted by [`DevKeyExchange`].
pub const PUBLIC_LEN: usize = 32;

/// Errors from the crypto seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Peer public value was malformed (wrong length, identity point, …).
    #[error("invalid peer public value: {0}")]
    BadPeerKey(String),

    /// Key agreement failed.
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// Ciphertext failed authentication or was malformed.
    #[error("decryption failed")]
    DecryptFailed,
}

/// Negotiated symmetric key for one session.
///
/// Encrypts and decrypts frame payloads under a 16-byte IV. Each call is
/// independent; the IV must be fresh per frame (the driver draws it from the
/// [`Environment`]).
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; 32],
}

impl SessionKey {
    /// Wrap raw key material.
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Expand a frame IV into the 24-byte XChaCha20 nonce.
    fn nonce_for(&self, iv: &[u8; renju_proto::IV_LEN]) -> [u8; 24] {
        let hkdf = Hkdf::<Sha256>::new(None, iv);
        let mut nonce = [0u8; 24];
        let Ok(()) = hkdf.expand(NONCE_LABEL, &mut nonce) else {
            unreachable!("24 bytes is a valid HKDF-SHA256 output length");
        };
        nonce
    }

    /// Encrypt a payload under the given IV.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8], iv: &[u8; renju_proto::IV_LEN]) -> Vec<u8> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let nonce = self.nonce_for(iv);
        let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };
        ciphertext
    }

    /// Decrypt a payload under the given IV.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::DecryptFailed`] when the authentication tag does not
    ///   verify (tampered ciphertext, wrong key, or wrong IV).
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8; renju_proto::IV_LEN],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let nonce = self.nonce_for(iv);
        cipher
            .decrypt(XNonce::from_slice(&nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

/// Key-agreement collaborator interface.
///
/// One instance serves the whole process; `derive` is called once per
/// session when the peer's `Pending` frame arrives.
pub trait SessionCrypto: Send + Sync + 'static {
    /// Server public value transmitted in the `NewSession` reply.
    fn server_public_bytes(&self) -> Vec<u8>;

    /// Signature over the server public value. Empty when the deployment
    /// does not sign.
    fn signature(&self) -> Vec<u8>;

    /// Derive the session key from the peer's public value.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::BadPeerKey`] / [`CryptoError::Derivation`] on
    ///   malformed input or failed agreement. The session layer reacts with
    ///   an Error frame and destroys the session.
    fn derive(&self, peer_public: &[u8]) -> Result<SessionKey, CryptoError>;
}

/// Development key exchange: shared key from public values only.
///
/// NOT secure: anyone observing the handshake can derive the same key.
/// Exists so the full frame pipeline (including real AEAD) runs in
/// development and tests without an external key-agreement module.
pub struct DevKeyExchange {
    public: [u8; PUBLIC_LEN],
}

impl DevKeyExchange {
    /// Create with a random public value drawn from the environment.
    #[must_use]
    pub fn new<E: Environment>(env: &E) -> Self {
        let mut public = [0u8; PUBLIC_LEN];
        env.random_bytes(&mut public);
        Self { public }
    }

    /// Create with a fixed public value (deterministic tests).
    #[must_use]
    pub fn with_public(public: [u8; PUBLIC_LEN]) -> Self {
        Self { public }
    }

    /// The key both sides arrive at: HKDF over the concatenated publics,
    /// smaller value first so the two ends agree on the input order.
    #[must_use]
    pub fn shared_key(a: &[u8; PUBLIC_LEN], b: &[u8; PUBLIC_LEN]) -> SessionKey {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut ikm = [0u8; PUBLIC_LEN * 2];
        ikm[..PUBLIC_LEN].copy_from_slice(lo);
        ikm[PUBLIC_LEN..].copy_from_slice(hi);

        let hkdf = Hkdf::<Sha256>::new(None, &ikm);
        let mut key = [0u8; 32];
        let Ok(()) = hkdf.expand(DEV_KEY_LABEL, &mut key) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };
        SessionKey::new(key)
    }
}

impl SessionCrypto for DevKeyExchange {
    fn server_public_bytes(&self) -> Vec<u8> {
        self.public.to_vec()
    }

    fn signature(&self) -> Vec<u8> {
        Vec::new()
    }

    fn derive(&self, peer_public: &[u8]) -> Result<SessionKey, CryptoError> {
        let peer: [u8; PUBLIC_LEN] = peer_public.try_into().map_err(|_| {
            CryptoError::BadPeerKey(format!(
                "expected {PUBLIC_LEN} bytes, got {}",
                peer_public.len()
            ))
        })?;

        Ok(Self::shared_key(&self.public, &peer))
    }
}
