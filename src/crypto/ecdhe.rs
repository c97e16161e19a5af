//! Ephemeral X25519 key agreement bootstrapped by a pre-shared secret.
//!
//! Each peer generates a fresh keypair per session. Once both public keys,
//! the server's salt, and the server's challenge are known, the shared
//! material expands under HKDF-SHA256 into two independently-labeled
//! XChaCha20-Poly1305 contexts (envelope and payload) plus a challenge
//! response either peer can recompute:
//!
//! ```text
//! ikm = DH(local, peer) ‖ pre_shared ‖ challenge
//! envelope_key       = HKDF(salt, ikm, "nettask v1 envelope")
//! payload_key        = HKDF(salt, ikm, "nettask v1 payload")
//! challenge_response = HKDF(salt, ikm, "nettask v1 challenge response")
//! ```
//!
//! IVs are 24 random bytes carried in every record; there is no counter
//! state, so sealing takes `&self`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::core::{
    CryptoError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, HASH_LEN, PUBLIC_KEY_SIZE, SESSION_KEY_SIZE,
};

use super::record::EncryptedRecord;

const ENVELOPE_INFO: &[u8] = b"nettask v1 envelope";
const PAYLOAD_INFO: &[u8] = b"nettask v1 payload";
const RESPONSE_INFO: &[u8] = b"nettask v1 challenge response";

/// A derived AEAD key, zeroized on drop.
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// The raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Material produced by [`EcdheSession::derive_shared_secret`].
struct DerivedSecrets {
    envelope_key: SessionKey,
    payload_key: SessionKey,
    challenge_response: [u8; HASH_LEN],
}

/// One peer's half of an ephemeral key agreement.
///
/// Freshly generated per registration attempt. Before
/// [`derive_shared_secret`](Self::derive_shared_secret) succeeds, only
/// [`public_key`](Self::public_key) is useful; the sealing operations fail
/// with [`CryptoError::NotEstablished`].
pub struct EcdheSession {
    secret: StaticSecret,
    public: PublicKey,
    derived: Option<DerivedSecrets>,
}

impl EcdheSession {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            derived: None,
        }
    }

    /// The local ephemeral public key.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Whether the shared secret has been derived.
    pub fn is_established(&self) -> bool {
        self.derived.is_some()
    }

    /// Derive the shared session material.
    ///
    /// `salt` and `challenge` are the server-issued nonces from the
    /// registration challenge; `pre_shared` is the out-of-band secret both
    /// peers hold. After this returns, the session can seal and open records
    /// and answer the registration challenge.
    pub fn derive_shared_secret(
        &mut self,
        peer_public: &[u8; PUBLIC_KEY_SIZE],
        salt: &[u8],
        challenge: &[u8],
        pre_shared: &[u8],
    ) -> Result<(), CryptoError> {
        let dh = self.secret.diffie_hellman(&PublicKey::from(*peer_public));

        let mut ikm = Zeroizing::new(Vec::with_capacity(
            dh.as_bytes().len() + pre_shared.len() + challenge.len(),
        ));
        ikm.extend_from_slice(dh.as_bytes());
        ikm.extend_from_slice(pre_shared);
        ikm.extend_from_slice(challenge);

        let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);

        let mut envelope_key = [0u8; SESSION_KEY_SIZE];
        let mut payload_key = [0u8; SESSION_KEY_SIZE];
        let mut challenge_response = [0u8; HASH_LEN];
        hk.expand(ENVELOPE_INFO, &mut envelope_key)
            .map_err(|_| CryptoError::DeriveFailed)?;
        hk.expand(PAYLOAD_INFO, &mut payload_key)
            .map_err(|_| CryptoError::DeriveFailed)?;
        hk.expand(RESPONSE_INFO, &mut challenge_response)
            .map_err(|_| CryptoError::DeriveFailed)?;

        self.derived = Some(DerivedSecrets {
            envelope_key: SessionKey::from_bytes(envelope_key),
            payload_key: SessionKey::from_bytes(payload_key),
            challenge_response,
        });

        envelope_key.zeroize();
        payload_key.zeroize();

        Ok(())
    }

    /// The derived challenge response the agent sends back and the server
    /// verifies.
    pub fn challenge_response(&self) -> Result<[u8; HASH_LEN], CryptoError> {
        Ok(self.secrets()?.challenge_response)
    }

    /// Seal application bytes under the payload context.
    pub fn encrypt(&self, plain: &[u8]) -> Result<EncryptedRecord, CryptoError> {
        seal(&self.secrets()?.payload_key, plain)
    }

    /// Open a record sealed under the payload context.
    pub fn decrypt(&self, record: &EncryptedRecord) -> Result<Vec<u8>, CryptoError> {
        open(&self.secrets()?.payload_key, record)
    }

    /// Seal an outer datagram payload under the envelope context.
    pub fn envelope(&self, plain: &[u8]) -> Result<EncryptedRecord, CryptoError> {
        seal(&self.secrets()?.envelope_key, plain)
    }

    /// Open a record sealed under the envelope context.
    pub fn open_envelope(&self, record: &EncryptedRecord) -> Result<Vec<u8>, CryptoError> {
        open(&self.secrets()?.envelope_key, record)
    }

    fn secrets(&self) -> Result<&DerivedSecrets, CryptoError> {
        self.derived.as_ref().ok_or(CryptoError::NotEstablished)
    }
}

/// The server's canonical session identifier: SHA-256 over both public keys
/// and the pre-shared secret.
pub fn derive_session_id(
    agent_public: &[u8],
    server_public: &[u8],
    pre_shared: &[u8],
) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(agent_public);
    hasher.update(server_public);
    hasher.update(pre_shared);
    hasher.finalize().into()
}

fn seal(key: &SessionKey, plain: &[u8]) -> Result<EncryptedRecord, CryptoError> {
    let mut iv = [0u8; AEAD_NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let mut sealed = cipher
        .encrypt(XNonce::from_slice(&iv), plain)
        .map_err(|_| CryptoError::SealFailed)?;

    // The cipher appends the tag; split it into its own field.
    let tag = sealed.split_off(sealed.len() - AEAD_TAG_SIZE);
    Ok(EncryptedRecord {
        iv: iv.to_vec(),
        tag,
        ciphertext: sealed,
    })
}

fn open(key: &SessionKey, record: &EncryptedRecord) -> Result<Vec<u8>, CryptoError> {
    if record.iv.len() != AEAD_NONCE_SIZE || record.tag.len() != AEAD_TAG_SIZE {
        return Err(CryptoError::OpenFailed);
    }

    let mut sealed = Vec::with_capacity(record.ciphertext.len() + AEAD_TAG_SIZE);
    sealed.extend_from_slice(&record.ciphertext);
    sealed.extend_from_slice(&record.tag);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(&record.iv), sealed.as_slice())
        .map_err(|_| CryptoError::OpenFailed)
}
