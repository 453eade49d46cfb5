//! Symmetric sealing of thread payloads and one-recipient boxes for invites.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::constants::{KDF_CONTEXT_SEALED_INVITE, NONCE_SIZE};
use crate::error::CryptoError;
use crate::identity::{x25519_public, Identity};
use crate::types::PeerId;

pub type SymmetricKey = [u8; 32];

const EPHEMERAL_KEY_SIZE: usize = 32;

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = SymmetricKey::default();
    OsRng.fill_bytes(&mut key);
    key
}

/// XChaCha20-Poly1305 under `key`. The random nonce leads the output.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let sealed = XChaCha20Poly1305::new(key.into())
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = nonce.to_vec();
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, sealed) = data.split_at(NONCE_SIZE);

    XChaCha20Poly1305::new(key.into())
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}

// Both public keys go into the KDF so a box cannot be replayed to another recipient.
fn derive_sealing_key(shared_secret: &[u8], ephemeral: &PublicKey, recipient: &PublicKey) -> SymmetricKey {
    *blake3::Hasher::new_derive_key(KDF_CONTEXT_SEALED_INVITE)
        .update(shared_secret)
        .update(ephemeral.as_bytes())
        .update(recipient.as_bytes())
        .finalize()
        .as_bytes()
}

/// Encrypt `plaintext` so only the holder of `recipient`'s identity can read it.
///
/// Output layout: ephemeral X25519 public key (32) || nonce (24) || ciphertext.
pub fn seal_to(recipient: &PeerId, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let recipient_pk = x25519_public(recipient).map_err(|_| CryptoError::InvalidRecipient)?;
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient_pk);
    let key = derive_sealing_key(shared.as_bytes(), &ephemeral_pk, &recipient_pk);

    let body = encrypt(&key, plaintext)?;
    let mut out = ephemeral_pk.as_bytes().to_vec();
    out.extend_from_slice(&body);
    Ok(out)
}

/// Open a box produced by [`seal_to`] with the recipient's identity.
pub fn open_sealed(identity: &Identity, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < EPHEMERAL_KEY_SIZE + NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (ephemeral_bytes, body) = data.split_at(EPHEMERAL_KEY_SIZE);
    let mut ephemeral = [0u8; EPHEMERAL_KEY_SIZE];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_pk = PublicKey::from(ephemeral);

    let secret = identity.x25519_secret();
    let recipient_pk = PublicKey::from(&secret);
    let shared = secret.diffie_hellman(&ephemeral_pk);
    let key = derive_sealing_key(shared.as_bytes(), &ephemeral_pk, &recipient_pk);

    decrypt(&key, body)
}
