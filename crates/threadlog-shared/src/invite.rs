use serde::{Deserialize, Serialize};

use crate::constants::SYMMETRIC_KEY_SIZE;
use crate::crypto::{self, SymmetricKey};
use crate::identity::Identity;
use crate::types::{Hash, PeerId, ThreadId, ThreadKind};

/// Everything an invitee needs to materialize a thread locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteBody {
    pub thread_secret: [u8; 32],
    pub thread_key: SymmetricKey,
    pub key: String,
    pub name: String,
    pub schema: Option<Hash>,
    pub initiator: PeerId,
    pub kind: ThreadKind,
    pub inviter_username: Option<String>,
}

impl InviteBody {
    /// The thread id implied by the carried secret.
    pub fn thread_id(&self) -> ThreadId {
        Identity::from_secret_bytes(&self.thread_secret).thread_id()
    }

    /// Seal the body so only `invitee` can open it.
    pub fn seal_for(&self, invitee: &PeerId) -> Result<Vec<u8>, InviteError> {
        let plain = bincode::serialize(self).map_err(|_| InviteError::InvalidFormat)?;
        crypto::seal_to(invitee, &plain).map_err(|_| InviteError::InvalidRecipient)
    }

    /// Open a body sealed to `identity`.
    pub fn open_sealed(identity: &Identity, sealed: &[u8]) -> Result<Self, InviteError> {
        let plain = crypto::open_sealed(identity, sealed).map_err(|_| InviteError::NotInvitee)?;
        bincode::deserialize(&plain).map_err(|_| InviteError::InvalidFormat)
    }

    /// Encrypt the body with an out-of-band key.
    pub fn encrypt_with(&self, key: &SymmetricKey) -> Result<Vec<u8>, InviteError> {
        let plain = bincode::serialize(self).map_err(|_| InviteError::InvalidFormat)?;
        crypto::encrypt(key, &plain).map_err(|_| InviteError::InvalidFormat)
    }

    /// Decrypt a body with the out-of-band key shared alongside the invite.
    pub fn decrypt_with(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Self, InviteError> {
        let plain = crypto::decrypt(key, ciphertext).map_err(|_| InviteError::WrongKey)?;
        bincode::deserialize(&plain).map_err(|_| InviteError::InvalidFormat)
    }
}

/// Link material for an external invite: the block address plus the key
/// that unlocks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalInvite {
    pub id: Hash,
    pub key: SymmetricKey,
    pub inviter: Option<String>,
}

impl ExternalInvite {
    /// Encode the key as a base64url string (copiable code).
    pub fn encoded_key(&self) -> String {
        encode_key(&self.key)
    }
}

pub fn encode_key(key: &SymmetricKey) -> String {
    base64_url_encode(key)
}

/// Decode a base64url key string back into key bytes.
pub fn decode_key(code: &str) -> Result<SymmetricKey, InviteError> {
    let bytes = base64_url_decode(code)?;
    if bytes.len() != SYMMETRIC_KEY_SIZE {
        return Err(InviteError::InvalidFormat);
    }
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    #[error("Invalid invite format")]
    InvalidFormat,

    #[error("Invite key does not unlock this invite")]
    WrongKey,

    #[error("Invite is not addressed to this peer")]
    NotInvitee,

    #[error("Invite recipient key is invalid")]
    InvalidRecipient,

    #[error("Block {0} is not an invite")]
    NotAnInvite(Hash),

    #[error("Invite {0} has already been consumed")]
    Consumed(Hash),

    #[error("Invite carries a thread key that does not match its block")]
    ThreadMismatch,

    #[error("Base64 decode error")]
    Base64Decode,
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, InviteError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|_| InviteError::Base64Decode)
}
