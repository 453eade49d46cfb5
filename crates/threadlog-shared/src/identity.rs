use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::types::{PeerId, ThreadId};

/// An Ed25519 key pair. Nodes use one as their peer identity; every thread
/// owns another one whose public half is the thread id.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

/// On-disk form of a node identity. The public half is kept alongside the
/// secret so a corrupted file is caught on load.
#[derive(Serialize, Deserialize)]
pub struct IdentityExport {
    pub secret_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn from_export(export: &IdentityExport) -> Result<Self, IdentityError> {
        let identity = Self::from_secret_bytes(&export.secret_key);
        if identity.peer_id().0 != export.public_key {
            return Err(IdentityError::KeyMismatch);
        }
        Ok(identity)
    }

    pub fn to_export(&self) -> IdentityExport {
        IdentityExport {
            secret_key: self.signing_key.to_bytes(),
            public_key: self.peer_id().0,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId(self.signing_key.verifying_key().to_bytes())
    }

    /// The thread id this key pair stands for when used as a thread key.
    pub fn thread_id(&self) -> ThreadId {
        ThreadId(self.peer_id().0)
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        self.signing_key.as_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// X25519 secret matching this identity's Montgomery public key.
    pub fn x25519_secret(&self) -> x25519_dalek::StaticSecret {
        x25519_dalek::StaticSecret::from(self.signing_key.to_scalar_bytes())
    }
}

/// Verify a signature made by `peer` over `message`.
pub fn verify_signature(
    peer: &PeerId,
    message: &[u8],
    signature: &Signature,
) -> Result<(), IdentityError> {
    let verifying_key = VerifyingKey::from_bytes(&peer.0).map_err(|_| IdentityError::InvalidKeyBytes)?;
    verifying_key
        .verify(message, signature)
        .map_err(|_| IdentityError::BadSignature)
}

/// X25519 public key of a peer, derived from its Ed25519 identity.
pub fn x25519_public(peer: &PeerId) -> Result<x25519_dalek::PublicKey, IdentityError> {
    let verifying_key = VerifyingKey::from_bytes(&peer.0).map_err(|_| IdentityError::InvalidKeyBytes)?;
    Ok(x25519_dalek::PublicKey::from(
        verifying_key.to_montgomery().to_bytes(),
    ))
}
