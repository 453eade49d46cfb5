use thiserror::Error;

use crate::block::BlockType;
use crate::types::{Hash, PeerId, ThreadId};

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Recipient key is not a valid Ed25519 point")]
    InvalidRecipient,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Exported public key does not match its secret key")]
    KeyMismatch,
}

/// Reasons a block is rejected while being encoded or decoded.
///
/// An unknown type tag is kept apart from a known tag with a broken payload:
/// the former usually means a newer peer, the latter a faulty one.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unknown block type tag: {0:#04x}")]
    UnknownBlockType(u8),

    #[error("Malformed {kind:?} payload: {reason}")]
    Malformed { kind: BlockType, reason: String },

    #[error("Malformed block envelope: {0}")]
    Envelope(String),

    #[error("Unsupported block version: {0}")]
    UnsupportedVersion(u8),

    #[error("Author identity cannot be resolved: {0}")]
    UnresolvableAuthor(PeerId),

    #[error("Invalid block signature from {0}")]
    InvalidSignature(PeerId),

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("Block too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Expected a {expected:?} block, got {actual:?}")]
    UnexpectedType { expected: BlockType, actual: BlockType },

    #[error("Block belongs to thread {actual}, not {expected}")]
    WrongThread { expected: ThreadId, actual: ThreadId },
}
