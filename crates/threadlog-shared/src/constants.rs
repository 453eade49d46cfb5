/// Block envelope format version
pub const BLOCK_VERSION: u8 = 1;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// BLAKE3 content hash size in bytes
pub const HASH_SIZE: usize = 32;

/// Maximum encoded block size in bytes (256 KiB)
pub const MAX_BLOCK_SIZE: usize = 262_144;

/// Key derivation context (BLAKE3)
pub const KDF_CONTEXT_SEALED_INVITE: &str = "threadlog-sealed-invite-v1";
