use serde::{Deserialize, Serialize};

use crate::constants::{HASH_SIZE, PUBKEY_SIZE};

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let bytes = hex::decode(s.trim())?;
    if bytes.len() != N {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// Peer identity = Ed25519 public key (32 bytes)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; PUBKEY_SIZE]);

impl PeerId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed(s).map(Self)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A thread is identified by the public half of its own signing key pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub [u8; PUBKEY_SIZE]);

impl ThreadId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed(s).map(Self)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// BLAKE3 digest of a serialized block. Doubles as the block's global address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
    /// Hash the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed(s).map(Self)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Access policy of a thread, fixed at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThreadKind {
    Private,
    ReadOnly,
    Public,
    Open,
}

impl ThreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::ReadOnly => "read_only",
            Self::Public => "public",
            Self::Open => "open",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "read_only" => Some(Self::ReadOnly),
            "public" => Some(Self::Public),
            "open" => Some(Self::Open),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = Hash::of(b"block bytes");
        let parsed = Hash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
        assert_eq!(hash.short().len(), 8);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(PeerId::from_hex("abcd").is_err());
        assert!(ThreadId::from_hex(&"ab".repeat(33)).is_err());
        assert!(Hash::from_hex("zz").is_err());
    }

    #[test]
    fn test_thread_kind_names() {
        for kind in [
            ThreadKind::Private,
            ThreadKind::ReadOnly,
            ThreadKind::Public,
            ThreadKind::Open,
        ] {
            assert_eq!(ThreadKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ThreadKind::from_name("secret"), None);
    }
}
