//! Block envelope and typed payloads.
//!
//! A block travels as a bincode-encoded [`Envelope`]: a header, a raw type
//! tag, the payload bytes and the author's Ed25519 signature over the other
//! three. The content hash of a block is the BLAKE3 digest of those bytes.
//! Payloads are decoded only after the tag has been matched to a
//! [`BlockType`].

use chrono::{DateTime, Utc};
use ed25519_dalek::Signature;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::constants::{BLOCK_VERSION, MAX_BLOCK_SIZE};
use crate::error::CodecError;
use crate::identity::{verify_signature, Identity};
use crate::types::{Hash, PeerId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    Join = 0x01,
    Leave = 0x02,
    Invite = 0x03,
    ExternalInvite = 0x04,
    Message = 0x05,
}

impl BlockType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Join),
            0x02 => Some(Self::Leave),
            0x03 => Some(Self::Invite),
            0x04 => Some(Self::ExternalInvite),
            0x05 => Some(Self::Message),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether blocks of this type extend a thread's chain. Invites are
    /// capabilities handed to a single recipient and never become the head.
    pub fn is_chain(self) -> bool {
        !matches!(self, Self::Invite | Self::ExternalInvite)
    }
}

/// Metadata every block carries. `parent` is the head the author saw when
/// building the block; `None` only for the first block of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u8,
    pub thread_id: ThreadId,
    pub author: PeerId,
    pub date: DateTime<Utc>,
    pub parent: Option<Hash>,
}

impl BlockHeader {
    pub fn new(thread_id: ThreadId, author: PeerId, parent: Option<Hash>) -> Self {
        Self {
            version: BLOCK_VERSION,
            thread_id,
            author,
            date: Utc::now(),
            parent,
        }
    }
}

/// A peer announcing its membership. `inviter` names the member whose
/// invite is being accepted, or the author itself for a thread's genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub inviter: PeerId,
    pub username: Option<String>,
    pub inboxes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePayload;

/// Direct invite: an invite body sealed to `invitee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitePayload {
    pub invitee: PeerId,
    pub sealed: Vec<u8>,
}

/// External invite: an invite body encrypted with an out-of-band key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalInvitePayload {
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub body: String,
}

/// Typed block body, one variant per [`BlockType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Join(JoinPayload),
    Leave(LeavePayload),
    Invite(InvitePayload),
    ExternalInvite(ExternalInvitePayload),
    Message(MessagePayload),
}

impl Payload {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Join(_) => BlockType::Join,
            Self::Leave(_) => BlockType::Leave,
            Self::Invite(_) => BlockType::Invite,
            Self::ExternalInvite(_) => BlockType::ExternalInvite,
            Self::Message(_) => BlockType::Message,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let kind = self.block_type();
        let res = match self {
            Self::Join(p) => bincode::serialize(p),
            Self::Leave(p) => bincode::serialize(p),
            Self::Invite(p) => bincode::serialize(p),
            Self::ExternalInvite(p) => bincode::serialize(p),
            Self::Message(p) => bincode::serialize(p),
        };
        res.map_err(|e| CodecError::Malformed {
            kind,
            reason: e.to_string(),
        })
    }

    /// Dispatch on the raw tag, then decode the body for that type.
    pub fn decode(tag: u8, bytes: &[u8]) -> Result<Self, CodecError> {
        let kind = BlockType::from_byte(tag).ok_or(CodecError::UnknownBlockType(tag))?;
        Ok(match kind {
            BlockType::Join => Self::Join(decode_body(kind, bytes)?),
            BlockType::Leave => Self::Leave(decode_body(kind, bytes)?),
            BlockType::Invite => Self::Invite(decode_body(kind, bytes)?),
            BlockType::ExternalInvite => Self::ExternalInvite(decode_body(kind, bytes)?),
            BlockType::Message => Self::Message(decode_body(kind, bytes)?),
        })
    }
}

fn decode_body<T: DeserializeOwned>(kind: BlockType, bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

/// On-the-wire form of a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    header: BlockHeader,
    tag: u8,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

fn signing_bytes(header: &BlockHeader, tag: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(&(header, tag, payload)).map_err(|e| CodecError::Envelope(e.to_string()))
}

/// A decoded, signature-checked block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Payload,
}

/// A block after encoding: its bytes and their content hash.
#[derive(Debug, Clone)]
pub struct SealedBlock {
    pub hash: Hash,
    pub bytes: Vec<u8>,
    pub block: Block,
}

impl Block {
    pub fn new(header: BlockHeader, payload: Payload) -> Self {
        Self { header, payload }
    }

    pub fn block_type(&self) -> BlockType {
        self.payload.block_type()
    }

    /// Sign with `author` and serialize. The author must match the header.
    pub fn seal(self, author: &Identity) -> Result<SealedBlock, CodecError> {
        if author.peer_id() != self.header.author {
            return Err(CodecError::InvalidSignature(self.header.author));
        }
        let tag = self.block_type().as_byte();
        let payload = self.payload.encode()?;
        let signature = author.sign(&signing_bytes(&self.header, tag, &payload)?);

        let envelope = Envelope {
            header: self.header.clone(),
            tag,
            payload,
            signature: signature.to_bytes().to_vec(),
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| CodecError::Envelope(e.to_string()))?;
        if bytes.len() > MAX_BLOCK_SIZE {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                max: MAX_BLOCK_SIZE,
            });
        }

        Ok(SealedBlock {
            hash: Hash::of(&bytes),
            bytes,
            block: self,
        })
    }

    /// Decode `bytes` fetched under `hash`, checking in order: the content
    /// hash, the author key, the signature, the type tag and the payload.
    pub fn open(hash: &Hash, bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() > MAX_BLOCK_SIZE {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                max: MAX_BLOCK_SIZE,
            });
        }
        let actual = Hash::of(bytes);
        if actual != *hash {
            return Err(CodecError::HashMismatch {
                expected: *hash,
                actual,
            });
        }

        let envelope = peek_envelope(bytes)?;
        let author = envelope.header.author;

        let signature =
            Signature::from_slice(&envelope.signature).map_err(|_| CodecError::InvalidSignature(author))?;
        let message = signing_bytes(&envelope.header, envelope.tag, &envelope.payload)?;
        verify_signature(&author, &message, &signature).map_err(|e| match e {
            crate::error::IdentityError::InvalidKeyBytes => CodecError::UnresolvableAuthor(author),
            _ => CodecError::InvalidSignature(author),
        })?;

        let payload = Payload::decode(envelope.tag, &envelope.payload)?;
        Ok(Self {
            header: envelope.header,
            payload,
        })
    }
}

fn peek_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let envelope: Envelope =
        bincode::deserialize(bytes).map_err(|e| CodecError::Envelope(e.to_string()))?;
    if envelope.header.version != BLOCK_VERSION {
        return Err(CodecError::UnsupportedVersion(envelope.header.version));
    }
    Ok(envelope)
}

/// Read a block's header without verifying it, to route it to its thread.
pub fn peek_header(bytes: &[u8]) -> Result<BlockHeader, CodecError> {
    peek_envelope(bytes).map(|e| e.header)
}
