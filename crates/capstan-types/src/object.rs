use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Ledger-domain identifier of one tracked object.
///
/// The ledger reports objects by a lowercase hex digest (the hash of the
/// object's content in the ledger's own domain). Capstan never interprets
/// the digest; it is an opaque correlation key for fetch and pin work.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHash(String);

impl ObjectHash {
    /// Parse a hash from its hex form.
    ///
    /// Rejects empty strings and non-hex characters. Uppercase input is
    /// normalized to lowercase so hashes compare and sort consistently.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::InvalidHash("empty".into()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHash(s.into()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// The full hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines (first 8 characters).
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.short())
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage-network address of a pinnable object.
///
/// Obtained by fetching the object's payload from the ledger and decoding
/// it: the payload arrives hex-encoded, and the decoded bytes are the
/// address string the storage network understands.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageAddress(String);

impl StorageAddress {
    /// Decode an address from a hex-encoded ledger payload.
    pub fn from_payload_hex(payload: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(payload).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let addr = String::from_utf8(bytes).map_err(|_| TypeError::InvalidPayload)?;
        if addr.is_empty() {
            return Err(TypeError::InvalidPayload);
        }
        Ok(Self(addr))
    }

    /// Wrap an already-decoded address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageAddress({})", self.0)
    }
}

impl fmt::Display for StorageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object type byte reported by the ledger.
///
/// Bit `0x80` marks blob objects, the only kind eligible for pinning.
/// Everything else is ledger-internal metadata and is skipped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(pub u8);

impl TypeTag {
    pub const BLOB_BIT: u8 = 0x80;

    /// Returns `true` if this object should be pinned into storage.
    pub fn is_blob(self) -> bool {
        self.0 & Self::BLOB_BIT != 0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({:#04x})", self.0)
    }
}

/// One row of a ledger object listing: hash plus type tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    #[serde(rename = "object_hash")]
    pub hash: ObjectHash,
    #[serde(rename = "object_type")]
    pub tag: TypeTag,
}

impl ObjectEntry {
    pub fn new(hash: ObjectHash, tag: u8) -> Self {
        Self {
            hash,
            tag: TypeTag(tag),
        }
    }
}
