use crate::ObjectId;

/// Hash algorithms a reftable segment's records may be keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1 (20 bytes / 160 bits).
    Sha1,
    /// SHA-256 (32 bytes / 256 bits).
    Sha256,
}

impl HashAlgorithm {
    /// The 4-byte format identifier stamped into a stack's write options,
    /// matching C git's on-disk hash identifiers.
    pub const fn format_id(&self) -> u32 {
        match self {
            // "sha1" in ASCII
            Self::Sha1 => 0x7368_6131,
            // "s256" in ASCII
            Self::Sha256 => 0x7332_3536,
        }
    }

    /// Look up a hash algorithm by hex string length, used to infer which
    /// algorithm produced a given object id from its text encoding alone.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}
