use reftable_hash::ObjectId;
use reftable_utils::date::Signature;
use reftable_utils::BString;

use crate::name::RefName;

/// The three disjoint shapes a ref record's payload can take, plus the
/// deliberately-empty tombstone shape used to mark a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPayload {
    Direct(ObjectId),
    /// A direct hash alongside the commit a peelable tag points at.
    Peeled { value: ObjectId, peeled: ObjectId },
    Symbolic(RefName),
    /// Empty payload. Shadows whatever this name resolved to in older
    /// segments; collapsed to "not found" by the merged view.
    Deleted,
}

impl RefPayload {
    pub fn direct_hash(&self) -> Option<ObjectId> {
        match self {
            Self::Direct(oid) | Self::Peeled { value: oid, .. } => Some(*oid),
            Self::Symbolic(_) | Self::Deleted => None,
        }
    }

    pub fn symref_target(&self) -> Option<&RefName> {
        match self {
            Self::Symbolic(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// One ref binding as it appears in a stack segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    pub name: RefName,
    pub update_index: u64,
    pub payload: RefPayload,
}

impl RefRecord {
    pub fn direct(name: RefName, update_index: u64, oid: ObjectId) -> Self {
        Self {
            name,
            update_index,
            payload: RefPayload::Direct(oid),
        }
    }

    pub fn peeled(name: RefName, update_index: u64, value: ObjectId, peeled: ObjectId) -> Self {
        Self {
            name,
            update_index,
            payload: RefPayload::Peeled { value, peeled },
        }
    }

    pub fn symbolic(name: RefName, update_index: u64, target: RefName) -> Self {
        Self {
            name,
            update_index,
            payload: RefPayload::Symbolic(target),
        }
    }

    pub fn tombstone(name: RefName, update_index: u64) -> Self {
        Self {
            name,
            update_index,
            payload: RefPayload::Deleted,
        }
    }
}

/// One reflog entry as it appears in a stack segment.
///
/// `update_index` is usually the ts of the segment that wrote it, but
/// expiry tombstones are the exception: they carry the update-index of the
/// *original* entry they shadow, not the ts of the segment the tombstone
/// itself lives in (see `crate::reflog::expire`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub ref_name: RefName,
    pub update_index: u64,
    pub old_hash: Option<ObjectId>,
    pub new_hash: Option<ObjectId>,
    pub committer: Signature,
    pub message: Option<BString>,
}

impl LogRecord {
    pub fn is_tombstone(&self) -> bool {
        self.old_hash.is_none() && self.new_hash.is_none()
    }

    pub fn tombstone(ref_name: RefName, update_index: u64, committer: Signature) -> Self {
        Self {
            ref_name,
            update_index,
            old_hash: None,
            new_hash: None,
            committer,
            message: None,
        }
    }
}
