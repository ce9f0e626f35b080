//! Collaborators the backend consumes as interfaces rather than owning
//! directly: who to attribute a write to, whether an object is known, and
//! how a name classifies for iteration/precondition purposes.

use reftable_hash::ObjectId;
use reftable_utils::date::{GitDate, Signature};
use reftable_utils::BString;

use crate::name::RefName;

/// Supplies the (name, email, time, tz-offset) identity stamped onto every
/// log record written by this process.
pub trait CommitterIdentity: Send + Sync {
    fn committer_info(&self) -> Signature;
}

/// A fixed identity, reused for every record. Matches a process that reads
/// `user.name`/`user.email` once at startup.
pub struct StaticIdentity(Signature);

impl StaticIdentity {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>) -> Self {
        Self(Signature {
            name: name.into(),
            email: email.into(),
            date: GitDate::now(),
        })
    }

    pub fn with_date(mut self, date: GitDate) -> Self {
        self.0.date = date;
        self
    }
}

impl CommitterIdentity for StaticIdentity {
    fn committer_info(&self) -> Signature {
        // Stamp a fresh timestamp per call so records written seconds apart
        // within the same process don't all carry the construction time.
        let mut sig = self.0.clone();
        sig.date = GitDate::now();
        sig
    }
}

/// Knows how to peel annotated tags and whether an oid names a known
/// object, without this crate needing to understand object storage.
pub trait ObjectDb: Send + Sync {
    /// Peel `oid` if it names an annotated tag; `None` if it isn't one or
    /// peeling isn't cheaply available.
    fn peel(&self, oid: &ObjectId) -> Option<ObjectId>;

    /// Whether `oid` resolves to a real object at all.
    fn resolves_to_object(&self, oid: &ObjectId) -> bool;
}

/// A permissive default: never peels, treats every non-null oid as valid.
/// Suitable for tests and for hosts that don't want broken-ref filtering.
#[derive(Default)]
pub struct NullObjectDb;

impl ObjectDb for NullObjectDb {
    fn peel(&self, _oid: &ObjectId) -> Option<ObjectId> {
        None
    }

    fn resolves_to_object(&self, oid: &ObjectId) -> bool {
        !oid.is_null()
    }
}

/// How a ref name classifies for per-worktree iteration and similar
/// scope-sensitive decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefScope {
    PerWorktree,
    Pseudoref,
    Normal,
}

pub trait RefClassifier: Send + Sync {
    fn classify(&self, name: &RefName) -> RefScope;
}

/// Classifies by the conventions common to worktree-aware ref stores:
/// `HEAD` and the other single-component sentinel names are per-worktree;
/// other all-caps single-component names are pseudorefs; everything else
/// (in particular everything under `refs/`) is normal.
#[derive(Default)]
pub struct DefaultRefClassifier;

const PER_WORKTREE: &[&str] = &[
    "HEAD",
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "BISECT_HEAD",
    "REBASE_HEAD",
];

impl RefClassifier for DefaultRefClassifier {
    fn classify(&self, name: &RefName) -> RefScope {
        let s = name.as_str();
        if PER_WORKTREE.contains(&s) {
            RefScope::PerWorktree
        } else if name.is_pseudoref_shaped() {
            RefScope::Pseudoref
        } else {
            RefScope::Normal
        }
    }
}
