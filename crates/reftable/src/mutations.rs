//! Convenience operations built on top of `Transaction`: single-ref
//! pseudoref updates that skip the general machinery's overhead, and bulk
//! helpers (delete, symref creation, rename) that just assemble the right
//! transaction.

use bstr::BString;
use reftable_hash::ObjectId;

use crate::backend::{RawRead, ReftableBackend};
use crate::error::RefError;
use crate::name::RefName;
use crate::transaction::{check_old_oid, Transaction, UpdateFlags};

/// What the caller expects to find before a pseudoref write goes through.
#[derive(Debug, Clone, Copy)]
pub enum Precondition {
    /// Overwrite unconditionally.
    Any,
    /// Fail unless the ref is currently absent.
    MustBeAbsent,
    /// Fail unless the ref currently holds exactly this value.
    MustEqual(ObjectId),
}

impl Precondition {
    fn flags_and_old(self) -> (UpdateFlags, Option<ObjectId>) {
        match self {
            Precondition::Any => (UpdateFlags::empty(), None),
            Precondition::MustBeAbsent => (UpdateFlags::HAVE_OLD, None),
            Precondition::MustEqual(oid) => (UpdateFlags::HAVE_OLD, Some(oid)),
        }
    }
}

/// Write a pseudoref (`HEAD`, `FETCH_HEAD` and the like): a single-ref,
/// never-dereferenced update. Checks its precondition up front so a
/// conflicting write fails before a stack slot is even reserved.
pub fn write_pseudoref(
    backend: &mut ReftableBackend,
    name: &RefName,
    precondition: Precondition,
    new_oid: ObjectId,
) -> Result<(), RefError> {
    let (mut flags, old_oid) = precondition.flags_and_old();
    check_old_oid(backend, name, old_oid, true).map_err(|e| RefError::PseudorefUpdate(e.to_string()))?;
    flags |= UpdateFlags::HAVE_NEW | UpdateFlags::NO_DEREF;

    let mut tx = Transaction::new();
    tx.add(name.clone(), flags, old_oid, Some(new_oid), None)?;
    tx.initial_commit(backend)
        .map_err(|e| RefError::PseudorefCommit(e.to_string()))
}

pub fn delete_pseudoref(
    backend: &mut ReftableBackend,
    name: &RefName,
    precondition: Precondition,
) -> Result<(), RefError> {
    let (mut flags, old_oid) = precondition.flags_and_old();
    check_old_oid(backend, name, old_oid, true).map_err(|e| RefError::PseudorefUpdate(e.to_string()))?;
    flags |= UpdateFlags::NO_DEREF;

    let mut tx = Transaction::new();
    tx.add(name.clone(), flags, old_oid, None, None)?;
    tx.initial_commit(backend)
        .map_err(|e| RefError::PseudorefCommit(e.to_string()))
}

/// Delete a batch of refs in one segment, without per-ref preconditions.
pub fn delete_refs(
    backend: &mut ReftableBackend,
    names: &[RefName],
    message: Option<BString>,
) -> Result<(), RefError> {
    let mut sorted = names.to_vec();
    sorted.sort();
    let mut tx = Transaction::new();
    for name in sorted {
        tx.add(name, UpdateFlags::empty(), None, None, message.clone())?;
    }
    tx.initial_commit(backend)
}

pub fn create_symref(
    backend: &mut ReftableBackend,
    name: RefName,
    target: RefName,
    message: Option<BString>,
) -> Result<(), RefError> {
    let mut tx = Transaction::new();
    tx.add_symref(name, UpdateFlags::HAVE_NEW, None, target, message)?;
    tx.initial_commit(backend)
}

/// Rename a direct ref, refusing if the destination already exists.
/// Renaming a symref is not supported: which target it should end up
/// pointing at after the move is ambiguous, so this rejects it outright
/// rather than guessing.
pub fn rename_ref(
    backend: &mut ReftableBackend,
    old_name: &RefName,
    new_name: &RefName,
    message: Option<BString>,
) -> Result<(), RefError> {
    if backend.raw_read(new_name)? != RawRead::NotFound {
        return Err(RefError::lock_conflict(new_name.to_string(), "rename target already exists"));
    }
    let oid = match backend.raw_read(old_name)? {
        RawRead::Direct(oid) => oid,
        RawRead::Symref(_) => return Err(RefError::Misuse("renaming a symref is not supported")),
        RawRead::NotFound => return Err(RefError::NotFound(old_name.clone())),
    };

    let mut tx = Transaction::new();
    tx.add(old_name.clone(), UpdateFlags::empty(), None, None, message.clone())?;
    tx.add(new_name.clone(), UpdateFlags::HAVE_NEW, None, Some(oid), message)?;
    tx.initial_commit(backend)
}
