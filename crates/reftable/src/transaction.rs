//! Atomic, ordered ref updates: stage a batch of changes, have symrefs in
//! the batch fix up automatically, check preconditions, then commit every
//! ref record and log entry in a single new segment.

use bstr::BString;
use reftable_hash::ObjectId;

use crate::backend::{RawRead, ReftableBackend, Resolved};
use crate::error::RefError;
use crate::name::RefName;
use crate::record::{LogRecord, RefRecord};
use crate::stack::{Addition, Writer};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UpdateFlags: u8 {
        /// The caller supplied an expected current value; fail with a
        /// lock conflict if the stored value doesn't match.
        const HAVE_OLD = 1 << 0;
        /// The caller supplied a new value (its absence means delete).
        const HAVE_NEW = 1 << 1;
        /// Don't follow this name if it currently names a symref; write
        /// (or check) the symref itself rather than its target.
        const NO_DEREF = 1 << 2;
        /// Write only a log entry under this name; used for the original
        /// name of an update redirected to a symref's target.
        const LOG_ONLY = 1 << 3;
    }
}

/// What kind of ref record (if any) an update resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    Direct,
    Symref(RefName),
    Delete,
}

#[derive(Debug, Clone)]
pub struct RefUpdate {
    pub refname: RefName,
    pub flags: UpdateFlags,
    pub old_oid: Option<ObjectId>,
    pub new_oid: Option<ObjectId>,
    pub message: Option<BString>,
    pub kind: RefKind,
    /// Index of the update this one was synthesized from during symref
    /// fix-up, if any.
    pub parent: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Open,
    Prepared,
    Finished,
    Aborted,
}

/// A batch of ref updates committed as a single append to the stack.
pub struct Transaction {
    updates: Vec<RefUpdate>,
    state: TransactionState,
    addition: Option<Addition>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            updates: Vec::new(),
            state: TransactionState::Open,
            addition: None,
        }
    }

    /// Queue a direct-hash update, or a deletion if `new_oid` is `None`.
    pub fn add(
        &mut self,
        refname: RefName,
        flags: UpdateFlags,
        old_oid: Option<ObjectId>,
        new_oid: Option<ObjectId>,
        message: Option<BString>,
    ) -> Result<(), RefError> {
        self.require_open()?;
        let kind = if new_oid.is_some() { RefKind::Direct } else { RefKind::Delete };
        self.updates.push(RefUpdate {
            refname,
            flags,
            old_oid,
            new_oid,
            message,
            kind,
            parent: None,
        });
        Ok(())
    }

    /// Queue a symref write. Always `NO_DEREF`: writing a symref means
    /// writing it, not chasing its eventual target.
    pub fn add_symref(
        &mut self,
        refname: RefName,
        flags: UpdateFlags,
        old_oid: Option<ObjectId>,
        target: RefName,
        message: Option<BString>,
    ) -> Result<(), RefError> {
        self.require_open()?;
        self.updates.push(RefUpdate {
            refname,
            flags: flags | UpdateFlags::NO_DEREF,
            old_oid,
            new_oid: None,
            message,
            kind: RefKind::Symref(target),
            parent: None,
        });
        Ok(())
    }

    fn require_open(&self) -> Result<(), RefError> {
        if self.state != TransactionState::Open {
            return Err(RefError::Misuse(
                "updates cannot be added to a transaction once it has been prepared",
            ));
        }
        Ok(())
    }

    /// Redirect updates targeting a symref onto the name it points at,
    /// leaving a log-only entry under the original name. Only looks at
    /// updates present when this call started: updates synthesized by this
    /// pass are never themselves re-dereferenced.
    fn fixup_symrefs(&mut self, backend: &mut ReftableBackend) -> Result<(), RefError> {
        let original_len = self.updates.len();
        for i in 0..original_len {
            let u = &self.updates[i];
            if u.flags.contains(UpdateFlags::NO_DEREF) {
                continue;
            }
            let refname = u.refname.clone();
            let have_old = u.flags.contains(UpdateFlags::HAVE_OLD);
            let have_new = u.flags.contains(UpdateFlags::HAVE_NEW);
            let old_oid = u.old_oid;
            let new_oid = u.new_oid;
            let message = u.message.clone();

            let RawRead::Symref(target) = backend.raw_read(&refname)? else {
                continue;
            };

            self.updates[i].flags = UpdateFlags::LOG_ONLY
                | UpdateFlags::NO_DEREF
                | if have_new { UpdateFlags::HAVE_NEW } else { UpdateFlags::empty() };

            let mut child_flags = UpdateFlags::NO_DEREF;
            if have_new {
                child_flags |= UpdateFlags::HAVE_NEW;
            }
            if have_old {
                child_flags |= UpdateFlags::HAVE_OLD;
            }
            self.updates.push(RefUpdate {
                refname: target,
                flags: child_flags,
                old_oid: if have_old { old_oid } else { None },
                new_oid,
                message,
                kind: if new_oid.is_some() { RefKind::Direct } else { RefKind::Delete },
                parent: Some(i),
            });
        }
        Ok(())
    }

    /// Run symref fix-up and reserve a slot in the stack for this batch.
    pub fn prepare(&mut self, backend: &mut ReftableBackend) -> Result<(), RefError> {
        if self.state != TransactionState::Open {
            return Err(RefError::Misuse("prepare() called more than once"));
        }
        self.fixup_symrefs(backend)
            .map_err(|e| RefError::TransactionPrepare(e.to_string()))?;
        let addition = backend
            .stack_mut()?
            .new_addition()
            .map_err(|e| RefError::TransactionPrepare(e.to_string()))?;
        self.addition = Some(addition);
        self.state = TransactionState::Prepared;
        Ok(())
    }

    /// Check every `HAVE_OLD` precondition, then commit the batch as one
    /// new segment.
    pub fn finish(&mut self, backend: &mut ReftableBackend) -> Result<(), RefError> {
        if self.state != TransactionState::Prepared {
            return Err(RefError::Misuse("finish() called before a successful prepare()"));
        }

        for u in &self.updates {
            if u.flags.contains(UpdateFlags::HAVE_OLD) {
                check_old_oid(backend, &u.refname, u.old_oid, u.flags.contains(UpdateFlags::NO_DEREF))?;
            }
        }

        let committer = backend.committer_identity();
        let updates = std::mem::take(&mut self.updates);
        let mut addition = self
            .addition
            .take()
            .ok_or(RefError::Misuse("finish() called without a prepared addition"))?;

        if let Err(e) = addition.add(|w| write_transaction_table(w, &updates, &committer)) {
            self.state = TransactionState::Aborted;
            return Err(RefError::TransactionFailure(e.to_string()));
        }

        backend
            .stack_mut()?
            .commit_addition(addition)
            .map_err(|e| RefError::TransactionFailure(e.to_string()))?;
        self.state = TransactionState::Finished;
        Ok(())
    }

    /// Discard every queued update and release the reserved stack slot.
    pub fn abort(&mut self) {
        self.addition = None;
        self.state = TransactionState::Aborted;
    }

    /// Convenience for a transaction committed in one shot: prepare then
    /// finish without an intervening chance to add more updates.
    pub fn initial_commit(&mut self, backend: &mut ReftableBackend) -> Result<(), RefError> {
        self.prepare(backend)?;
        self.finish(backend)
    }
}

/// Shared precondition check used by transaction finish and the pseudoref
/// fast path: compare a caller-supplied expected value against what's
/// actually stored, dereferencing symrefs unless `no_deref` is set.
pub(crate) fn check_old_oid(
    backend: &mut ReftableBackend,
    refname: &RefName,
    expected: Option<ObjectId>,
    no_deref: bool,
) -> Result<(), RefError> {
    let current = if no_deref {
        match backend.raw_read(refname)? {
            RawRead::Direct(oid) => Some(oid),
            RawRead::Symref(_) | RawRead::NotFound => None,
        }
    } else {
        match backend.resolve_ref_unsafe(refname)? {
            Resolved::Object { oid, .. } => Some(oid),
            Resolved::Missing(_) => None,
        }
    };
    if current != expected {
        return Err(RefError::lock_conflict(
            refname.to_string(),
            "old value does not match the currently stored value",
        ));
    }
    Ok(())
}

/// Writer callback shared by every transaction: all live ref records in
/// name order, then a log entry for every update (including log-only
/// ones) in the same order, all stamped with the segment's one ts.
pub(crate) fn write_transaction_table(
    writer: &mut Writer,
    updates: &[RefUpdate],
    committer: &reftable_utils::date::Signature,
) -> Result<(), RefError> {
    let ts = writer.next_update_index();
    let mut sorted: Vec<&RefUpdate> = updates.iter().collect();
    sorted.sort_by(|a, b| a.refname.as_bstr().cmp(b.refname.as_bstr()));

    for u in &sorted {
        if u.flags.contains(UpdateFlags::LOG_ONLY) {
            continue;
        }
        let record = match &u.kind {
            RefKind::Direct => RefRecord::direct(
                u.refname.clone(),
                ts,
                u.new_oid.ok_or(RefError::Misuse("direct update missing its new oid"))?,
            ),
            RefKind::Symref(target) => RefRecord::symbolic(u.refname.clone(), ts, target.clone()),
            RefKind::Delete => RefRecord::tombstone(u.refname.clone(), ts),
        };
        writer.add_ref(record)?;
    }

    for u in &sorted {
        writer.add_log(LogRecord {
            ref_name: u.refname.clone(),
            update_index: ts,
            old_hash: u.old_oid,
            new_hash: u.new_oid,
            committer: committer.clone(),
            message: u.message.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{NullObjectDb, StaticIdentity};

    fn backend(dir: &std::path::Path) -> ReftableBackend {
        ReftableBackend::create(
            dir,
            Box::new(StaticIdentity::new("Tester", "t@example.com")),
            Box::new(NullObjectDb),
        )
    }

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_hex(&format!("{:040x}", n)).unwrap()
    }

    #[test]
    fn atomic_multi_ref_update_lands_in_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let a = RefName::new("refs/heads/a").unwrap();
        let b = RefName::new("refs/heads/b").unwrap();

        let mut tx = Transaction::new();
        tx.add(a.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(1)), None).unwrap();
        tx.add(b.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(2)), None).unwrap();
        tx.initial_commit(&mut backend).unwrap();

        assert_eq!(backend.raw_read(&a).unwrap(), RawRead::Direct(oid(1)));
        assert_eq!(backend.raw_read(&b).unwrap(), RawRead::Direct(oid(2)));
    }

    #[test]
    fn stale_old_oid_is_a_lock_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let a = RefName::new("refs/heads/a").unwrap();

        let mut setup = Transaction::new();
        setup.add(a.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(1)), None).unwrap();
        setup.initial_commit(&mut backend).unwrap();

        let mut tx = Transaction::new();
        tx.add(
            a.clone(),
            UpdateFlags::HAVE_OLD | UpdateFlags::HAVE_NEW,
            Some(oid(99)),
            Some(oid(2)),
            None,
        )
        .unwrap();
        tx.prepare(&mut backend).unwrap();
        let err = tx.finish(&mut backend);
        assert!(matches!(err, Err(RefError::LockConflict { .. })));
        assert_eq!(backend.raw_read(&a).unwrap(), RawRead::Direct(oid(1)));
    }

    #[test]
    fn writing_through_a_symref_redirects_to_its_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let head = RefName::new("HEAD").unwrap();
        let main = RefName::new("refs/heads/main").unwrap();

        let mut setup = Transaction::new();
        setup
            .add_symref(head.clone(), UpdateFlags::HAVE_NEW, None, main.clone(), None)
            .unwrap();
        setup.initial_commit(&mut backend).unwrap();

        let mut tx = Transaction::new();
        tx.add(head.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(5)), None).unwrap();
        tx.initial_commit(&mut backend).unwrap();

        assert_eq!(backend.raw_read(&main).unwrap(), RawRead::Direct(oid(5)));
        assert_eq!(backend.raw_read(&head).unwrap(), RawRead::Symref(main));
    }

    #[test]
    fn aborting_a_prepared_transaction_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let a = RefName::new("refs/heads/a").unwrap();

        let mut tx = Transaction::new();
        tx.add(a.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(1)), None).unwrap();
        tx.prepare(&mut backend).unwrap();
        tx.abort();

        assert_eq!(backend.raw_read(&a).unwrap(), RawRead::NotFound);
    }
}
