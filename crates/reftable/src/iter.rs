//! Read-only traversal over the merged stack view: a prefix-bounded ref
//! iterator that resolves symrefs and filters out broken ones, and a
//! reflog-ref iterator that walks whichever refs have history at all.

use reftable_hash::ObjectId;

use crate::backend::{ReftableBackend, Resolved};
use crate::error::RefError;
use crate::ident::RefScope;
use crate::name::RefName;
use crate::record::{LogRecord, RefRecord};

/// One resolved ref, as yielded by `RefIterator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    pub name: RefName,
    pub oid: ObjectId,
    pub symref_target: Option<RefName>,
    peeled: Option<ObjectId>,
}

impl RefEntry {
    /// The peeled commit a tag entry points at, if the backing object
    /// database could resolve one.
    pub fn peel(&self) -> Option<ObjectId> {
        self.peeled
    }
}

/// Iterates refs under an optional name prefix, in sorted order. Per-
/// worktree sentinels and pseudorefs are excluded; symrefs are resolved to
/// the object they ultimately point at, and entries whose resolved object
/// isn't known to the backing object database are silently skipped.
pub struct RefIterator<'a> {
    backend: &'a mut ReftableBackend,
    records: std::vec::IntoIter<RefRecord>,
}

pub fn iter_refs<'a>(backend: &'a mut ReftableBackend, prefix: Option<&str>) -> Result<RefIterator<'a>, RefError> {
    let stack = backend.stack_mut()?;
    stack.reload()?;
    let mut records = stack.merged().all_refs();
    if let Some(prefix) = prefix {
        records.retain(|r| r.name.as_str().starts_with(prefix));
    }
    Ok(RefIterator {
        backend,
        records: records.into_iter(),
    })
}

impl<'a> Iterator for RefIterator<'a> {
    type Item = Result<RefEntry, RefError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = self.records.next()?;
            if self.backend.classifier().classify(&record.name) != RefScope::Normal {
                continue;
            }

            let symref_target = record.payload.symref_target().cloned();
            let resolved = match self.backend.resolve_ref_unsafe(&record.name) {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            let oid = match resolved {
                Resolved::Object { oid, .. } => oid,
                // Dangling symref target: nothing to yield for this name.
                Resolved::Missing(_) => continue,
            };
            if !self.backend.object_db().resolves_to_object(&oid) {
                continue;
            }
            let peeled = self.backend.object_db().peel(&oid);
            return Some(Ok(RefEntry {
                name: record.name,
                oid,
                symref_target,
                peeled,
            }));
        }
    }
}

/// Iterates `(name, latest value)` for every ref that has at least one
/// reflog entry, newest entry per name first, deduplicated so each name
/// appears once. There is deliberately no way to peel an entry here: a
/// reflog records a value a ref once held, not a live ref, so "peel the
/// object this name currently resolves to" doesn't apply to it.
pub struct ReflogRefIterator {
    logs: std::vec::IntoIter<LogRecord>,
    last_name: Option<RefName>,
}

pub fn iter_reflog_refs(backend: &mut ReftableBackend) -> Result<ReflogRefIterator, RefError> {
    let stack = backend.stack_mut()?;
    stack.reload()?;
    let logs = stack.merged().all_logs();
    Ok(ReflogRefIterator {
        logs: logs.into_iter(),
        last_name: None,
    })
}

impl Iterator for ReflogRefIterator {
    type Item = (RefName, ObjectId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.logs.next()?;
            if self.last_name.as_ref() == Some(&entry.ref_name) {
                continue;
            }
            self.last_name = Some(entry.ref_name.clone());
            if let Some(new_hash) = entry.new_hash {
                return Some((entry.ref_name, new_hash));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{NullObjectDb, StaticIdentity};
    use crate::transaction::{Transaction, UpdateFlags};

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
    fn iter_refs_skips_pseudorefs_and_sorts_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let mut tx = Transaction::new();
        tx.add(RefName::new("HEAD").unwrap(), UpdateFlags::HAVE_NEW, None, Some(oid(9)), None)
            .unwrap();
        tx.add(
            RefName::new("refs/heads/b").unwrap(),
            UpdateFlags::HAVE_NEW,
            None,
            Some(oid(2)),
            None,
        )
        .unwrap();
        tx.add(
            RefName::new("refs/heads/a").unwrap(),
            UpdateFlags::HAVE_NEW,
            None,
            Some(oid(1)),
            None,
        )
        .unwrap();
        tx.initial_commit(&mut backend).unwrap();

        let names: Vec<String> = iter_refs(&mut backend, None)
            .unwrap()
            .map(|e| e.unwrap().name.to_string())
            .collect();
        assert_eq!(names, vec!["refs/heads/a", "refs/heads/b"]);
    }

    #[test]
    fn iter_refs_resolves_symref_to_target_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let main = RefName::new("refs/heads/main").unwrap();

        let mut setup = Transaction::new();
        setup.add(main.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(7)), None).unwrap();
        setup
            .add_symref(
                RefName::new("refs/heads/alias").unwrap(),
                UpdateFlags::HAVE_NEW,
                None,
                main,
                None,
            )
            .unwrap();
        setup.initial_commit(&mut backend).unwrap();

        let resolved: Vec<(String, ObjectId)> = iter_refs(&mut backend, Some("refs/heads/a"))
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.name.to_string(), e.oid)
            })
            .collect();
        assert_eq!(resolved, vec![("refs/heads/alias".to_string(), oid(7))]);
    }

    #[test]
    fn reflog_ref_iterator_dedups_to_latest_value_per_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let a = RefName::new("refs/heads/a").unwrap();

        for n in 1..=2u8 {
            let mut tx = Transaction::new();
            tx.add(a.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(n)), None).unwrap();
            tx.initial_commit(&mut backend).unwrap();
        }

        let entries: Vec<(RefName, ObjectId)> = iter_reflog_refs(&mut backend).unwrap().collect();
        assert_eq!(entries, vec![(a, oid(2))]);
    }
}
