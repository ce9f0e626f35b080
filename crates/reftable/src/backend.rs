//! The reftable-backed ref store: owns the on-disk stack plus the
//! collaborators (committer identity, object lookup, name classification)
//! every higher-level operation needs.

use std::fs;
use std::path::PathBuf;

use reftable_utils::date::Signature;

use crate::error::RefError;
use crate::ident::{CommitterIdentity, DefaultRefClassifier, ObjectDb, RefClassifier};
use crate::name::RefName;
use crate::record::RefPayload;
use crate::stack::{Stack, WriteOptions};

const MAX_SYMREF_DEPTH: usize = 5;

/// Result of a single unfollowed lookup against the merged stack view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRead {
    Direct(reftable_hash::ObjectId),
    Symref(RefName),
    NotFound,
}

/// Result of chasing a possible chain of symrefs to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Object { name: RefName, oid: reftable_hash::ObjectId },
    Missing(RefName),
}

pub struct ReftableBackend {
    repo_dir: PathBuf,
    reftable_dir: PathBuf,
    stack: Option<Stack>,
    init_err: Option<String>,
    committer: Box<dyn CommitterIdentity>,
    object_db: Box<dyn ObjectDb>,
    classifier: Box<dyn RefClassifier>,
}

impl ReftableBackend {
    /// Open (or prepare to lazily fail on) the reftable store under
    /// `repo_dir/reftable`. Never fails outright: an error opening the
    /// stack is remembered and surfaced by every subsequent operation
    /// instead of aborting construction.
    pub fn create(
        repo_dir: impl Into<PathBuf>,
        committer: Box<dyn CommitterIdentity>,
        object_db: Box<dyn ObjectDb>,
    ) -> Self {
        let repo_dir = repo_dir.into();
        let reftable_dir = repo_dir.join("reftable");
        let (stack, init_err) = match Stack::open(&reftable_dir, WriteOptions::default()) {
            Ok(stack) => (Some(stack), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            repo_dir,
            reftable_dir,
            stack,
            init_err,
            committer,
            object_db,
            classifier: Box::new(DefaultRefClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn RefClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn repo_dir(&self) -> &std::path::Path {
        &self.repo_dir
    }

    fn require_open(&self) -> Result<(), RefError> {
        match &self.init_err {
            Some(msg) => Err(RefError::StackCorrupt(format!(
                "reftable store failed to open: {msg}"
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn stack_ref(&self) -> Result<&Stack, RefError> {
        self.require_open()?;
        Ok(self.stack.as_ref().expect("stack present when init_err is None"))
    }

    pub(crate) fn stack_mut(&mut self) -> Result<&mut Stack, RefError> {
        self.require_open()?;
        Ok(self.stack.as_mut().expect("stack present when init_err is None"))
    }

    pub(crate) fn committer_identity(&self) -> Signature {
        self.committer.committer_info()
    }

    pub(crate) fn object_db(&self) -> &dyn ObjectDb {
        self.object_db.as_ref()
    }

    pub(crate) fn classifier(&self) -> &dyn RefClassifier {
        self.classifier.as_ref()
    }

    /// Lay down the on-disk markers a reftable-format repository needs:
    /// the `reftable/` directory, a `HEAD` pointing at a placeholder branch,
    /// and a `refs/heads` sentinel file warning loose-ref-only tools off.
    pub fn init_db(&self) -> Result<(), RefError> {
        self.require_open()?;
        fs::create_dir_all(&self.reftable_dir)?;
        fs::create_dir_all(self.repo_dir.join("refs"))?;

        let head = self.repo_dir.join("HEAD");
        if !head.exists() {
            fs::write(&head, b"ref: refs/heads/.invalid\n")?;
        }
        fs::write(
            self.repo_dir.join("refs").join("heads"),
            b"this repository uses the reftable format\n",
        )?;
        Ok(())
    }

    /// One unfollowed lookup against the merged stack view, reloading first
    /// so concurrent writers from other processes are visible.
    pub fn raw_read(&mut self, name: &RefName) -> Result<RawRead, RefError> {
        let stack = self.stack_mut()?;
        stack.reload()?;
        let record = stack.merged().read_ref(name);
        Ok(match record {
            None => RawRead::NotFound,
            Some(rec) => match rec.payload {
                RefPayload::Symbolic(target) => RawRead::Symref(target),
                RefPayload::Direct(oid) => RawRead::Direct(oid),
                RefPayload::Peeled { value, .. } => RawRead::Direct(value),
                RefPayload::Deleted => {
                    // The merged view always collapses a winning tombstone to
                    // "not found" before we get here.
                    RawRead::NotFound
                }
            },
        })
    }

    /// Follow a possible chain of symrefs to the object (or missing name) it
    /// ultimately names.
    pub(crate) fn resolve_ref_unsafe(&mut self, name: &RefName) -> Result<Resolved, RefError> {
        let mut current = name.clone();
        for _ in 0..MAX_SYMREF_DEPTH {
            match self.raw_read(&current)? {
                RawRead::NotFound => return Ok(Resolved::Missing(current)),
                RawRead::Direct(oid) => return Ok(Resolved::Object { name: current, oid }),
                RawRead::Symref(target) => current = target,
            }
        }
        Err(RefError::Misuse("symref chain exceeds the maximum depth"))
    }

    /// Collapse the whole stack into a single segment, physically dropping
    /// shadowed records and tombstones.
    pub fn pack_refs(&mut self) -> Result<(), RefError> {
        self.stack_mut()?.compact_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{NullObjectDb, StaticIdentity};
    use crate::transaction::{Transaction, UpdateFlags};
    use reftable_hash::ObjectId;

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
    fn init_db_writes_sentinel_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        backend.init_db().unwrap();
        assert!(dir.path().join("HEAD").exists());
        assert!(dir.path().join("refs").join("heads").is_file());
        assert!(dir.path().join("reftable").is_dir());
    }

    #[test]
    fn raw_read_missing_ref_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let name = RefName::new("refs/heads/main").unwrap();
        assert_eq!(backend.raw_read(&name).unwrap(), RawRead::NotFound);
    }

    #[test]
    fn raw_read_sees_committed_direct_ref() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(dir.path());
        let name = RefName::new("refs/heads/main").unwrap();

        let mut tx = Transaction::new();
        tx.add(name.clone(), UpdateFlags::HAVE_NEW, None, Some(oid(1)), None)
            .unwrap();
        tx.initial_commit(&mut backend).unwrap();

        assert_eq!(backend.raw_read(&name).unwrap(), RawRead::Direct(oid(1)));
    }
}
