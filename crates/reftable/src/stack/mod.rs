//! The append-only stack of immutable segments a backend is built on:
//! reload to observe what other processes committed, open an addition to
//! stage one new segment, commit it atomically (or let it drop to abort).

mod merged;
mod segment;

pub use merged::MergedView;
pub use segment::Segment;

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use reftable_hash::HashAlgorithm;
use reftable_utils::lockfile::LockFile;

use crate::error::RefError;
use crate::record::{LogRecord, RefRecord};

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub block_size: u32,
    pub hash_id: u32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            block_size: 4096,
            hash_id: HashAlgorithm::Sha1.format_id(),
        }
    }
}

const TABLES_LIST: &str = "tables.list";

pub struct Stack {
    dir: PathBuf,
    segments: Vec<Segment>,
    table_names: Vec<String>,
    seq: u64,
    #[allow(dead_code)]
    opts: WriteOptions,
}

impl Stack {
    pub fn open(dir: impl Into<PathBuf>, opts: WriteOptions) -> Result<Self, RefError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut stack = Self {
            dir,
            segments: Vec::new(),
            table_names: Vec::new(),
            seq: 0,
            opts,
        };
        stack.reload()?;
        Ok(stack)
    }

    fn list_path(&self) -> PathBuf {
        self.dir.join(TABLES_LIST)
    }

    /// Re-read `tables.list` from disk, picking up segments another process
    /// may have committed since we last looked.
    pub fn reload(&mut self) -> Result<(), RefError> {
        let list_path = self.list_path();
        if !list_path.exists() {
            self.segments.clear();
            self.table_names.clear();
            return Ok(());
        }
        let text = fs::read_to_string(&list_path)?;
        let mut segments = Vec::new();
        let mut table_names = Vec::new();
        let mut max_seq = self.seq;
        for line in text.lines().filter(|l| !l.is_empty()) {
            let name = line.trim().to_string();
            segments.push(Segment::read_from(&self.dir.join(&name))?);
            if let Some(seq) = name.rsplit('-').next().and_then(|s| s.parse::<u64>().ok()) {
                max_seq = max_seq.max(seq);
            }
            table_names.push(name);
        }
        self.segments = segments;
        self.table_names = table_names;
        self.seq = max_seq;
        Ok(())
    }

    pub fn next_update_index(&self) -> u64 {
        self.segments.last().map(|s| s.max_index + 1).unwrap_or(1)
    }

    pub fn merged(&self) -> MergedView<'_> {
        MergedView::new(&self.segments)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Reload and reserve the next update-index for a pending append.
    pub fn new_addition(&mut self) -> Result<Addition, RefError> {
        self.reload()?;
        Ok(Addition {
            ts: self.next_update_index(),
            baseline_len: self.table_names.len(),
            writer: None,
        })
    }

    /// Publish a staged addition. A no-op if the writer callback never ran
    /// or produced an empty table (an empty transaction commits nothing).
    pub fn commit_addition(&mut self, addition: Addition) -> Result<(), RefError> {
        let Some(writer) = addition.writer else {
            return Ok(());
        };
        if writer.refs.is_empty() && writer.logs.is_empty() {
            return Ok(());
        }

        let mut lock = LockFile::acquire(self.list_path())?;
        self.reload()?;
        if self.table_names.len() != addition.baseline_len {
            return Err(RefError::lock_conflict(
                "<stack>",
                "a concurrent writer committed a segment first",
            ));
        }

        let seg = Segment {
            min_index: writer.min,
            max_index: writer.max,
            refs: writer.refs,
            logs: writer.logs,
        };
        self.seq += 1;
        let filename = format!("{:020}-{:020}-{:08}", seg.min_index, seg.max_index, self.seq);
        seg.write_to(&self.dir.join(&filename))?;

        for name in &self.table_names {
            lock.write_all(name.as_bytes())?;
            lock.write_all(b"\n")?;
        }
        lock.write_all(filename.as_bytes())?;
        lock.write_all(b"\n")?;
        lock.commit()?;

        self.table_names.push(filename);
        self.segments.push(seg);
        Ok(())
    }

    /// Merge every segment into one, physically discarding shadowed
    /// records and tombstones. No-op on a stack with at most one segment.
    pub fn compact_all(&mut self) -> Result<(), RefError> {
        self.reload()?;
        if self.segments.len() <= 1 {
            return Ok(());
        }

        let (refs, logs, ts) = {
            let merged = self.merged();
            let ts = self.segments.last().map(|s| s.max_index).unwrap_or(1);
            (merged.all_refs(), merged.all_logs(), ts)
        };
        let seg = Segment {
            min_index: 1,
            max_index: ts,
            refs,
            logs,
        };

        let mut lock = LockFile::acquire(self.list_path())?;
        for name in &self.table_names {
            let _ = fs::remove_file(self.dir.join(name));
        }
        self.seq += 1;
        let filename = format!("{:020}-{:020}-{:08}", seg.min_index, seg.max_index, self.seq);
        seg.write_to(&self.dir.join(&filename))?;
        lock.write_all(filename.as_bytes())?;
        lock.write_all(b"\n")?;
        lock.commit()?;

        self.table_names = vec![filename];
        self.segments = vec![seg];
        Ok(())
    }
}

/// A single record batch staged for commit, built by one writer callback.
pub struct Writer {
    ts: u64,
    min: u64,
    max: u64,
    refs: Vec<RefRecord>,
    logs: Vec<LogRecord>,
    last_ref_name: Option<crate::name::RefName>,
}

impl Writer {
    fn new(ts: u64) -> Self {
        Self {
            ts,
            min: ts,
            max: ts,
            refs: Vec::new(),
            logs: Vec::new(),
            last_ref_name: None,
        }
    }

    pub fn next_update_index(&self) -> u64 {
        self.ts
    }

    pub fn set_limits(&mut self, min: u64, max: u64) {
        self.min = min;
        self.max = max;
    }

    /// Ref records must be added in strictly ascending name order within
    /// one segment; this is the enforcement point for that invariant.
    pub fn add_ref(&mut self, rec: RefRecord) -> Result<(), RefError> {
        if let Some(last) = &self.last_ref_name {
            if rec.name.as_bstr() <= last.as_bstr() {
                return Err(RefError::Misuse(
                    "ref records must be written in strictly ascending name order",
                ));
            }
        }
        self.last_ref_name = Some(rec.name.clone());
        self.refs.push(rec);
        Ok(())
    }

    pub fn add_refs(&mut self, recs: impl IntoIterator<Item = RefRecord>) -> Result<(), RefError> {
        for r in recs {
            self.add_ref(r)?;
        }
        Ok(())
    }

    /// Log records carry their own update-index (expiry tombstones reuse an
    /// older one), so no ordering invariant is enforced here.
    pub fn add_log(&mut self, rec: LogRecord) {
        self.logs.push(rec);
    }

    pub fn add_logs(&mut self, recs: impl IntoIterator<Item = LogRecord>) {
        for r in recs {
            self.add_log(r);
        }
    }
}

/// A pending append. Created by `Stack::new_addition`, destroyed by
/// `Stack::commit_addition` or simply dropped to abort.
pub struct Addition {
    ts: u64,
    baseline_len: usize,
    writer: Option<Writer>,
}

impl Addition {
    pub fn next_update_index(&self) -> u64 {
        self.ts
    }

    pub fn add(&mut self, f: impl FnOnce(&mut Writer) -> Result<(), RefError>) -> Result<(), RefError> {
        let mut writer = Writer::new(self.ts);
        f(&mut writer)?;
        self.writer = Some(writer);
        Ok(())
    }

    /// Explicit, named discard — equivalent to dropping the addition.
    pub fn abort(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::RefName;
    use reftable_hash::ObjectId;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_hex(&format!("{:040x}", n)).unwrap()
    }

    #[test]
    fn empty_stack_next_index_is_one() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Stack::open(dir.path(), WriteOptions::default()).unwrap();
        assert_eq!(stack.next_update_index(), 1);
    }

    #[test]
    fn commit_addition_persists_and_advances_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Stack::open(dir.path(), WriteOptions::default()).unwrap();
        let mut addition = stack.new_addition().unwrap();
        let name = RefName::new("refs/heads/a").unwrap();
        addition
            .add(|w| w.add_ref(RefRecord::direct(name.clone(), w.next_update_index(), oid(1))))
            .unwrap();
        stack.commit_addition(addition).unwrap();

        assert_eq!(stack.next_update_index(), 2);
        assert_eq!(
            stack.merged().read_ref(&name).unwrap().payload.direct_hash(),
            Some(oid(1))
        );

        let mut reopened = Stack::open(dir.path(), WriteOptions::default()).unwrap();
        reopened.reload().unwrap();
        assert_eq!(reopened.next_update_index(), 2);
    }

    #[test]
    fn empty_addition_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Stack::open(dir.path(), WriteOptions::default()).unwrap();
        let mut addition = stack.new_addition().unwrap();
        addition.add(|_w| Ok(())).unwrap();
        stack.commit_addition(addition).unwrap();
        assert_eq!(stack.next_update_index(), 1);
        assert!(stack.is_empty());
    }

    #[test]
    fn dropping_an_addition_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Stack::open(dir.path(), WriteOptions::default()).unwrap();
        let mut addition = stack.new_addition().unwrap();
        let name = RefName::new("refs/heads/a").unwrap();
        addition
            .add(|w| w.add_ref(RefRecord::direct(name.clone(), w.next_update_index(), oid(1))))
            .unwrap();
        addition.abort();
        assert_eq!(stack.next_update_index(), 1);
        assert!(stack.merged().read_ref(&name).is_none());
    }

    #[test]
    fn out_of_order_ref_add_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Stack::open(dir.path(), WriteOptions::default()).unwrap();
        let mut addition = stack.new_addition().unwrap();
        let result = addition.add(|w| {
            w.add_ref(RefRecord::direct(RefName::new("refs/heads/b").unwrap(), w.next_update_index(), oid(1)))?;
            w.add_ref(RefRecord::direct(RefName::new("refs/heads/a").unwrap(), w.next_update_index(), oid(2)))
        });
        assert!(result.is_err());
    }

    #[test]
    fn concurrent_addition_without_reload_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Stack::open(dir.path(), WriteOptions::default()).unwrap();

        let mut first = stack.new_addition().unwrap();
        first
            .add(|w| {
                w.add_ref(RefRecord::direct(
                    RefName::new("refs/heads/a").unwrap(),
                    w.next_update_index(),
                    oid(1),
                ))
            })
            .unwrap();

        let mut second = stack.new_addition().unwrap();
        second
            .add(|w| {
                w.add_ref(RefRecord::direct(
                    RefName::new("refs/heads/b").unwrap(),
                    w.next_update_index(),
                    oid(2),
                ))
            })
            .unwrap();

        stack.commit_addition(first).unwrap();
        let err = stack.commit_addition(second);
        assert!(matches!(err, Err(RefError::LockConflict { .. })));
    }

    #[test]
    fn compact_all_merges_and_drops_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Stack::open(dir.path(), WriteOptions::default()).unwrap();
        let a = RefName::new("refs/heads/a").unwrap();
        let b = RefName::new("refs/heads/b").unwrap();

        let mut add1 = stack.new_addition().unwrap();
        add1.add(|w| w.add_ref(RefRecord::direct(a.clone(), w.next_update_index(), oid(1))))
            .unwrap();
        stack.commit_addition(add1).unwrap();

        let mut add2 = stack.new_addition().unwrap();
        add2.add(|w| {
            w.add_ref(RefRecord::direct(b.clone(), w.next_update_index(), oid(2)))?;
            Ok(())
        })
        .unwrap();
        stack.commit_addition(add2).unwrap();

        let mut add3 = stack.new_addition().unwrap();
        add3.add(|w| w.add_ref(RefRecord::tombstone(a.clone(), w.next_update_index())))
            .unwrap();
        stack.commit_addition(add3).unwrap();

        stack.compact_all().unwrap();
        assert!(stack.merged().read_ref(&a).is_none());
        assert_eq!(
            stack.merged().read_ref(&b).unwrap().payload.direct_hash(),
            Some(oid(2))
        );
        assert_eq!(stack.segments.len(), 1);
    }
}
