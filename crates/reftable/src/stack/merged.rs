//! Logical read-only view folding a stack's segments into one sorted
//! stream, using segment recency as the tie-break for shadowing.

use std::collections::HashMap;

use crate::name::RefName;
use crate::record::{LogRecord, RefPayload, RefRecord};
use crate::stack::segment::Segment;

pub struct MergedView<'a> {
    segments: &'a [Segment],
}

impl<'a> MergedView<'a> {
    pub fn new(segments: &'a [Segment]) -> Self {
        Self { segments }
    }

    /// Point lookup. A name whose winning record is a tombstone is reported
    /// as not found — from the outside, a deleted ref simply doesn't exist.
    pub fn read_ref(&self, name: &RefName) -> Option<RefRecord> {
        for seg in self.segments.iter().rev() {
            if let Some(r) = seg.find_ref(name) {
                return if r.payload.is_deleted() {
                    None
                } else {
                    Some(r.clone())
                };
            }
        }
        None
    }

    /// All live (non-tombstoned) ref records across the whole stack,
    /// sorted by name. Later segments win ties because they're folded in
    /// after earlier ones.
    pub fn all_refs(&self) -> Vec<RefRecord> {
        let mut by_name: HashMap<RefName, RefRecord> = HashMap::new();
        for seg in self.segments {
            for r in &seg.refs {
                by_name.insert(r.name.clone(), r.clone());
            }
        }
        let mut out: Vec<RefRecord> = by_name
            .into_values()
            .filter(|r| !r.payload.is_deleted())
            .collect();
        out.sort_by(|a, b| a.name.as_bstr().cmp(b.name.as_bstr()));
        out
    }

    /// All live log records, sorted by ref-name ascending then
    /// update-index descending — the order reflog enumeration and the
    /// reflog-ref iterator both rely on.
    pub fn all_logs(&self) -> Vec<LogRecord> {
        let mut by_key: HashMap<(RefName, u64), LogRecord> = HashMap::new();
        for seg in self.segments {
            for l in &seg.logs {
                by_key.insert((l.ref_name.clone(), l.update_index), l.clone());
            }
        }
        let mut out: Vec<LogRecord> = by_key
            .into_values()
            .filter(|l| !l.is_tombstone())
            .collect();
        out.sort_by(|a, b| {
            a.ref_name
                .as_bstr()
                .cmp(b.ref_name.as_bstr())
                .then(b.update_index.cmp(&a.update_index))
        });
        out
    }

    /// Live log records for one ref name, newest update-index first.
    pub fn logs_for(&self, name: &RefName) -> Vec<LogRecord> {
        self.all_logs()
            .into_iter()
            .filter(|l| &l.ref_name == name)
            .collect()
    }
}
