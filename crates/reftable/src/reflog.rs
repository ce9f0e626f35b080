//! Reflog enumeration and expiry. Expiry writes tombstones rather than
//! touching existing segments; the space is only reclaimed when the stack
//! is next compacted.

use crate::backend::ReftableBackend;
use crate::error::RefError;
use crate::name::RefName;
use crate::record::LogRecord;

/// Visit a ref's log entries from newest to oldest.
pub fn for_each_reflog_ent_newest_first(
    backend: &mut ReftableBackend,
    name: &RefName,
    mut f: impl FnMut(&LogRecord) -> Result<(), RefError>,
) -> Result<(), RefError> {
    let stack = backend.stack_mut()?;
    stack.reload()?;
    for entry in stack.merged().logs_for(name) {
        f(&entry)?;
    }
    Ok(())
}

/// Visit a ref's log entries from oldest to newest. Has to buffer the
/// whole log first since the merged view is only sorted newest-first.
pub fn for_each_reflog_ent_oldest_first(
    backend: &mut ReftableBackend,
    name: &RefName,
    mut f: impl FnMut(&LogRecord) -> Result<(), RefError>,
) -> Result<(), RefError> {
    let stack = backend.stack_mut()?;
    stack.reload()?;
    let mut entries = stack.merged().logs_for(name);
    entries.reverse();
    for entry in &entries {
        f(entry)?;
    }
    Ok(())
}

/// Tombstone every entry of `name`'s log that `should_prune` accepts. Each
/// tombstone carries the *original* entry's update-index rather than the
/// fresh ts of the segment it's written into, so a later newest-first scan
/// still drops the right entry instead of the one that happens to occupy
/// that ts in the new segment. Space is reclaimed only by compaction.
pub fn reflog_expire(
    backend: &mut ReftableBackend,
    name: &RefName,
    should_prune: impl Fn(&LogRecord) -> bool,
) -> Result<(), RefError> {
    let committer = backend.committer_identity();
    let stack = backend.stack_mut()?;
    stack.reload()?;
    let doomed: Vec<u64> = stack
        .merged()
        .logs_for(name)
        .into_iter()
        .filter(|entry| should_prune(entry))
        .map(|entry| entry.update_index)
        .collect();
    if doomed.is_empty() {
        return Ok(());
    }

    let mut addition = stack.new_addition()?;
    addition.add(|w| {
        for update_index in &doomed {
            w.add_log(LogRecord::tombstone(name.clone(), *update_index, committer.clone()));
        }
        Ok(())
    })?;
    stack.commit_addition(addition)
}
