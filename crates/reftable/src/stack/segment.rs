//! A single immutable table within a stack: one update-index (or, for
//! expiry tombstones, one commit point covering several historical
//! update-indices), a sorted run of ref records and a sorted run of log
//! records.
//!
//! Segments are written once and never mutated; a stack is just an ordered
//! list of these files plus a `tables.list` naming them in commit order.

use std::fs;
use std::path::Path;

use reftable_hash::ObjectId;
use reftable_utils::date::{GitDate, Signature};
use reftable_utils::{BString, ByteSlice};

use crate::error::RefError;
use crate::name::RefName;
use crate::record::{LogRecord, RefPayload, RefRecord};

const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, Clone)]
pub struct Segment {
    pub min_index: u64,
    pub max_index: u64,
    pub refs: Vec<RefRecord>,
    pub logs: Vec<LogRecord>,
}

impl Segment {
    pub fn empty(ts: u64) -> Self {
        Self {
            min_index: ts,
            max_index: ts,
            refs: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Binary search by name; segments keep `refs` sorted as an invariant
    /// enforced at write time by `Writer::add_ref`.
    pub fn find_ref(&self, name: &RefName) -> Option<&RefRecord> {
        self.refs
            .binary_search_by(|r| r.name.as_bstr().cmp(name.as_bstr()))
            .ok()
            .map(|i| &self.refs[i])
    }

    pub fn write_to(&self, path: &Path) -> Result<(), RefError> {
        let mut out = String::new();
        out.push_str(&format!("TS {} {}\n", self.min_index, self.max_index));
        out.push_str(&format!("REFS {}\n", self.refs.len()));
        for r in &self.refs {
            out.push_str(&encode_ref(r));
            out.push('\n');
        }
        out.push_str(&format!("LOGS {}\n", self.logs.len()));
        for l in &self.logs {
            out.push_str(&encode_log(l));
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, RefError> {
        let text = fs::read_to_string(path)?;
        let mut lines = text.lines();

        let header = lines
            .next()
            .ok_or_else(|| RefError::StackCorrupt(format!("{}: empty segment", path.display())))?;
        let mut parts = header.split(' ');
        if parts.next() != Some("TS") {
            return Err(RefError::StackCorrupt(format!(
                "{}: missing TS header",
                path.display()
            )));
        }
        let min_index = parse_u64(parts.next(), path)?;
        let max_index = parse_u64(parts.next(), path)?;

        let refs_header = lines
            .next()
            .ok_or_else(|| RefError::StackCorrupt(format!("{}: missing REFS header", path.display())))?;
        let ref_count: usize = refs_header
            .strip_prefix("REFS ")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| RefError::StackCorrupt(format!("{}: bad REFS header", path.display())))?;
        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let line = lines
                .next()
                .ok_or_else(|| RefError::StackCorrupt(format!("{}: truncated ref section", path.display())))?;
            refs.push(decode_ref(line, path)?);
        }

        let logs_header = lines
            .next()
            .ok_or_else(|| RefError::StackCorrupt(format!("{}: missing LOGS header", path.display())))?;
        let log_count: usize = logs_header
            .strip_prefix("LOGS ")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| RefError::StackCorrupt(format!("{}: bad LOGS header", path.display())))?;
        let mut logs = Vec::with_capacity(log_count);
        for _ in 0..log_count {
            let line = lines
                .next()
                .ok_or_else(|| RefError::StackCorrupt(format!("{}: truncated log section", path.display())))?;
            logs.push(decode_log(line, path)?);
        }

        Ok(Self {
            min_index,
            max_index,
            refs,
            logs,
        })
    }
}

fn parse_u64(field: Option<&str>, path: &Path) -> Result<u64, RefError> {
    field
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RefError::StackCorrupt(format!("{}: malformed update-index", path.display())))
}

fn encode_ref(r: &RefRecord) -> String {
    let name = r.name.as_str();
    match &r.payload {
        RefPayload::Direct(oid) => format!("{} {} D {}", name, r.update_index, oid.to_hex()),
        RefPayload::Peeled { value, peeled } => format!(
            "{} {} P {} {}",
            name,
            r.update_index,
            value.to_hex(),
            peeled.to_hex()
        ),
        RefPayload::Symbolic(target) => format!("{} {} S {}", name, r.update_index, target.as_str()),
        RefPayload::Deleted => format!("{} {} X", name, r.update_index),
    }
}

fn decode_ref(line: &str, path: &Path) -> Result<RefRecord, RefError> {
    let mut parts = line.splitn(4, ' ');
    let name = parts
        .next()
        .ok_or_else(|| RefError::StackCorrupt(format!("{}: malformed ref record", path.display())))?;
    let name = RefName::new_unchecked(name);
    let update_index = parse_u64(parts.next(), path)?;
    let kind = parts
        .next()
        .ok_or_else(|| RefError::StackCorrupt(format!("{}: malformed ref record", path.display())))?;
    let rest = parts.next().unwrap_or("");
    let payload = match kind {
        "D" => RefPayload::Direct(ObjectId::from_hex(rest.trim())?),
        "P" => {
            let mut hp = rest.splitn(2, ' ');
            let value = ObjectId::from_hex(hp.next().unwrap_or(""))?;
            let peeled = ObjectId::from_hex(hp.next().unwrap_or(""))?;
            RefPayload::Peeled { value, peeled }
        }
        "S" => RefPayload::Symbolic(RefName::new_unchecked(rest.trim())),
        "X" => RefPayload::Deleted,
        other => {
            return Err(RefError::StackCorrupt(format!(
                "{}: unknown ref payload kind '{}'",
                path.display(),
                other
            )))
        }
    };
    Ok(RefRecord {
        name,
        update_index,
        payload,
    })
}

fn encode_log(l: &LogRecord) -> String {
    let old = l.old_hash.map(|o| o.to_hex()).unwrap_or_else(|| "-".into());
    let new = l.new_hash.map(|o| o.to_hex()).unwrap_or_else(|| "-".into());
    let msg = l
        .message
        .as_ref()
        .map(|m| m.to_str_lossy().replace('\n', " "))
        .unwrap_or_else(|| "-".into());
    format!(
        "{} {} {} {} {}{sep}{}{sep}{}{sep}{}{sep}{}",
        l.ref_name.as_str(),
        l.update_index,
        old,
        new,
        l.committer.name.to_str_lossy(),
        l.committer.email.to_str_lossy(),
        l.committer.date.timestamp,
        l.committer.date.tz_offset,
        msg,
        sep = FIELD_SEP
    )
}

fn decode_log(line: &str, path: &Path) -> Result<LogRecord, RefError> {
    let mut parts = line.splitn(5, ' ');
    let bad = || RefError::StackCorrupt(format!("{}: malformed log record", path.display()));
    let ref_name = RefName::new_unchecked(parts.next().ok_or_else(bad)?);
    let update_index = parse_u64(parts.next(), path)?;
    let old = parts.next().ok_or_else(bad)?;
    let new = parts.next().ok_or_else(bad)?;
    let old_hash = (old != "-").then(|| ObjectId::from_hex(old)).transpose()?;
    let new_hash = (new != "-").then(|| ObjectId::from_hex(new)).transpose()?;

    let rest = parts.next().ok_or_else(bad)?;
    let mut fields = rest.split(FIELD_SEP);
    let name = fields.next().ok_or_else(bad)?;
    let email = fields.next().ok_or_else(bad)?;
    let timestamp: i64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let tz_offset: i32 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let message = fields.next().unwrap_or("-");

    Ok(LogRecord {
        ref_name,
        update_index,
        old_hash,
        new_hash,
        committer: Signature {
            name: BString::from(name),
            email: BString::from(email),
            date: GitDate::new(timestamp, tz_offset),
        },
        message: (message != "-").then(|| BString::from(message)),
    })
}
