//! Transactional reference storage backed by a stack of immutable, sorted
//! tables: every write appends a new table instead of mutating one in
//! place, readers always see a consistent merged view, and history is
//! folded away only by an explicit compaction.

pub mod backend;
pub mod error;
pub mod ident;
pub mod iter;
pub mod mutations;
pub mod name;
pub mod record;
pub mod reflog;
mod stack;
pub mod transaction;

pub use backend::{RawRead, ReftableBackend, Resolved};
pub use error::RefError;
pub use ident::{CommitterIdentity, DefaultRefClassifier, NullObjectDb, ObjectDb, RefClassifier, RefScope, StaticIdentity};
pub use iter::{iter_refs, iter_reflog_refs, RefEntry, RefIterator, ReflogRefIterator};
pub use mutations::{create_symref, delete_pseudoref, delete_refs, rename_ref, write_pseudoref, Precondition};
pub use reflog::{for_each_reflog_ent_newest_first, for_each_reflog_ent_oldest_first, reflog_expire};
pub use name::RefName;
pub use record::{LogRecord, RefPayload, RefRecord};
pub use stack::WriteOptions;
pub use transaction::{RefKind, RefUpdate, Transaction, UpdateFlags};

pub type Result<T> = std::result::Result<T, RefError>;
