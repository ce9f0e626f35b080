use crate::name::RefName;

/// Errors produced by the reftable backend.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("reference '{0}' not found")]
    NotFound(RefName),

    #[error("cannot lock ref '{refname}': {reason}")]
    LockConflict { refname: String, reason: String },

    #[error("reftable: transaction prepare: {0}")]
    TransactionPrepare(String),

    #[error("reftable: transaction failure: {0}")]
    TransactionFailure(String),

    #[error("reftable: pseudoref update failure: {0}")]
    PseudorefUpdate(String),

    #[error("reftable: pseudoref commit failure: {0}")]
    PseudorefCommit(String),

    #[error("BUG: {0}")]
    Misuse(&'static str),

    #[error("stack corrupt: {0}")]
    StackCorrupt(String),

    #[error(transparent)]
    Lock(#[from] reftable_utils::LockError),

    #[error(transparent)]
    Util(#[from] reftable_utils::UtilError),

    #[error(transparent)]
    Hash(#[from] reftable_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RefError {
    pub fn lock_conflict(refname: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LockConflict {
            refname: refname.into(),
            reason: reason.into(),
        }
    }
}
