use thiserror::Error;
use trackdb_dispatch::{DispatchError, MailboxError};

use crate::dao::crates::CrateId;

pub type LibraryResult<T> = Result<T, LibraryError>;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error("crate name must not be empty")]
    EmptyCrateName,

    #[error("a crate named '{0}' already exists")]
    CrateExists(String),

    #[error("crate {0} does not exist")]
    NoSuchCrate(CrateId),

    #[error("crate {0} is locked")]
    CrateLocked(CrateId),
}
