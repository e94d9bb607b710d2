use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stored record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("parsing team payload {id}: {source}")]
    Parse {
        id: u64,
        #[source]
        source: serde_json::Error,
    },

    /// The repository load failed; every query on that instance returns this,
    /// wrapping the one original cause.
    #[error("initialization failed: {0}")]
    Initialization(#[source] Arc<Error>),

    #[error("load task stopped before completing")]
    LoadAborted,

    #[error("{0} not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    #[must_use]
    pub fn is_initialization(&self) -> bool {
        matches!(self, Error::Initialization(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
