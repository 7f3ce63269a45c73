// src/error.rs

//! Fatal error conditions for the merge pipeline.
//!
//! Everything here aborts the run. Conditions that only skip work (a source
//! directory without a commit dump, an object-store read failure during the
//! thin-manifest rewrite) are logged as warnings instead and never reach this
//! type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed commit stream at line {line}: {reason}")]
    Protocol { line: usize, reason: String },

    #[error("malformed blob index at line {line}: {reason}")]
    BlobIndex { line: usize, reason: String },

    #[error("line {line}: mark :{mark} is not in the blob index")]
    UnknownMark { line: usize, mark: u64 },

    #[error("unparsable portage line ({reason}): {content:?}")]
    PortageLine { reason: String, content: String },

    #[error("invalid manifest sign key {token:?} in {content:?}")]
    SignKey { token: String, content: String },

    #[error("refusing to merge commits at {timestamp} by {author}: both touch {paths:?}")]
    OverlappingFiles {
        timestamp: i64,
        author: String,
        paths: Vec<String>,
    },

    #[error("source directory {dir:?}")]
    InSource {
        dir: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("object store returned an unexpected result: {reason}")]
    ObjectStore { reason: String },

    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Stream(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("invalid user registry: {0}")]
    Registry(#[from] serde_json::Error),

    #[error("invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn protocol(line: usize, reason: impl Into<String>) -> Self {
        Error::Protocol {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
