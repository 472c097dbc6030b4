use std::time::Duration;

use thiserror::Error;

use crate::keyset::metadata::{DigestAlg, KeyKind, KeyPurpose};

/// A single object upload that failed while staging.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{object}: {reason}")]
pub struct UploadFailure {
    /// Object name relative to the key set path.
    pub object: String,
    /// Provider-reported reason.
    pub reason: String,
}

/// A single copy operation that did not reach success during commit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{object}: {reason}")]
pub struct CopyFailure {
    /// Object name relative to the key set path.
    pub object: String,
    /// Provider-reported reason.
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Credential cannot open the wrapped session key")]
    KeyMismatch,

    #[error("Authenticated decryption failed")]
    IntegrityFailure,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Key set has no primary version")]
    NoPrimaryKey,

    #[error("Invalid key state: {0}")]
    InvalidKeyState(String),

    #[error("Staging failed for {} object(s): {}", .0.len(), join_failures(.0))]
    StagingFailed(Vec<UploadFailure>),

    #[error("Commit failed for {} object(s): {}", .0.len(), join_failures(.0))]
    CommitFailed(Vec<CopyFailure>),

    #[error("Commit did not complete within {0:?}")]
    CommitTimeout(Duration),

    #[error("Writer has already finished")]
    WriterFinished,

    #[error("No algorithm for kind {kind:?}, purpose {purpose:?}, digest {digest:?}")]
    UnsupportedAlgorithm {
        kind: KeyKind,
        purpose: KeyPurpose,
        digest: DigestAlg,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_failures(failures: &[impl ToString]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, StrataError>;
