/// Remote object store abstraction for key set publication.
///
/// The publish protocol depends on six operations: container creation,
/// upload, download, prefix listing, copy with pollable completion, and
/// delete. Backends only ever see key material that the layer stack above
/// them has already transformed.
pub mod memory;
pub mod remote;
pub mod s3;
pub mod staged;

use async_trait::async_trait;

use crate::error::Result;

/// Terminal or pending state of a copy operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    Pending,
    Success,
    Failed(String),
}

/// Minimal object store surface consumed by the publish protocol.
///
/// Single-object operations are assumed network-reliable; cross-object copy
/// is only eventually complete, which is why `copy_status` exists.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the destination container if it does not exist.
    async fn ensure_container(&self) -> Result<()>;

    /// Upload an object from bytes, replacing any existing object.
    async fn put(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Download an object; `NotFound` when absent.
    async fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Names of every object under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Start copying `src` to `dst`. Completion is observed via
    /// `copy_status`; the destination transitions atomically at the store's
    /// copy-completion instant.
    async fn begin_copy(&self, src: &str, dst: &str) -> Result<()>;

    /// Progress of the copy targeting `dst`.
    async fn copy_status(&self, dst: &str) -> Result<CopyStatus>;

    /// Delete an object; succeeds when the object is already absent.
    async fn delete(&self, name: &str) -> Result<()>;
}
