/// Staged atomic key set publication.
///
/// The destination store has no multi-object transaction, so the writer
/// stages every object under a unique temporary prefix and promotes the
/// whole set at `finish`: list the staging prefix, copy every object to its
/// final name concurrently, poll each copy to a terminal state, then delete
/// the staging area whether or not the commit succeeded.
///
/// Upload errors during staging are soft: they are accumulated and staging
/// continues, so `finish` can report the complete failure set in one
/// aggregate error instead of failing fast on the first object.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CopyFailure, Result, StrataError, UploadFailure};
use crate::keyset::metadata::KeyMetadata;
use crate::keyset::KeySetWriter;
use crate::storage::{CopyStatus, ObjectStore};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(300);

pub struct StagedKeySetWriter {
    store: Arc<dyn ObjectStore>,
    base_path: String,
    staging_id: String,
    failures: Vec<UploadFailure>,
    finished: bool,
    poll_interval: Duration,
    commit_timeout: Duration,
}

impl StagedKeySetWriter {
    /// Open a writer with a fresh staging identifier, creating the
    /// destination container if needed.
    pub async fn open(store: Arc<dyn ObjectStore>, base_path: impl Into<String>) -> Result<Self> {
        store.ensure_container().await?;
        let writer = Self {
            store,
            base_path: base_path.into(),
            staging_id: Uuid::new_v4().to_string(),
            failures: Vec::new(),
            finished: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        };
        debug!(
            base_path = %writer.base_path,
            staging_id = %writer.staging_id,
            "Opened staged key set writer"
        );
        Ok(writer)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound on the whole commit phase; expiry fails `finish` with
    /// `CommitTimeout`.
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    fn staging_prefix(&self) -> String {
        format!("{}/{}/", self.base_path, self.staging_id)
    }

    fn staged_name(&self, object: &str) -> String {
        format!("{}/{}/{}", self.base_path, self.staging_id, object)
    }

    fn final_name(&self, object: &str) -> String {
        format!("{}/{}", self.base_path, object)
    }

    /// Upload one object into the staging area. Errors are recorded as soft
    /// failures; staging continues for remaining writes.
    async fn stage(&mut self, object: &str, data: &[u8]) {
        if let Err(e) = self.store.put(&self.staged_name(object), data).await {
            warn!(object, error = %e, "Staging upload failed");
            self.failures.push(UploadFailure {
                object: object.to_string(),
                reason: e.to_string(),
            });
        }
    }

    /// Copy every staged object to its final name, all copies in flight at
    /// once, and poll each to a terminal state.
    async fn commit(&self, staged: &[String]) -> Result<()> {
        info!(
            base_path = %self.base_path,
            objects = staged.len(),
            "Committing staged key set"
        );
        let copies = async {
            let results = join_all(staged.iter().map(|src| self.commit_one(src))).await;
            let failures: Vec<CopyFailure> = results.into_iter().flatten().collect();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(StrataError::CommitFailed(failures))
            }
        };
        match tokio::time::timeout(self.commit_timeout, copies).await {
            Ok(result) => result,
            Err(_) => Err(StrataError::CommitTimeout(self.commit_timeout)),
        }
    }

    async fn commit_one(&self, src: &str) -> Option<CopyFailure> {
        let object = src.rsplit('/').next().unwrap_or(src).to_string();
        let dst = self.final_name(&object);
        if let Err(e) = self.store.begin_copy(src, &dst).await {
            return Some(CopyFailure {
                object,
                reason: e.to_string(),
            });
        }
        loop {
            match self.store.copy_status(&dst).await {
                Ok(CopyStatus::Pending) => sleep(self.poll_interval).await,
                Ok(CopyStatus::Success) => return None,
                Ok(CopyStatus::Failed(reason)) => return Some(CopyFailure { object, reason }),
                Err(e) => {
                    return Some(CopyFailure {
                        object,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Best-effort concurrent delete of the staging area. Failures are
    /// logged, never escalated: an orphaned staged object is a low-severity
    /// leak.
    async fn cleanup(&self, staged: &[String]) {
        let deletions = join_all(
            staged
                .iter()
                .map(|name| async move { (name, self.store.delete(name).await) }),
        )
        .await;
        for (name, result) in deletions {
            if let Err(e) = result {
                warn!(object = %name, error = %e, "Failed to delete staged object");
            }
        }
    }
}

#[async_trait]
impl KeySetWriter for StagedKeySetWriter {
    async fn write_key(&mut self, key_data: &[u8], version: u32) -> Result<()> {
        self.stage(&version.to_string(), key_data).await;
        Ok(())
    }

    async fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<()> {
        let json = metadata.to_json()?;
        self.stage("meta", json.as_bytes()).await;
        Ok(())
    }

    /// Promote the staged objects, or abort.
    ///
    /// With zero recorded upload failures the commit runs and `Ok(true)` is
    /// returned once every copy succeeds; otherwise the commit is skipped
    /// entirely and `StagingFailed` reports every recorded failure. The
    /// staging area is deleted on every path. Objects already copied when a
    /// later copy fails are not rolled back; `CommitFailed` names each
    /// failing object. Calling `finish` twice is a usage error.
    async fn finish(&mut self) -> Result<bool> {
        if self.finished {
            return Err(StrataError::WriterFinished);
        }
        self.finished = true;

        let staged = self.store.list(&self.staging_prefix()).await?;

        let commit_result = if self.failures.is_empty() {
            self.commit(&staged).await
        } else {
            debug!(
                failures = self.failures.len(),
                "Skipping commit, staging recorded failures"
            );
            Ok(())
        };

        self.cleanup(&staged).await;

        if !self.failures.is_empty() {
            return Err(StrataError::StagingFailed(std::mem::take(
                &mut self.failures,
            )));
        }
        commit_result?;
        info!(base_path = %self.base_path, "Key set published");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyset::metadata::{KeyKind, KeyPurpose};
    use crate::storage::memory::MemoryObjectStore;

    const FAST_POLL: Duration = Duration::from_millis(5);

    async fn writer(store: &Arc<MemoryObjectStore>, path: &str) -> StagedKeySetWriter {
        StagedKeySetWriter::open(store.clone() as Arc<dyn ObjectStore>, path)
            .await
            .unwrap()
            .with_poll_interval(FAST_POLL)
    }

    fn meta() -> KeyMetadata {
        KeyMetadata::new("staged", KeyPurpose::EncryptDecrypt, KeyKind::Symmetric)
    }

    #[tokio::test]
    async fn test_successful_publish_promotes_and_cleans() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut writer = writer(&store, "ks").await;

        writer.write_key(b"key one", 1).await.unwrap();
        writer.write_key(b"key two", 2).await.unwrap();
        writer.write_metadata(&meta()).await.unwrap();
        assert!(writer.finish().await.unwrap());

        assert_eq!(store.object("ks/1").await.unwrap(), b"key one");
        assert_eq!(store.object("ks/2").await.unwrap(), b"key two");
        assert!(store.object("ks/meta").await.is_some());

        // Nothing left under the staging prefix
        let all = store.list("ks/").await.unwrap();
        assert_eq!(all, vec!["ks/1", "ks/2", "ks/meta"]);
    }

    #[tokio::test]
    async fn test_soft_failure_skips_commit_and_aggregates() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_puts_with_suffix("/2", "simulated outage").await;
        let mut writer = writer(&store, "partial").await;

        writer.write_key(b"key one", 1).await.unwrap();
        writer.write_key(b"key two", 2).await.unwrap();
        writer.write_metadata(&meta()).await.unwrap();

        let err = writer.finish().await.unwrap_err();
        match err {
            StrataError::StagingFailed(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].object, "2");
                assert_eq!(failures[0].reason, "Storage error: simulated outage");
            }
            other => panic!("expected StagingFailed, got {other:?}"),
        }

        // The successfully staged objects were not committed, and the
        // staging area is gone
        assert!(store.list("partial/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_copy_failure_aggregates_without_rollback() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_copies_with_suffix("mixed/1", "copy interrupted").await;
        let mut writer = writer(&store, "mixed").await;

        writer.write_key(b"key one", 1).await.unwrap();
        writer.write_metadata(&meta()).await.unwrap();

        let err = writer.finish().await.unwrap_err();
        match err {
            StrataError::CommitFailed(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].object, "1");
                assert_eq!(failures[0].reason, "copy interrupted");
            }
            other => panic!("expected CommitFailed, got {other:?}"),
        }

        // The copy that succeeded stays published; no rollback
        assert!(store.object("mixed/meta").await.is_some());
        assert!(store.object("mixed/1").await.is_none());
        // Staging cleaned either way
        assert_eq!(store.list("mixed/").await.unwrap(), vec!["mixed/meta"]);
    }

    #[tokio::test]
    async fn test_poll_loop_waits_for_pending_copies() {
        let store = Arc::new(MemoryObjectStore::new());
        store.set_copy_pending_polls(3).await;
        let mut writer = writer(&store, "slow").await;

        writer.write_key(b"key one", 1).await.unwrap();
        writer.write_metadata(&meta()).await.unwrap();
        assert!(writer.finish().await.unwrap());

        assert_eq!(store.object("slow/1").await.unwrap(), b"key one");
    }

    #[tokio::test]
    async fn test_commit_timeout() {
        let store = Arc::new(MemoryObjectStore::new());
        store.set_copy_pending_polls(u32::MAX).await;
        let mut writer = writer(&store, "stuck")
            .await
            .with_commit_timeout(Duration::from_millis(50));

        writer.write_key(b"key one", 1).await.unwrap();

        assert!(matches!(
            writer.finish().await,
            Err(StrataError::CommitTimeout(_))
        ));
        // Cleanup still ran
        assert!(store.list("stuck/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finish_twice_is_usage_error() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut writer = writer(&store, "twice").await;
        writer.write_metadata(&meta()).await.unwrap();
        assert!(writer.finish().await.unwrap());
        assert!(matches!(
            writer.finish().await,
            Err(StrataError::WriterFinished)
        ));
    }

    #[tokio::test]
    async fn test_independent_writers_do_not_collide() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut first = writer(&store, "shared").await;
        let mut second = writer(&store, "shared").await;

        first.write_key(b"from first", 1).await.unwrap();
        second.write_key(b"from second", 2).await.unwrap();

        assert!(first.finish().await.unwrap());
        assert!(second.finish().await.unwrap());

        assert_eq!(store.object("shared/1").await.unwrap(), b"from first");
        assert_eq!(store.object("shared/2").await.unwrap(), b"from second");
        assert_eq!(store.list("shared/").await.unwrap().len(), 2);
    }
}
