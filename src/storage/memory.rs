/// In-memory object store for tests and local development.
///
/// Failure behavior is configurable so publish-protocol tests are
/// deterministic: individual uploads or copies can be forced to fail by
/// name suffix, and copies can be held Pending for a fixed number of
/// status polls before turning terminal.
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Result, StrataError};
use crate::storage::{CopyStatus, ObjectStore};

#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Vec<u8>>,
    copies: HashMap<String, CopyProgress>,
    put_failures: Vec<(String, String)>,
    copy_failures: Vec<(String, String)>,
    copy_pending_polls: u32,
}

struct CopyProgress {
    remaining_polls: u32,
    outcome: std::result::Result<Vec<u8>, String>,
    done: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every upload whose object name ends with `suffix` to fail.
    pub async fn fail_puts_with_suffix(&self, suffix: &str, reason: &str) {
        let mut state = self.state.lock().await;
        state
            .put_failures
            .push((suffix.to_string(), reason.to_string()));
    }

    /// Force every copy whose destination ends with `suffix` to end Failed.
    pub async fn fail_copies_with_suffix(&self, suffix: &str, reason: &str) {
        let mut state = self.state.lock().await;
        state
            .copy_failures
            .push((suffix.to_string(), reason.to_string()));
    }

    /// Report Pending for this many status polls before a copy turns
    /// terminal.
    pub async fn set_copy_pending_polls(&self, polls: u32) {
        self.state.lock().await.copy_pending_polls = polls;
    }

    /// Current contents of an object, for assertions.
    pub async fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().await.objects.get(name).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_container(&self) -> Result<()> {
        Ok(())
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some((_, reason)) = state
            .put_failures
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
        {
            return Err(StrataError::Storage(reason.clone()));
        }
        state.objects.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.state
            .lock()
            .await
            .objects
            .get(name)
            .cloned()
            .ok_or_else(|| StrataError::NotFound(name.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .await
            .objects
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn begin_copy(&self, src: &str, dst: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let data = state
            .objects
            .get(src)
            .cloned()
            .ok_or_else(|| StrataError::NotFound(src.to_string()))?;
        let outcome = match state
            .copy_failures
            .iter()
            .find(|(suffix, _)| dst.ends_with(suffix))
        {
            Some((_, reason)) => Err(reason.clone()),
            None => Ok(data),
        };
        let progress = CopyProgress {
            remaining_polls: state.copy_pending_polls,
            outcome,
            done: false,
        };
        state.copies.insert(dst.to_string(), progress);
        Ok(())
    }

    async fn copy_status(&self, dst: &str) -> Result<CopyStatus> {
        let mut state = self.state.lock().await;
        let Some(mut progress) = state.copies.remove(dst) else {
            return Err(StrataError::Storage(format!("no copy targets {dst}")));
        };
        if !progress.done && progress.remaining_polls > 0 {
            progress.remaining_polls -= 1;
            state.copies.insert(dst.to_string(), progress);
            return Ok(CopyStatus::Pending);
        }
        let status = match &progress.outcome {
            Ok(data) => {
                if !progress.done {
                    // The destination appears exactly at completion time
                    state.objects.insert(dst.to_string(), data.clone());
                }
                CopyStatus::Success
            }
            Err(reason) => CopyStatus::Failed(reason.clone()),
        };
        progress.done = true;
        state.copies.insert(dst.to_string(), progress);
        Ok(status)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.state.lock().await.objects.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let store = MemoryObjectStore::new();
        store.put("a/1", b"one").await.unwrap();
        store.put("a/2", b"two").await.unwrap();
        store.put("b/1", b"other").await.unwrap();

        assert_eq!(store.get("a/1").await.unwrap(), b"one");
        assert_eq!(store.list("a/").await.unwrap(), vec!["a/1", "a/2"]);

        store.delete("a/1").await.unwrap();
        assert!(matches!(
            store.get("a/1").await,
            Err(StrataError::NotFound(_))
        ));
        // Deleting again is fine
        store.delete("a/1").await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_completes_immediately_by_default() {
        let store = MemoryObjectStore::new();
        store.put("src", b"data").await.unwrap();
        store.begin_copy("src", "dst").await.unwrap();

        assert_eq!(store.copy_status("dst").await.unwrap(), CopyStatus::Success);
        assert_eq!(store.get("dst").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_copy_stays_pending_for_configured_polls() {
        let store = MemoryObjectStore::new();
        store.set_copy_pending_polls(2).await;
        store.put("src", b"data").await.unwrap();
        store.begin_copy("src", "dst").await.unwrap();

        assert_eq!(store.copy_status("dst").await.unwrap(), CopyStatus::Pending);
        assert_eq!(store.copy_status("dst").await.unwrap(), CopyStatus::Pending);
        assert_eq!(store.copy_status("dst").await.unwrap(), CopyStatus::Success);
        // Terminal states are stable
        assert_eq!(store.copy_status("dst").await.unwrap(), CopyStatus::Success);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryObjectStore::new();
        store.fail_puts_with_suffix("/poison", "disk full").await;
        assert!(store.put("x/poison", b"data").await.is_err());
        store.put("x/fine", b"data").await.unwrap();

        store.fail_copies_with_suffix("bad-dst", "copy interrupted").await;
        store.begin_copy("x/fine", "bad-dst").await.unwrap();
        assert_eq!(
            store.copy_status("bad-dst").await.unwrap(),
            CopyStatus::Failed("copy interrupted".to_string())
        );
        assert!(store.object("bad-dst").await.is_none());
    }
}
