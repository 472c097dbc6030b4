/// Read side of a published key set: fetches versioned objects directly
/// from the committed path. There is no staging concept on read; a reader
/// overlapping another writer's commit sees each object either pre- or
/// post-copy, never partially written.
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, StrataError};
use crate::keyset::metadata::KeyMetadata;
use crate::keyset::KeySet;
use crate::storage::ObjectStore;

pub struct RemoteKeySet {
    store: Arc<dyn ObjectStore>,
    base_path: String,
}

impl RemoteKeySet {
    pub fn new(store: Arc<dyn ObjectStore>, base_path: impl Into<String>) -> Self {
        Self {
            store,
            base_path: base_path.into(),
        }
    }

    async fn object(&self, name: &str) -> Result<Vec<u8>> {
        self.store
            .get(&format!("{}/{}", self.base_path, name))
            .await
    }
}

#[async_trait]
impl KeySet for RemoteKeySet {
    async fn metadata(&self) -> Result<KeyMetadata> {
        let data = self.object("meta").await?;
        let json = String::from_utf8(data)
            .map_err(|e| StrataError::Serialization(format!("meta is not UTF-8: {e}")))?;
        KeyMetadata::from_json(&json)
    }

    async fn get_key_data(&self, version: u32) -> Result<Vec<u8>> {
        self.object(&version.to_string()).await
    }
}
