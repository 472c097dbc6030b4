/// Key set contracts and layer composition.
///
/// A key set is read access to versioned key material plus metadata; a key
/// set writer is the write side with a two-phase `finish`. Layers decorate
/// either side with a payload transform (the envelope layer is the one
/// implemented here) without changing the contract.
pub mod filesystem;
pub mod metadata;
pub mod mutable;

use async_trait::async_trait;

use crate::error::Result;
use metadata::KeyMetadata;

/// Read access to a versioned key set.
#[async_trait]
pub trait KeySet: Send + Sync {
    async fn metadata(&self) -> Result<KeyMetadata>;

    /// Key material bytes for a version; `NotFound` when the version does
    /// not exist.
    async fn get_key_data(&self, version: u32) -> Result<Vec<u8>>;
}

/// Write access to a versioned key set.
#[async_trait]
pub trait KeySetWriter: Send {
    async fn write_key(&mut self, key_data: &[u8], version: u32) -> Result<()>;

    async fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<()>;

    /// Complete the write. `Ok(true)` is the only success value; failure
    /// paths surface as errors.
    async fn finish(&mut self) -> Result<bool>;
}

/// A composable transform applied around a base key set.
///
/// Layers form a stack: on write the last layer in the declared list wraps
/// first, so the first layer's wrap is outermost; reading unwraps in
/// declared order, which keeps the two paths symmetric by construction.
pub trait KeyLayer: Send + Sync {
    /// True when the transform changes payload confidentiality; drives the
    /// `encrypted` metadata flag.
    fn seals_payload(&self) -> bool;

    fn wrap(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn unwrap_payload(&self, wrapped: &[u8]) -> Result<Vec<u8>>;
}

/// A key set decorated with an ordered list of payload transforms.
pub struct LayeredKeySet {
    // Layers drop before the base.
    layers: Vec<Box<dyn KeyLayer>>,
    base: Box<dyn KeySet>,
}

impl LayeredKeySet {
    pub fn layer(base: Box<dyn KeySet>, layers: Vec<Box<dyn KeyLayer>>) -> Self {
        Self { layers, base }
    }
}

#[async_trait]
impl KeySet for LayeredKeySet {
    async fn metadata(&self) -> Result<KeyMetadata> {
        self.base.metadata().await
    }

    async fn get_key_data(&self, version: u32) -> Result<Vec<u8>> {
        let mut data = self.base.get_key_data(version).await?;
        for layer in &self.layers {
            data = layer.unwrap_payload(&data)?;
        }
        Ok(data)
    }
}

/// A key set writer decorated with an ordered list of payload transforms.
pub struct LayeredKeySetWriter {
    layers: Vec<Box<dyn KeyLayer>>,
    base: Box<dyn KeySetWriter>,
}

impl LayeredKeySetWriter {
    pub fn layer(base: Box<dyn KeySetWriter>, layers: Vec<Box<dyn KeyLayer>>) -> Self {
        Self { layers, base }
    }
}

#[async_trait]
impl KeySetWriter for LayeredKeySetWriter {
    async fn write_key(&mut self, key_data: &[u8], version: u32) -> Result<()> {
        let mut data = key_data.to_vec();
        for layer in self.layers.iter().rev() {
            data = layer.wrap(&data)?;
        }
        self.base.write_key(&data, version).await
    }

    async fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<()> {
        let mut metadata = metadata.clone();
        if self.layers.iter().any(|l| l.seals_payload()) {
            metadata.encrypted = true;
        }
        self.base.write_metadata(&metadata).await
    }

    async fn finish(&mut self) -> Result<bool> {
        self.base.finish().await
    }
}

/// Key bytes for the primary version, or None when no version is primary.
pub async fn primary_key_data(key_set: &dyn KeySet) -> Result<Option<Vec<u8>>> {
    let metadata = key_set.metadata().await?;
    match metadata.primary_version() {
        Some(primary) => Ok(Some(key_set.get_key_data(primary.version_number).await?)),
        None => Ok(None),
    }
}
