/// In-memory mutable key set for lifecycle management: add fresh versions,
/// promote/demote them through the status ladder, revoke retired versions,
/// and save the whole set through any writer.
use std::collections::BTreeMap;

use async_trait::async_trait;
use pkcs8::EncodePrivateKey;
use rand::RngCore;
use rsa::RsaPrivateKey;

use crate::crypto::session::SecretBytes;
use crate::error::{Result, StrataError};
use crate::keyset::metadata::{
    key_fingerprint, DigestAlg, KeyKind, KeyMetadata, KeyPurpose, KeyStatus, KeyVersion,
};
use crate::keyset::{KeySet, KeySetWriter};

const RSA_KEY_BITS: usize = 2048;

pub struct MutableKeySet {
    metadata: KeyMetadata,
    keys: BTreeMap<u32, SecretBytes>,
}

impl MutableKeySet {
    /// A fresh key set with no versions.
    pub fn new(metadata: KeyMetadata) -> Self {
        Self {
            metadata,
            keys: BTreeMap::new(),
        }
    }

    /// Load every version's key material through the given (possibly
    /// layered) reader.
    pub async fn from_key_set(source: &dyn KeySet) -> Result<Self> {
        let mut metadata = source.metadata().await?;
        let mut keys = BTreeMap::new();
        for version in &metadata.versions {
            let data = source.get_key_data(version.version_number).await?;
            keys.insert(version.version_number, SecretBytes::new(data));
        }
        // The in-memory set holds plaintext; a sealing writer re-flags it on
        // save.
        metadata.encrypted = false;
        Ok(Self { metadata, keys })
    }

    /// Generate a new key version with the given status and return its
    /// version number. Adding a Primary demotes the current Primary to
    /// Active.
    pub fn add_key(&mut self, status: KeyStatus) -> Result<u32> {
        let material = generate_key_material(&self.metadata)?;
        self.insert_version(status, material)
    }

    /// Add existing key material as a new version (imported keys, e.g. an
    /// RSA private key already held elsewhere).
    pub fn import_key(&mut self, status: KeyStatus, key_data: Vec<u8>) -> Result<u32> {
        self.insert_version(status, SecretBytes::new(key_data))
    }

    fn insert_version(&mut self, status: KeyStatus, material: SecretBytes) -> Result<u32> {
        let version_number = self.metadata.next_version_number();
        let key_id = key_fingerprint(material.as_bytes());
        if status == KeyStatus::Primary {
            self.step_down_primary();
        }
        self.metadata.versions.push(KeyVersion {
            version_number,
            status,
            key_id,
        });
        self.keys.insert(version_number, material);
        Ok(version_number)
    }

    /// Raise a version one step (Inactive -> Active -> Primary) and return
    /// its new status. Promoting to Primary demotes the current Primary.
    pub fn promote(&mut self, version: u32) -> Result<KeyStatus> {
        let status = self.status_of(version)?;
        let next = match status {
            KeyStatus::Inactive => KeyStatus::Active,
            KeyStatus::Active => KeyStatus::Primary,
            KeyStatus::Primary => {
                return Err(StrataError::InvalidKeyState(format!(
                    "version {version} is already primary"
                )))
            }
        };
        if next == KeyStatus::Primary {
            self.step_down_primary();
        }
        self.set_status(version, next);
        Ok(next)
    }

    fn step_down_primary(&mut self) {
        let primary = self.metadata.primary_version().map(|v| v.version_number);
        if let Some(number) = primary {
            self.set_status(number, KeyStatus::Active);
        }
    }

    fn set_status(&mut self, version: u32, status: KeyStatus) {
        if let Some(entry) = self.metadata.version_mut(version) {
            entry.status = status;
        }
    }

    /// Lower a version one step (Primary -> Active -> Inactive) and return
    /// its new status.
    pub fn demote(&mut self, version: u32) -> Result<KeyStatus> {
        let status = self.status_of(version)?;
        let next = match status {
            KeyStatus::Primary => KeyStatus::Active,
            KeyStatus::Active => KeyStatus::Inactive,
            KeyStatus::Inactive => {
                return Err(StrataError::InvalidKeyState(format!(
                    "version {version} is already inactive"
                )))
            }
        };
        self.set_status(version, next);
        Ok(next)
    }

    /// Remove an Inactive version and its key material.
    pub fn revoke(&mut self, version: u32) -> Result<()> {
        let status = self.status_of(version)?;
        if status != KeyStatus::Inactive {
            return Err(StrataError::InvalidKeyState(format!(
                "version {version} must be inactive before revocation, is {status:?}"
            )));
        }
        self.metadata
            .versions
            .retain(|v| v.version_number != version);
        self.keys.remove(&version);
        Ok(())
    }

    /// Write every version's key material plus the metadata, then finish.
    pub async fn save(&self, writer: &mut dyn KeySetWriter) -> Result<bool> {
        for (version_number, material) in &self.keys {
            writer.write_key(material.as_bytes(), *version_number).await?;
        }
        writer.write_metadata(&self.metadata).await?;
        writer.finish().await
    }

    fn status_of(&self, version: u32) -> Result<KeyStatus> {
        self.metadata
            .version(version)
            .map(|v| v.status)
            .ok_or_else(|| StrataError::NotFound(format!("key version {version}")))
    }
}

#[async_trait]
impl KeySet for MutableKeySet {
    async fn metadata(&self) -> Result<KeyMetadata> {
        Ok(self.metadata.clone())
    }

    async fn get_key_data(&self, version: u32) -> Result<Vec<u8>> {
        self.keys
            .get(&version)
            .map(|material| material.as_bytes().to_vec())
            .ok_or_else(|| StrataError::NotFound(format!("key version {version}")))
    }
}

/// Fresh key material sized for the set's kind, purpose, and digest.
fn generate_key_material(metadata: &KeyMetadata) -> Result<SecretBytes> {
    match (metadata.kind, metadata.purpose) {
        (KeyKind::Symmetric, KeyPurpose::EncryptDecrypt) => Ok(random_bytes(32)),
        (KeyKind::Symmetric, KeyPurpose::SignVerify) => {
            let len = match metadata.digest {
                DigestAlg::Sha256 => 32,
                DigestAlg::Sha384 => 48,
                DigestAlg::Sha512 => 64,
            };
            Ok(random_bytes(len))
        }
        (KeyKind::Private, KeyPurpose::SignVerify) => {
            let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)
                .map_err(|e| StrataError::Crypto(format!("RSA key generation failed: {e}")))?;
            let der = key
                .to_pkcs8_der()
                .map_err(|e| StrataError::Crypto(format!("PKCS#8 encoding failed: {e}")))?;
            Ok(SecretBytes::new(der.as_bytes().to_vec()))
        }
        (kind, purpose) => Err(StrataError::InvalidKeyState(format!(
            "cannot generate key material for kind {kind:?} with purpose {purpose:?}; \
             import the material instead"
        ))),
    }
}

fn random_bytes(len: usize) -> SecretBytes {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    SecretBytes::new(bytes)
}
