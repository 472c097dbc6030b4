/// Key set metadata: name, purpose, kind, digest, and the ordered list of
/// key versions with their lifecycle status.
///
/// Metadata is stored as JSON next to the key material objects and is never
/// encrypted by any layer; only key material payloads are.
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Length of a key fingerprint.
pub const KEY_ID_LEN: usize = 4;

/// Format byte leading every self-identifying ciphertext.
pub const FORMAT_VERSION: u8 = 1;

/// Ciphertext header: format byte followed by the key fingerprint.
pub const HEADER_LEN: usize = 1 + KEY_ID_LEN;

/// What the key set's material is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyPurpose {
    EncryptDecrypt,
    SignVerify,
    VerifyOnly,
}

/// The shape of the key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyKind {
    Symmetric,
    Private,
    Public,
}

/// Digest used by signing key sets; drives JOSE algorithm selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DigestAlg {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

/// Version lifecycle status.
///
/// Primary is used for new operations, Active and Inactive only for reading
/// or verification. At most one version of a key set is Primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyStatus {
    Primary,
    Active,
    Inactive,
}

/// One versioned entry of a key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVersion {
    pub version_number: u32,
    pub status: KeyStatus,
    /// Fingerprint of the key material; ciphertexts carry it as a header so
    /// they self-identify their decryption key.
    #[serde(with = "key_id_text")]
    pub key_id: [u8; KEY_ID_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub name: String,
    pub purpose: KeyPurpose,
    pub kind: KeyKind,
    #[serde(default)]
    pub digest: DigestAlg,
    /// True when key material payloads were transformed by a sealing layer
    /// before being persisted.
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub versions: Vec<KeyVersion>,
}

impl KeyMetadata {
    pub fn new(name: impl Into<String>, purpose: KeyPurpose, kind: KeyKind) -> Self {
        Self {
            name: name.into(),
            purpose,
            kind,
            digest: DigestAlg::default(),
            encrypted: false,
            versions: Vec::new(),
        }
    }

    pub fn with_digest(mut self, digest: DigestAlg) -> Self {
        self.digest = digest;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StrataError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StrataError::Serialization(e.to_string()))
    }

    /// The version used for new operations, or None when no version is
    /// primary (legal after a demotion).
    pub fn primary_version(&self) -> Option<&KeyVersion> {
        self.versions
            .iter()
            .find(|v| v.status == KeyStatus::Primary)
    }

    pub fn version(&self, number: u32) -> Option<&KeyVersion> {
        self.versions.iter().find(|v| v.version_number == number)
    }

    pub(crate) fn version_mut(&mut self, number: u32) -> Option<&mut KeyVersion> {
        self.versions
            .iter_mut()
            .find(|v| v.version_number == number)
    }

    /// Next version number to assign; numbers are monotonic and never
    /// reassigned while a version exists.
    pub fn next_version_number(&self) -> u32 {
        self.versions
            .iter()
            .map(|v| v.version_number)
            .max()
            .map_or(1, |max| max + 1)
    }
}

/// Fingerprint of key material, used as the wire identity of a key version.
pub fn key_fingerprint(key_data: &[u8]) -> [u8; KEY_ID_LEN] {
    let hash = blake3::derive_key("keystrata key fingerprint v1", key_data);
    let mut id = [0u8; KEY_ID_LEN];
    id.copy_from_slice(&hash[..KEY_ID_LEN]);
    id
}

mod key_id_text {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::KEY_ID_LEN;
    use crate::encoding;

    pub fn serialize<S: Serializer>(id: &[u8; KEY_ID_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&encoding::encode(id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; KEY_ID_LEN], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = encoding::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("key id must be 4 bytes"))
    }
}
