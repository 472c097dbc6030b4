/// Symmetric encryption over a key set, with self-identifying ciphertexts.
///
/// Layout: `[format_byte][key_id; 4][nonce; 24][aead ciphertext]`. The
/// 5-byte header names the key version that produced the ciphertext and is
/// authenticated as AEAD associated data, so it cannot be swapped without
/// failing the tag check.
use zeroize::Zeroize;

use crate::crypto::aead;
use crate::crypto::session::SessionKey;
use crate::error::{Result, StrataError};
use crate::keyset::metadata::{KeyPurpose, FORMAT_VERSION, HEADER_LEN, KEY_ID_LEN};
use crate::keyset::KeySet;

/// Encrypts under the key set's primary version.
pub struct Encrypter<'a> {
    key_set: &'a dyn KeySet,
}

impl<'a> Encrypter<'a> {
    pub fn new(key_set: &'a dyn KeySet) -> Self {
        Self { key_set }
    }

    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let metadata = self.key_set.metadata().await?;
        if metadata.purpose != KeyPurpose::EncryptDecrypt {
            return Err(StrataError::InvalidKeyState(format!(
                "key set purpose {:?} cannot encrypt",
                metadata.purpose
            )));
        }
        let primary = metadata.primary_version().ok_or(StrataError::NoPrimaryKey)?;

        let mut header = [0u8; HEADER_LEN];
        header[0] = FORMAT_VERSION;
        header[1..].copy_from_slice(&primary.key_id);

        let mut key_data = self.key_set.get_key_data(primary.version_number).await?;
        let key = SessionKey::from_slice(&key_data).ok_or_else(|| {
            StrataError::Crypto("key material is not a 32-byte symmetric key".into())
        });
        key_data.zeroize();
        let key = key?;

        let (nonce, ciphertext) = aead::seal(&key, plaintext, &header)?;

        let mut out = Vec::with_capacity(HEADER_LEN + aead::NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

/// Decrypts ciphertexts produced by any version of the key set.
pub struct Crypter<'a> {
    key_set: &'a dyn KeySet,
}

impl<'a> Crypter<'a> {
    pub fn new(key_set: &'a dyn KeySet) -> Self {
        Self { key_set }
    }

    pub async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < HEADER_LEN + aead::NONCE_LEN + aead::TAG_LEN {
            return Err(StrataError::Crypto("ciphertext too short".into()));
        }
        if ciphertext[0] != FORMAT_VERSION {
            return Err(StrataError::Crypto(format!(
                "unrecognized ciphertext format {}",
                ciphertext[0]
            )));
        }
        let header = &ciphertext[..HEADER_LEN];
        let key_id: [u8; KEY_ID_LEN] = header[1..].try_into()
            .map_err(|_| StrataError::Crypto("ciphertext header truncated".into()))?;

        let metadata = self.key_set.metadata().await?;
        let version = metadata
            .versions
            .iter()
            .find(|v| v.key_id == key_id)
            .ok_or(StrataError::KeyMismatch)?;

        let mut key_data = self.key_set.get_key_data(version.version_number).await?;
        let key = SessionKey::from_slice(&key_data).ok_or_else(|| {
            StrataError::Crypto("key material is not a 32-byte symmetric key".into())
        });
        key_data.zeroize();
        let key = key?;

        let mut nonce = [0u8; aead::NONCE_LEN];
        nonce.copy_from_slice(&ciphertext[HEADER_LEN..HEADER_LEN + aead::NONCE_LEN]);

        aead::open(&key, &nonce, &ciphertext[HEADER_LEN + aead::NONCE_LEN..], header)
    }
}
