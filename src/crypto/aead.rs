/// XChaCha20-Poly1305 AEAD protecting key material payloads.
///
/// Every seal uses a fresh session key and a fresh random nonce. The 24-byte
/// nonce of XChaCha20 is large enough for random generation without
/// practical collision risk.
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::crypto::session::SessionKey;
use crate::error::{Result, StrataError};

pub const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

/// Generate a random 256-bit session key.
pub fn generate_key() -> SessionKey {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    SessionKey::new(key)
}

/// Generate a random 24-byte nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt plaintext, returning (nonce, ciphertext_with_tag).
///
/// The AAD is authenticated but not encrypted.
pub fn seal(key: &SessionKey, plaintext: &[u8], aad: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| StrataError::Crypto(e.to_string()))?;

    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| StrataError::Crypto(e.to_string()))?;

    Ok((nonce_bytes, ciphertext))
}

/// Authenticate and decrypt ciphertext.
///
/// Fails with `IntegrityFailure` before any plaintext is produced when the
/// tag does not verify.
pub fn open(
    key: &SessionKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| StrataError::Crypto(e.to_string()))?;

    let xnonce = XNonce::from_slice(nonce);

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(xnonce, payload)
        .map_err(|_| StrataError::IntegrityFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = generate_key();
        let (nonce, ct) = seal(&key, b"key material", b"header").unwrap();
        let pt = open(&key, &nonce, &ct, b"header").unwrap();
        assert_eq!(pt, b"key material");
    }

    #[test]
    fn test_tamper_detection() {
        let key = generate_key();
        let (nonce, mut ct) = seal(&key, b"key material", b"").unwrap();
        ct[0] ^= 0x01;
        assert!(matches!(
            open(&key, &nonce, &ct, b""),
            Err(StrataError::IntegrityFailure)
        ));
    }

    #[test]
    fn test_wrong_aad_rejected() {
        let key = generate_key();
        let (nonce, ct) = seal(&key, b"key material", b"aad-1").unwrap();
        assert!(matches!(
            open(&key, &nonce, &ct, b"aad-2"),
            Err(StrataError::IntegrityFailure)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = generate_key();
        let other = generate_key();
        let (nonce, ct) = seal(&key, b"key material", b"").unwrap();
        assert!(matches!(
            open(&other, &nonce, &ct, b""),
            Err(StrataError::IntegrityFailure)
        ));
    }
}
