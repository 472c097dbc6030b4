/// Hybrid envelope protection for key material.
///
/// Wrap: generate a fresh 256-bit session key, wrap it under the RSA
/// credential, seal the payload under the session key, and serialize the
/// whole as a SessionPack. Unwrap is the inverse. Two wraps of identical
/// plaintext never produce identical bytes: both the session key and the
/// nonce are fresh per call.
///
/// SessionPack wire format (JSON, URL-safe base64 text fields):
/// `{"version":1,"sessionMaterial":"...","cipherText":"..."}`
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::aead;
use crate::crypto::credential::Credential;
use crate::crypto::session::SessionKey;
use crate::encoding;
use crate::error::{Result, StrataError};
use crate::keyset::KeyLayer;

pub const SESSION_PACK_VERSION: u32 = 1;

/// Cipher identifier carried inside the wrapped session material, so the
/// blob describes its own use.
const SESSION_KEY_ALG: &str = "xchacha20poly1305";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPack {
    version: u32,
    /// RSA-OAEP wrap of the session material blob.
    session_material: String,
    /// nonce || AEAD ciphertext of the real payload.
    cipher_text: String,
}

/// The blob that travels inside the asymmetric wrap.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SessionMaterial {
    alg: String,
    #[serde(with = "session_key_text")]
    key: Vec<u8>,
}

mod session_key_text {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::encoding;

    pub fn serialize<S: Serializer>(key: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&encoding::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        encoding::decode(&text).map_err(D::Error::custom)
    }
}

/// Envelope encryption layer over an RSA credential.
pub struct EnvelopeCrypter {
    credential: Credential,
}

impl EnvelopeCrypter {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// Protect a key material payload under a fresh session key.
    pub fn wrap(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let session_key = aead::generate_key();

        let material = SessionMaterial {
            alg: SESSION_KEY_ALG.to_string(),
            key: session_key.as_bytes().to_vec(),
        };
        let mut blob = serde_json::to_vec(&material)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;
        let wrapped_key = self.credential.wrap_session_material(&blob);
        blob.zeroize();
        let wrapped_key = wrapped_key?;

        let (nonce, ciphertext) = aead::seal(&session_key, plaintext, b"")?;
        let mut cipher = Vec::with_capacity(aead::NONCE_LEN + ciphertext.len());
        cipher.extend_from_slice(&nonce);
        cipher.extend_from_slice(&ciphertext);

        let pack = SessionPack {
            version: SESSION_PACK_VERSION,
            session_material: encoding::encode(&wrapped_key),
            cipher_text: encoding::encode(&cipher),
        };
        serde_json::to_vec(&pack).map_err(|e| StrataError::Serialization(e.to_string()))
    }

    /// Recover the payload protected by `wrap`.
    ///
    /// The recovered session key exists only for the duration of this call.
    pub fn unwrap_payload(&self, wrapped: &[u8]) -> Result<Vec<u8>> {
        let pack: SessionPack = serde_json::from_slice(wrapped)
            .map_err(|e| StrataError::MalformedEnvelope(e.to_string()))?;
        if pack.version != SESSION_PACK_VERSION {
            return Err(StrataError::MalformedEnvelope(format!(
                "unrecognized format version {}",
                pack.version
            )));
        }

        let wrapped_key = encoding::decode(&pack.session_material)
            .map_err(|_| StrataError::MalformedEnvelope("session material is not base64".into()))?;
        let mut blob = self.credential.unwrap_session_material(&wrapped_key)?;
        let material: std::result::Result<SessionMaterial, _> = serde_json::from_slice(&blob);
        blob.zeroize();
        let material = material
            .map_err(|e| StrataError::MalformedEnvelope(format!("session material blob: {e}")))?;
        if material.alg != SESSION_KEY_ALG {
            return Err(StrataError::MalformedEnvelope(format!(
                "unrecognized session key algorithm {}",
                material.alg
            )));
        }
        let session_key = SessionKey::from_slice(&material.key)
            .ok_or_else(|| StrataError::MalformedEnvelope("session key length".into()))?;

        let cipher = encoding::decode(&pack.cipher_text)
            .map_err(|_| StrataError::MalformedEnvelope("ciphertext is not base64".into()))?;
        if cipher.len() < aead::NONCE_LEN + aead::TAG_LEN {
            return Err(StrataError::MalformedEnvelope("truncated ciphertext".into()));
        }
        let mut nonce = [0u8; aead::NONCE_LEN];
        nonce.copy_from_slice(&cipher[..aead::NONCE_LEN]);

        aead::open(&session_key, &nonce, &cipher[aead::NONCE_LEN..], b"")
    }
}

impl KeyLayer for EnvelopeCrypter {
    fn seals_payload(&self) -> bool {
        true
    }

    fn wrap(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        EnvelopeCrypter::wrap(self, plaintext)
    }

    fn unwrap_payload(&self, wrapped: &[u8]) -> Result<Vec<u8>> {
        EnvelopeCrypter::unwrap_payload(self, wrapped)
    }
}
