/// The asymmetric credential consumed by the envelope layer: an RSA key
/// pair, typically extracted from a certificate bundle.
///
/// Certificate acquisition itself (PKCS#12 parsing, platform certificate
/// stores) is the caller's concern; this boundary takes the key pair, either
/// directly or as PKCS#8 material.
use pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{Result, StrataError};

#[derive(Clone)]
pub struct Credential {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl Credential {
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { private, public }
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| StrataError::Crypto(format!("failed to parse PKCS#8 PEM: {e}")))?;
        Ok(Self::from_private_key(private))
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| StrataError::Crypto(format!("failed to parse PKCS#8 DER: {e}")))?;
        Ok(Self::from_private_key(private))
    }

    /// Wrap session material under the public half (RSA-OAEP with SHA-256).
    pub(crate) fn wrap_session_material(&self, material: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;
        self.public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), material)
            .map_err(|e| StrataError::Crypto(format!("session key wrap failed: {e}")))
    }

    /// Unwrap session material with the private half.
    ///
    /// Any RSA failure maps to `KeyMismatch`: the usual cause is a payload
    /// wrapped under a different certificate.
    pub(crate) fn unwrap_session_material(&self, wrapped: &[u8]) -> Result<Vec<u8>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| StrataError::KeyMismatch)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::OnceLock;

    use rsa::RsaPrivateKey;

    use super::Credential;

    // 2048-bit generation is slow in debug builds; generate once per test run.
    pub fn credential() -> Credential {
        static CELL: OnceLock<Credential> = OnceLock::new();
        CELL.get_or_init(|| {
            let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("generate rsa key");
            Credential::from_private_key(key)
        })
        .clone()
    }

    pub fn other_credential() -> Credential {
        static CELL: OnceLock<Credential> = OnceLock::new();
        CELL.get_or_init(|| {
            let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("generate rsa key");
            Credential::from_private_key(key)
        })
        .clone()
    }
}
