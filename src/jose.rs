/// JOSE signing bridge: exposes a key set to external JWT tooling as a set
/// of algorithm identifiers plus sign/verify primitives.
///
/// Algorithm selection is a pure function of the set's kind, purpose, and
/// digest; combinations with no JOSE mapping produce a typed error, never a
/// null.
use pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use signature::{RandomizedSigner, SignatureEncoding, Verifier};
use zeroize::Zeroize;

use crate::error::{Result, StrataError};
use crate::keyset::metadata::{DigestAlg, KeyKind, KeyMetadata, KeyPurpose};
use crate::keyset::KeySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoseAlgorithm {
    Hs256,
    Hs384,
    Hs512,
    Ps256,
    Ps384,
    Ps512,
}

impl JoseAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoseAlgorithm::Hs256 => "HS256",
            JoseAlgorithm::Hs384 => "HS384",
            JoseAlgorithm::Hs512 => "HS512",
            JoseAlgorithm::Ps256 => "PS256",
            JoseAlgorithm::Ps384 => "PS384",
            JoseAlgorithm::Ps512 => "PS512",
        }
    }
}

impl std::fmt::Display for JoseAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JOSE algorithm a key set signs or verifies with.
pub fn algorithm_for(kind: KeyKind, purpose: KeyPurpose, digest: DigestAlg) -> Result<JoseAlgorithm> {
    match (kind, purpose, digest) {
        (KeyKind::Symmetric, KeyPurpose::SignVerify, DigestAlg::Sha256) => Ok(JoseAlgorithm::Hs256),
        (KeyKind::Symmetric, KeyPurpose::SignVerify, DigestAlg::Sha384) => Ok(JoseAlgorithm::Hs384),
        (KeyKind::Symmetric, KeyPurpose::SignVerify, DigestAlg::Sha512) => Ok(JoseAlgorithm::Hs512),
        (KeyKind::Private, KeyPurpose::SignVerify, DigestAlg::Sha256) => Ok(JoseAlgorithm::Ps256),
        (KeyKind::Private, KeyPurpose::SignVerify, DigestAlg::Sha384) => Ok(JoseAlgorithm::Ps384),
        (KeyKind::Private, KeyPurpose::SignVerify, DigestAlg::Sha512) => Ok(JoseAlgorithm::Ps512),
        (KeyKind::Public, KeyPurpose::VerifyOnly, DigestAlg::Sha256) => Ok(JoseAlgorithm::Ps256),
        (KeyKind::Public, KeyPurpose::VerifyOnly, DigestAlg::Sha384) => Ok(JoseAlgorithm::Ps384),
        (KeyKind::Public, KeyPurpose::VerifyOnly, DigestAlg::Sha512) => Ok(JoseAlgorithm::Ps512),
        (kind, purpose, digest) => Err(StrataError::UnsupportedAlgorithm {
            kind,
            purpose,
            digest,
        }),
    }
}

/// Algorithm identifiers a key set can offer an external JWT library.
pub fn supported_algorithms(metadata: &KeyMetadata) -> Vec<JoseAlgorithm> {
    algorithm_for(metadata.kind, metadata.purpose, metadata.digest)
        .into_iter()
        .collect()
}

/// Signs with the key set's primary version.
pub struct KeySetSigner<'a> {
    key_set: &'a dyn KeySet,
}

impl<'a> KeySetSigner<'a> {
    pub fn new(key_set: &'a dyn KeySet) -> Self {
        Self { key_set }
    }

    pub async fn algorithm(&self) -> Result<JoseAlgorithm> {
        let metadata = self.key_set.metadata().await?;
        algorithm_for(metadata.kind, metadata.purpose, metadata.digest)
    }

    pub async fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let metadata = self.key_set.metadata().await?;
        algorithm_for(metadata.kind, metadata.purpose, metadata.digest)?;
        let primary = metadata.primary_version().ok_or(StrataError::NoPrimaryKey)?;

        let mut key_data = self.key_set.get_key_data(primary.version_number).await?;
        let signature = match metadata.kind {
            KeyKind::Symmetric => hmac_sign(metadata.digest, &key_data, data),
            KeyKind::Private => rsa_pss_sign(metadata.digest, &key_data, data),
            KeyKind::Public => Err(StrataError::InvalidKeyState(
                "verify-only key set cannot sign".into(),
            )),
        };
        key_data.zeroize();
        signature
    }
}

/// Verifies against every version, newest first.
pub struct KeySetVerifier<'a> {
    key_set: &'a dyn KeySet,
}

impl<'a> KeySetVerifier<'a> {
    pub fn new(key_set: &'a dyn KeySet) -> Self {
        Self { key_set }
    }

    pub async fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool> {
        let metadata = self.key_set.metadata().await?;
        algorithm_for(metadata.kind, metadata.purpose, metadata.digest)?;

        for version in metadata.versions.iter().rev() {
            let mut key_data = self.key_set.get_key_data(version.version_number).await?;
            let verified = match metadata.kind {
                KeyKind::Symmetric => hmac_verify(metadata.digest, &key_data, data, signature),
                KeyKind::Private | KeyKind::Public => {
                    rsa_pss_verify(metadata.digest, metadata.kind, &key_data, data, signature)
                }
            };
            key_data.zeroize();
            if verified? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn hmac_sign(digest: DigestAlg, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    use hmac::{Hmac, Mac};
    macro_rules! sign {
        ($hash:ty) => {{
            let mut mac = <Hmac<$hash>>::new_from_slice(key)
                .map_err(|e| StrataError::Crypto(e.to_string()))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }
    match digest {
        DigestAlg::Sha256 => sign!(Sha256),
        DigestAlg::Sha384 => sign!(Sha384),
        DigestAlg::Sha512 => sign!(Sha512),
    }
}

fn hmac_verify(digest: DigestAlg, key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
    use hmac::{Hmac, Mac};
    macro_rules! verify {
        ($hash:ty) => {{
            let mut mac = <Hmac<$hash>>::new_from_slice(key)
                .map_err(|e| StrataError::Crypto(e.to_string()))?;
            mac.update(data);
            Ok(mac.verify_slice(signature).is_ok())
        }};
    }
    match digest {
        DigestAlg::Sha256 => verify!(Sha256),
        DigestAlg::Sha384 => verify!(Sha384),
        DigestAlg::Sha512 => verify!(Sha512),
    }
}

fn rsa_pss_sign(digest: DigestAlg, key_der: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let private = RsaPrivateKey::from_pkcs8_der(key_der)
        .map_err(|e| StrataError::Crypto(format!("invalid RSA private key: {e}")))?;
    let mut rng = rand::rngs::OsRng;
    macro_rules! sign {
        ($hash:ty) => {{
            let signing_key = rsa::pss::SigningKey::<$hash>::new(private);
            let signature = signing_key.sign_with_rng(&mut rng, data);
            Ok(signature.to_vec())
        }};
    }
    match digest {
        DigestAlg::Sha256 => sign!(Sha256),
        DigestAlg::Sha384 => sign!(Sha384),
        DigestAlg::Sha512 => sign!(Sha512),
    }
}

fn rsa_pss_verify(
    digest: DigestAlg,
    kind: KeyKind,
    key_data: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let public = match kind {
        KeyKind::Private => RsaPrivateKey::from_pkcs8_der(key_data)
            .map_err(|e| StrataError::Crypto(format!("invalid RSA private key: {e}")))?
            .to_public_key(),
        KeyKind::Public => RsaPublicKey::from_public_key_der(key_data)
            .map_err(|e| StrataError::Crypto(format!("invalid RSA public key: {e}")))?,
        KeyKind::Symmetric => {
            return Err(StrataError::InvalidKeyState(
                "symmetric material is not an RSA key".into(),
            ))
        }
    };
    let signature = rsa::pss::Signature::try_from(signature)
        .map_err(|e| StrataError::Crypto(format!("invalid RSA-PSS signature: {e}")))?;
    macro_rules! verify {
        ($hash:ty) => {{
            let verifying_key = rsa::pss::VerifyingKey::<$hash>::new(public);
            Ok(verifying_key.verify(data, &signature).is_ok())
        }};
    }
    match digest {
        DigestAlg::Sha256 => verify!(Sha256),
        DigestAlg::Sha384 => verify!(Sha384),
        DigestAlg::Sha512 => verify!(Sha512),
    }
}
