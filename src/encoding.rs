/// URL-safe unpadded base64, the text encoding every wire field in this
/// crate uses (key identifiers, session material, ciphertexts).
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{Result, StrataError};

pub fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn decode(text: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| StrataError::Serialization(format!("invalid base64: {e}")))
}
