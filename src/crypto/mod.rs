/// Cryptographic building blocks: AEAD sealing of payloads, the RSA
/// credential boundary, the envelope protocol composing the two, and
/// zeroizing wrappers for session keys.
pub mod aead;
pub mod credential;
pub mod envelope;
pub mod session;
