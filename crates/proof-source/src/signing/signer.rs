use crate::request::SignatureScheme;

const CERTIFICATE_VERIFY_PAD: [u8; 64] = [0x20; 64];
const SERVER_CERTIFICATE_VERIFY_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// Trait for producing handshake signatures with a locally held key.
///
/// Implementations are synchronous; signing is CPU-bound.
/// Wrap in [`BlockingBackend`](super::BlockingBackend) to use one from a
/// proof source.
pub trait ProofSigner: Send + Sync {
    /// Schemes this key can sign with, in no particular order.
    fn schemes(&self) -> &[SignatureScheme];

    /// Sign `message` with `scheme`. Returns the wire-encoded signature.
    fn sign(&self, scheme: SignatureScheme, message: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// DER SubjectPublicKeyInfo of the key.
    fn public_key_der(&self) -> anyhow::Result<Vec<u8>>;

    /// Key type identifier (e.g. "ecdsa-p256").
    fn name(&self) -> &str;
}

/// The bytes a server signs to bind its certificate to a transcript digest.
///
/// 64 spaces, the server CertificateVerify context string, a zero byte,
/// then the digest (RFC 8446 §4.4.3).
pub fn certificate_verify_message(transcript_digest: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(
        CERTIFICATE_VERIFY_PAD.len()
            + SERVER_CERTIFICATE_VERIFY_CONTEXT.len()
            + 1
            + transcript_digest.len(),
    );
    message.extend_from_slice(&CERTIFICATE_VERIFY_PAD);
    message.extend_from_slice(SERVER_CERTIFICATE_VERIFY_CONTEXT);
    message.push(0x00);
    message.extend_from_slice(transcript_digest);
    message
}
