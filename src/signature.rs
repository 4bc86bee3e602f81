//! HMAC-SHA256 webhook signature verification.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Header GitHub puts the payload signature in.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const SUPPORTED_ALGORITHM: &str = "sha256";

/// Checks a `sha256=<hex>` signature header against the raw request body.
///
/// The digest comparison runs in constant time (`Mac::verify_slice`), so a
/// forged signature learns nothing from how long the rejection takes.
pub fn verify_signature(
    secret: &str,
    signature_header: Option<&str>,
    payload: &[u8],
) -> Result<(), AuthError> {
    let header = signature_header.ok_or(AuthError::MissingHeader)?;
    if header.is_empty() {
        return Err(AuthError::EmptySignature);
    }

    let (algorithm, digest) = header.split_once('=').ok_or(AuthError::MalformedHeader)?;
    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let expected = hex::decode(digest).map_err(|_| AuthError::InvalidHex)?;

    // Hmac accepts keys of any length, including empty.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::DigestMismatch)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| AuthError::DigestMismatch)
}

/// Boolean form of [`verify_signature`].
pub fn verify(secret: &str, signature_header: Option<&str>, payload: &[u8]) -> bool {
    verify_signature(secret, signature_header, payload).is_ok()
}

/// Produces the header value a sender holding `secret` would attach.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(format!(
        "{}={}",
        SUPPORTED_ALGORITHM,
        hex::encode(mac.finalize().into_bytes())
    ))
}
