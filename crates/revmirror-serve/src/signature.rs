//! `X-Hub-Signature` handling: HMAC-SHA1 of the raw request body, hex encoded
//! behind a `sha1=` prefix.

use hmac::{Hmac, Mac};
use revmirror_core::Error;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_PREFIX: &str = "sha1=";

/// Check the header shape without touching the body.
pub fn split_signature(header: Option<&str>) -> Result<&str, Error> {
    header
        .and_then(|h| h.strip_prefix(SIGNATURE_PREFIX))
        .ok_or_else(|| Error::Auth("Wrong signature format".to_string()))
}

/// Verify `hex_sig` against the body. Comparison is constant time.
pub fn verify(secret: &[u8], body: &[u8], hex_sig: &str) -> Result<(), Error> {
    let invalid = || Error::Auth("Invalid signature".to_string());
    let expected = hex::decode(hex_sig.trim()).map_err(|_| invalid())?;
    let mut mac = HmacSha1::new_from_slice(secret).map_err(|_| invalid())?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| invalid())
}

/// Header value a sender with `secret` would attach to `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, Error> {
    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| Error::Config(format!("webhook secret: {e}")))?;
    mac.update(body);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}
