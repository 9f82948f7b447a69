//! Webhook request signatures
//!
//! Dropbox signs each notification body with HMAC-SHA256 keyed by the app
//! secret and sends the hex digest in `X-Dropbox-Signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "X-Dropbox-Signature";

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &[u8], body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(mac)
}

/// Hex-encoded HMAC-SHA256 of `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    keyed(secret, body)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Checks a hex signature in constant time.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    keyed(secret, body).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}
