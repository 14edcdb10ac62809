//! Agent webhook signature verification
//!
//! `X-Signature` carries `HMAC_SHA256(secret, raw_body)` as lowercase hex.
//! Verification is constant-time; requests with a missing or incorrect
//! signature are rejected with 401 and produce no side effects.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the expected lowercase-hex digest for a body.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a presented signature against the body.
pub fn verify(secret: &str, body: &[u8], presented: &str) -> bool {
    let Ok(presented_bytes) = hex::decode(presented.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(presented_bytes.as_slice()).into()
}
