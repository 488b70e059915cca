//! Request signing for the LINE Pay v3 API.
//!
//! Every outbound call carries an `X-LINE-Authorization` header holding
//! `base64(HMAC-SHA256(secret, secret ∥ path ∥ body ∥ nonce))`. The body
//! bytes fed in here must be the exact bytes sent on the wire.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the request signature for one outbound call.
///
/// `path` is the upstream resource path (e.g. `/v3/payments/request`), not the
/// full URL. Returns standard base64 with padding.
pub fn sign(secret: &[u8], path: &str, body: &[u8], nonce: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(secret);
    mac.update(path.as_bytes());
    mac.update(body);
    mac.update(nonce.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Check a signature against the inputs it should have been computed over.
///
/// The relay never receives signed requests itself; this exists for callers
/// and tests that need to confirm what went out. Comparison is constant-time.
pub fn verify(secret: &[u8], path: &str, body: &[u8], nonce: &str, signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(secret);
    mac.update(path.as_bytes());
    mac.update(body);
    mac.update(nonce.as_bytes());

    // Undecodable input is compared against zeros so the timing stays uniform
    let expected = base64::engine::general_purpose::STANDARD
        .decode(signature)
        .unwrap_or_else(|_| vec![0u8; 32]);

    mac.verify_slice(&expected).is_ok()
}
