//! # Signature Verification
//!
//! Razorpay signs two things with HMAC-SHA256, hex encoded:
//! - the client payment proof, over `order_id|payment_id` with the key secret
//! - webhook bodies, over the raw request bytes with the webhook secret
//!
//! Comparison is constant-time and never reports which part mismatched.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message`
pub fn compute_hmac_sha256(secret: &str, message: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature Razorpay hands the client after a successful payment
pub fn payment_signature(key_secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let message = format!("{}|{}", gateway_order_id, gateway_payment_id);
    compute_hmac_sha256(key_secret, message.as_bytes())
}

pub fn verify_payment_signature(
    key_secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    let expected = payment_signature(key_secret, gateway_order_id, gateway_payment_id);
    constant_time_compare(signature.trim(), &expected)
}

pub fn verify_webhook_signature(webhook_secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = compute_hmac_sha256(webhook_secret, payload);
    constant_time_compare(signature.trim(), &expected)
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let sig = compute_hmac_sha256("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_payment_signature_verifies() {
        let sig = payment_signature("key_secret", "order_G1", "pay_P1");
        assert_eq!(sig.len(), 64);
        assert!(verify_payment_signature("key_secret", "order_G1", "pay_P1", &sig));
        assert!(!verify_payment_signature("key_secret", "order_G2", "pay_P1", &sig));
        assert!(!verify_payment_signature("other_secret", "order_G1", "pay_P1", &sig));
    }

    #[test]
    fn test_tampered_webhook_body_fails() {
        let body = br#"{"event":"payment.captured","payload":{}}"#;
        let sig = compute_hmac_sha256("whsec", body);
        assert!(verify_webhook_signature("whsec", body, &sig));

        for i in 0..body.len() {
            let mut tampered = body.to_vec();
            tampered[i] ^= 0x01;
            assert!(!verify_webhook_signature("whsec", &tampered, &sig), "byte {}", i);
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
