//! Canonical query strings and HMAC-SHA512 signatures for VNPay.
//!
//! The gateway signs the percent-encoded query string, not the raw values,
//! so the encoding here must match the gateway byte for byte: form encoding
//! (space as `+`), keys sorted by their encoded bytes, empty values dropped.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha512;
use thiserror::Error;

/// Signature field carried by requests and callbacks.
pub const SECURE_HASH_FIELD: &str = "vnp_SecureHash";

/// Optional hash-algorithm field some callbacks carry next to the signature.
pub const SECURE_HASH_TYPE_FIELD: &str = "vnp_SecureHashType";

/// Flat parameter map exchanged with the gateway.
pub type Params = BTreeMap<String, String>;

/// Errors from signing.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Build the canonical query string for `params`.
///
/// Empty values are dropped. The result for an empty map is `""`.
#[must_use]
pub fn canonicalize(params: &Params) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (encode(key), encode(value)))
        .collect();

    // String ordering is byte-wise, which is what the gateway uses.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign a canonical string, returning the lowercase hex digest.
///
/// # Errors
///
/// Returns `SignatureError::InvalidKey` if the HMAC cannot be keyed.
pub fn sign(canonical: &str, secret: &str) -> Result<String, SignatureError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check the signature carried in `params`.
///
/// The signature and hash-type fields are removed before canonicalizing the
/// rest. Returns `false` if the signature is missing or does not match; the
/// caller learns nothing about which part failed.
#[must_use]
pub fn verify(params: &Params, secret: &str) -> bool {
    let mut params = params.clone();
    let Some(provided) = params.remove(SECURE_HASH_FIELD) else {
        return false;
    };
    params.remove(SECURE_HASH_TYPE_FIELD);

    let Ok(expected) = sign(&canonicalize(&params), secret) else {
        return false;
    };

    constant_time_compare(&expected, &provided.to_ascii_lowercase())
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "QX7RKM2ZP4VW9TLB8HNC3YDJ6FGS1AE0";

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn signed(pairs: &[(&str, &str)]) -> Params {
        let mut p = params(pairs);
        let hash = sign(&canonicalize(&p), SECRET).unwrap();
        p.insert(SECURE_HASH_FIELD.to_string(), hash);
        p
    }

    #[test]
    fn test_canonicalize_sorts_and_encodes() {
        let p = params(&[
            ("vnp_OrderInfo", "Thanh toan don hang 42"),
            ("vnp_Amount", "15000000"),
            ("vnp_Command", "pay"),
        ]);
        assert_eq!(
            canonicalize(&p),
            "vnp_Amount=15000000&vnp_Command=pay&vnp_OrderInfo=Thanh+toan+don+hang+42"
        );
    }

    #[test]
    fn test_canonicalize_drops_empty_values() {
        let p = params(&[("vnp_BankCode", ""), ("vnp_Locale", "vn")]);
        assert_eq!(canonicalize(&p), "vnp_Locale=vn");
    }

    #[test]
    fn test_canonicalize_empty_map() {
        assert_eq!(canonicalize(&Params::new()), "");
        // Signing the empty string is well defined.
        assert_eq!(sign("", SECRET).unwrap().len(), 128);
    }

    #[test]
    fn test_canonicalize_encodes_non_ascii_and_reserved() {
        let p = params(&[
            ("vnp_OrderInfo", "\u{1ED0}p l\u{01B0}ng & qu\u{00E0}"),
            ("vnp_ReturnUrl", "https://a.vn/r?x=1"),
        ]);
        assert_eq!(
            canonicalize(&p),
            "vnp_OrderInfo=%E1%BB%90p+l%C6%B0ng+%26+qu%C3%A0\
             &vnp_ReturnUrl=https%3A%2F%2Fa.vn%2Fr%3Fx%3D1"
        );
    }

    #[test]
    fn test_sort_uses_encoded_keys() {
        // '+' (0x2B) sorts before '_' (0x5F) once the space is encoded.
        let p = params(&[("a_b", "1"), ("a b", "2")]);
        assert_eq!(canonicalize(&p), "a+b=2&a_b=1");
    }

    #[test]
    fn test_sign_is_lowercase_hex_sha512() {
        let digest = sign("vnp_Amount=100", SECRET).unwrap();
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(digest, sign("vnp_Amount=100", SECRET).unwrap());
    }

    #[test]
    fn test_verify_accepts_valid_signature() {
        let mut p = signed(&[("vnp_TxnRef", "42_1700000000000"), ("vnp_ResponseCode", "00")]);
        assert!(verify(&p, SECRET));

        // The hash-type field is not part of the signed data.
        p.insert(SECURE_HASH_TYPE_FIELD.to_string(), "HmacSHA512".to_string());
        assert!(verify(&p, SECRET));
    }

    #[test]
    fn test_verify_accepts_uppercase_hex() {
        let mut p = signed(&[("vnp_TxnRef", "42_1")]);
        let upper = p[SECURE_HASH_FIELD].to_ascii_uppercase();
        p.insert(SECURE_HASH_FIELD.to_string(), upper);
        assert!(verify(&p, SECRET));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let p = signed(&[("vnp_Amount", "15000000"), ("vnp_ResponseCode", "00")]);

        let mut tampered = p.clone();
        tampered.insert("vnp_Amount".to_string(), "15000001".to_string());
        assert!(!verify(&tampered, SECRET));

        let mut tampered = p.clone();
        tampered.insert("vnp_ResponseCode".to_string(), "01".to_string());
        assert!(!verify(&tampered, SECRET));

        assert!(!verify(&p, "another-secret-value"));
    }

    #[test]
    fn test_verify_single_bit_flip_in_any_value() {
        let p = signed(&[("vnp_Amount", "15000000"), ("vnp_TxnRef", "7_1700000000000")]);
        for key in ["vnp_Amount", "vnp_TxnRef"] {
            let mut bytes = p[key].clone().into_bytes();
            bytes[0] ^= 0x01;
            let mut tampered = p.clone();
            tampered.insert(key.to_string(), String::from_utf8(bytes).unwrap());
            assert!(!verify(&tampered, SECRET), "flip in {key} not detected");
        }
    }

    #[test]
    fn test_verify_missing_signature() {
        assert!(!verify(&params(&[("vnp_Amount", "100")]), SECRET));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }
}
