//! The envelope format.
//!
//! ```text
//! base64url(json(claims)) "." base64url(hmac_sha256(key, payload_segment))
//! ```
//!
//! Both segments use the URL-safe alphabet without padding, so a token is
//! safe in cookies and query strings as-is. The MAC covers the payload
//! segment's text exactly as sent, and is checked before the payload is
//! parsed: bytes an attacker controls never reach the JSON parser.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{CLAIMS_VERSION, EnvelopeError, SigningKey, TokenClaims, TokenError};

type HmacSha256 = Hmac<Sha256>;

fn mac(key: &SigningKey) -> Result<HmacSha256, hmac::digest::InvalidLength> {
    HmacSha256::new_from_slice(key.as_bytes())
}

/// Serializes and signs `claims`.
///
/// # Errors
/// [`TokenError::Encode`] if the claims can't be serialized.
pub fn seal(key: &SigningKey, claims: &TokenClaims) -> Result<String, TokenError> {
    let json = serde_json::to_vec(claims)?;
    let payload = URL_SAFE_NO_PAD.encode(json);

    let mut mac = mac(key).map_err(|_| TokenError::KeyTooShort {
        min: SigningKey::MIN_LEN,
        got: key.as_bytes().len(),
    })?;
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{payload}.{signature}"))
}

/// Verifies and parses a token. Does not check envelope expiry; the
/// bridge does that against its clock.
///
/// Checks run in order: shape, signature (constant time), claims,
/// version.
pub fn open(key: &SigningKey, token: &str) -> Result<TokenClaims, EnvelopeError> {
    let mut segments = token.split('.');
    let (Some(payload), Some(signature), None) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(EnvelopeError::Malformed("expected two segments"));
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| EnvelopeError::Malformed("signature is not base64url"))?;

    let mut mac = mac(key).map_err(|_| EnvelopeError::Signature)?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| EnvelopeError::Signature)?;

    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| EnvelopeError::Malformed("payload is not base64url"))?;
    let claims: TokenClaims = serde_json::from_slice(&json)
        .map_err(|e| EnvelopeError::Claims(e.to_string()))?;

    if claims.version != CLAIMS_VERSION {
        return Err(EnvelopeError::Version(claims.version));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use gatekeep_store::{Role, SessionId, UserId, VerificationStatus};

    use super::*;

    fn key() -> SigningKey {
        SigningKey::from_bytes(*b"0123456789abcdef0123456789abcdef").unwrap()
    }

    fn claims() -> TokenClaims {
        TokenClaims {
            version: CLAIMS_VERSION,
            session_id: SessionId::new("f".repeat(64)),
            user_id: UserId(9),
            role: Some(Role::Security),
            verification: Some(VerificationStatus::Verified),
            issued_at: 1_700_000_000,
            expires_at: 1_700_086_400,
        }
    }

    /// Signs an arbitrary payload, bypassing `TokenClaims`.
    fn seal_raw(key: &SigningKey, json: &str) -> String {
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mut m = mac(key).unwrap();
        m.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(m.finalize().into_bytes());
        format!("{payload}.{sig}")
    }

    #[test]
    fn test_seal_then_open_recovers_claims() {
        let token = seal(&key(), &claims()).unwrap();
        assert_eq!(open(&key(), &token).unwrap(), claims());
    }

    #[test]
    fn test_seal_output_is_url_safe() {
        let token = seal(&key(), &claims()).unwrap();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
    }

    #[test]
    fn test_open_wrong_key_is_signature_error() {
        let token = seal(&key(), &claims()).unwrap();
        let other = SigningKey::from_bytes(vec![1u8; 32]).unwrap();
        assert_eq!(open(&other, &token), Err(EnvelopeError::Signature));
    }

    #[test]
    fn test_open_segment_count_is_malformed() {
        for token in ["", "abc", "a.b.c", "..", "payload."] {
            let result = open(&key(), token);
            assert!(
                matches!(
                    result,
                    Err(EnvelopeError::Malformed(_) | EnvelopeError::Signature)
                ),
                "{token:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_open_swapped_payload_is_signature_error() {
        let a = seal(&key(), &claims()).unwrap();
        let mut other = claims();
        other.user_id = UserId(1);
        let b = seal(&key(), &other).unwrap();

        let (payload_b, _) = b.split_once('.').unwrap();
        let (_, sig_a) = a.split_once('.').unwrap();
        let forged = format!("{payload_b}.{sig_a}");

        assert_eq!(open(&key(), &forged), Err(EnvelopeError::Signature));
    }

    #[test]
    fn test_open_signed_unknown_version_rejected() {
        let json = r#"{"v":2,"sid":"aa","uid":1,"iat":0,"exp":10}"#;
        let token = seal_raw(&key(), json);
        assert_eq!(open(&key(), &token), Err(EnvelopeError::Version(2)));
    }

    #[test]
    fn test_open_signed_extra_field_rejected() {
        let json = r#"{"v":1,"sid":"aa","uid":1,"iat":0,"exp":10,"role":"admin","x":1}"#;
        let token = seal_raw(&key(), json);
        assert!(matches!(open(&key(), &token), Err(EnvelopeError::Claims(_))));
    }

    #[test]
    fn test_open_signed_garbage_payload_rejected() {
        let token = seal_raw(&key(), "not json");
        assert!(matches!(open(&key(), &token), Err(EnvelopeError::Claims(_))));
    }
}
