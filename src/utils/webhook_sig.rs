use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("webhook secret is not valid base64")]
    BadSecret,
    #[error("signature header is malformed")]
    BadHeader,
    #[error("no signature matched")]
    Mismatch,
}

/// Verifies a Svix-style webhook signature. The signed content is
/// `{msg_id}.{timestamp}.{payload}`; the header carries one or more
/// space-separated `v1,<base64>` entries and any of them may match.
pub fn verify_webhook_signature(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    payload: &[u8],
    signature_header: &str,
) -> Result<(), SignatureError> {
    let key = BASE64
        .decode(secret.trim_start_matches("whsec_"))
        .map_err(|_| SignatureError::BadSecret)?;

    let expected = sign(&key, msg_id, timestamp, payload);

    for entry in signature_header.split(' ') {
        let Some((version, sig)) = entry.split_once(',') else {
            continue;
        };
        if version != "v1" {
            continue;
        }
        let Ok(candidate) = BASE64.decode(sig) else {
            return Err(SignatureError::BadHeader);
        };
        if candidate.ct_eq(&expected).into() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

fn sign(key: &[u8], msg_id: &str, timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Produces a header value the verifier accepts. Test-side counterpart of
/// `verify_webhook_signature`.
pub fn sign_webhook(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    payload: &[u8],
) -> Result<String, SignatureError> {
    let key = BASE64
        .decode(secret.trim_start_matches("whsec_"))
        .map_err(|_| SignatureError::BadSecret)?;
    Ok(format!(
        "v1,{}",
        BASE64.encode(sign(&key, msg_id, timestamp, payload))
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

    #[test]
    fn accepts_a_signature_it_produced() {
        let payload = br#"{"type":"user.created"}"#;
        let header = sign_webhook(SECRET, "msg_1", "1700000000", payload).unwrap();
        verify_webhook_signature(SECRET, "msg_1", "1700000000", payload, &header).unwrap();
    }

    #[test]
    fn accepts_any_matching_entry_among_several() {
        let payload = b"{}";
        let good = sign_webhook(SECRET, "msg_1", "1700000000", payload).unwrap();
        let header = format!("v1,AAAA {good}");
        verify_webhook_signature(SECRET, "msg_1", "1700000000", payload, &header).unwrap();
    }

    #[test]
    fn rejects_tampered_payload() {
        let header = sign_webhook(SECRET, "msg_1", "1700000000", b"{}").unwrap();
        let err =
            verify_webhook_signature(SECRET, "msg_1", "1700000000", b"{ }", &header).unwrap_err();
        assert!(matches!(err, SignatureError::Mismatch));
    }

    #[test]
    fn rejects_signature_from_another_message_id() {
        let header = sign_webhook(SECRET, "msg_1", "1700000000", b"{}").unwrap();
        let err =
            verify_webhook_signature(SECRET, "msg_2", "1700000000", b"{}", &header).unwrap_err();
        assert!(matches!(err, SignatureError::Mismatch));
    }

    #[test]
    fn rejects_non_base64_secret() {
        let err = verify_webhook_signature("whsec_!!!", "m", "t", b"{}", "v1,AAAA").unwrap_err();
        assert!(matches!(err, SignatureError::BadSecret));
    }
}
