//! Body-embedded asymmetric verification strategy.
//!
//! The payload is a JSON document carrying a `data` field and a
//! base64-encoded `signature` field. The signed byte sequence is the
//! canonical JSON serialization of `data` (recursively key-sorted, no
//! whitespace); the signature is RSA PKCS#1 v1.5 over a SHA-256 digest of
//! those bytes, checked against the source's known public key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::context::{AuthOutcome, WebhookRequest};
use crate::error::WebhookAuthError;
use crate::verifier::WebhookVerifier;

/// Payload field holding the signed data document.
const DATA_FIELD: &str = "data";
/// Payload field holding the base64 signature.
const SIGNATURE_FIELD: &str = "signature";

/// Serialize a JSON value canonically: object keys sorted, no whitespace.
///
/// This is the byte sequence the external signer is expected to have signed;
/// both sides must agree on it exactly.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serializes"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).expect("scalar serializes"));
        }
    }
}

/// Verifies a signature embedded in the payload body against the source's
/// public key.
pub struct SignedBodyVerifier {
    verifying_key: Option<VerifyingKey<Sha256>>,
}

impl SignedBodyVerifier {
    /// Create a verifier with an already-resolved public key. `None` means
    /// the environment provided no key for this source.
    pub fn new(public_key: Option<RsaPublicKey>) -> Self {
        Self {
            verifying_key: public_key.map(VerifyingKey::new),
        }
    }

    /// Create a verifier from a PEM-encoded (SPKI) public key. An unparsable
    /// key is a deployment error, not an authentication outcome.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, WebhookAuthError> {
        let key = RsaPublicKey::from_public_key_pem(pem).map_err(|e| {
            WebhookAuthError::InvalidPublicKey {
                message: e.to_string(),
            }
        })?;
        Ok(Self::new(Some(key)))
    }

    fn extract_parts(payload: &[u8]) -> Option<(Value, Vec<u8>)> {
        let document: Value = serde_json::from_slice(payload).ok()?;
        let object = document.as_object()?;
        let data = object.get(DATA_FIELD)?.clone();
        let signature_b64 = object.get(SIGNATURE_FIELD)?.as_str()?;
        let signature = BASE64.decode(signature_b64).ok()?;
        Some((data, signature))
    }
}

impl WebhookVerifier for SignedBodyVerifier {
    fn verify(&self, request: &WebhookRequest<'_>) -> AuthOutcome {
        let Some(verifying_key) = &self.verifying_key else {
            return AuthOutcome::SecretNotConfigured;
        };

        let Some((data, signature_bytes)) = Self::extract_parts(request.payload) else {
            return AuthOutcome::MalformedPayload;
        };

        let Ok(signature) = Signature::try_from(signature_bytes.as_slice()) else {
            debug!("signature field is not a valid RSA signature");
            return AuthOutcome::InvalidSignature;
        };

        let signed_bytes = canonical_json(&data);
        if verifying_key
            .verify(signed_bytes.as_bytes(), &signature)
            .is_ok()
        {
            AuthOutcome::Success
        } else {
            AuthOutcome::InvalidSignature
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::RsaPrivateKey;
    use serde_json::json;

    fn key_pair() -> (SigningKey<Sha256>, RsaPublicKey) {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = private.to_public_key();
        (SigningKey::new(private), public)
    }

    fn signed_payload(signing_key: &SigningKey<Sha256>, data: &Value) -> Vec<u8> {
        let signature = signing_key.sign(canonical_json(data).as_bytes());
        serde_json::to_vec(&json!({
            "data": data,
            "signature": BASE64.encode(signature.to_bytes()),
        }))
        .unwrap()
    }

    fn request(payload: &[u8]) -> WebhookRequest<'_> {
        WebhookRequest {
            payload,
            signature_header: None,
            url_token: None,
        }
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": [1, 2], "y": "s"}});
        assert_eq!(canonical_json(&value), r#"{"a":{"y":"s","z":[1,2]},"b":1}"#);
    }

    #[test]
    fn signed_document_verifies() {
        let (signing_key, public) = key_pair();
        let verifier = SignedBodyVerifier::new(Some(public));
        let payload = signed_payload(&signing_key, &json!({"record_id": 7, "name": "A"}));
        assert_eq!(verifier.verify(&request(&payload)), AuthOutcome::Success);
    }

    #[test]
    fn key_order_in_payload_does_not_matter() {
        let (signing_key, public) = key_pair();
        let verifier = SignedBodyVerifier::new(Some(public));

        // Sign with one key order, deliver the data object with another.
        let data = json!({"name": "A", "record_id": 7});
        let signature = signing_key.sign(canonical_json(&data).as_bytes());
        let payload = serde_json::to_vec(&json!({
            "data": {"record_id": 7, "name": "A"},
            "signature": BASE64.encode(signature.to_bytes()),
        }))
        .unwrap();

        assert_eq!(verifier.verify(&request(&payload)), AuthOutcome::Success);
    }

    #[test]
    fn tampered_data_is_rejected() {
        let (signing_key, public) = key_pair();
        let verifier = SignedBodyVerifier::new(Some(public));

        let signature = signing_key.sign(canonical_json(&json!({"record_id": 7})).as_bytes());
        let payload = serde_json::to_vec(&json!({
            "data": {"record_id": 8},
            "signature": BASE64.encode(signature.to_bytes()),
        }))
        .unwrap();

        assert_eq!(
            verifier.verify(&request(&payload)),
            AuthOutcome::InvalidSignature
        );
    }

    #[test]
    fn wrong_key_is_rejected() {
        let (signing_key, _) = key_pair();
        let (_, other_public) = key_pair();
        let verifier = SignedBodyVerifier::new(Some(other_public));
        let payload = signed_payload(&signing_key, &json!({"record_id": 7}));
        assert_eq!(
            verifier.verify(&request(&payload)),
            AuthOutcome::InvalidSignature
        );
    }

    #[test]
    fn missing_fields_are_malformed() {
        let (_, public) = key_pair();
        let verifier = SignedBodyVerifier::new(Some(public));

        for body in [
            &b"not json"[..],
            br#"{"signature": "YWJj"}"#,
            br#"{"data": {"x": 1}}"#,
            br#"{"data": {"x": 1}, "signature": "%%%not-base64%%%"}"#,
        ] {
            assert_eq!(
                verifier.verify(&request(body)),
                AuthOutcome::MalformedPayload,
                "payload: {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn missing_public_key_is_reported() {
        let verifier = SignedBodyVerifier::new(None);
        assert_eq!(
            verifier.verify(&request(br#"{"data": {}, "signature": "YWJj"}"#)),
            AuthOutcome::SecretNotConfigured
        );
    }
}
