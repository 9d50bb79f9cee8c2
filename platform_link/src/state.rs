use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::errors::ConnectError;
use crate::registry::Platform;

type HmacSha256 = Hmac<Sha256>;

/// The flow context carried through the provider's `state` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user_id: String,
    pub platform: Platform,
    pub issued_at: DateTime<Utc>,
}

impl AuthState {
    pub fn issue(user_id: &str, platform: Platform) -> Self {
        Self {
            user_id: user_id.to_string(),
            platform,
            issued_at: Utc::now(),
        }
    }
}

/// Signs and verifies the `state` parameter round-tripped through providers.
///
/// The payload is `userId:platform:issuedAtMillis`; the wire format is
/// `base64url(payload).base64url(hmacSha256(payload))`. The signature is
/// verified in constant time before any payload field is trusted, so a
/// crafted callback cannot bind a stolen authorization code to an arbitrary
/// user id.
pub struct StateSigner {
    secret: Vec<u8>,
}

impl StateSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    pub fn sign(&self, state: &AuthState) -> String {
        let payload = format!(
            "{}:{}:{}",
            state.user_id,
            state.platform.as_str(),
            state.issued_at.timestamp_millis()
        );
        let signature = self.mac(payload.as_bytes());
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    pub fn verify(&self, raw: &str) -> Result<AuthState, ConnectError> {
        let (payload_b64, signature_b64) = raw
            .split_once('.')
            .ok_or_else(|| invalid("state is not in payload.signature form"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| invalid("state payload is not valid base64url"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid("state signature is not valid base64url"))?;

        let expected = self.mac(&payload);
        if !bool::from(signature.as_slice().ct_eq(expected.as_slice())) {
            return Err(invalid("state signature mismatch"));
        }

        let payload =
            String::from_utf8(payload).map_err(|_| invalid("state payload is not UTF-8"))?;

        // Split from the right so a user id containing ':' stays intact.
        let mut parts = payload.rsplitn(3, ':');
        let millis = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| invalid("state timestamp is not numeric"))?;
        let platform = parts
            .next()
            .ok_or_else(|| invalid("state payload is missing platform"))?;
        let user_id = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("state payload is missing user id"))?;

        let platform = Platform::from_str(platform)
            .map_err(|_| invalid("state names an unknown platform"))?;
        let issued_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| invalid("state timestamp is out of range"))?;

        Ok(AuthState {
            user_id: user_id.to_string(),
            platform,
            issued_at,
        })
    }

    fn mac(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

fn invalid(msg: &str) -> ConnectError {
    ConnectError::InvalidCallback(msg.to_string())
}
