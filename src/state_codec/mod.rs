//! Signed, URL-safe encoding of OAuth flow state.
//!
//! The flow state travels through the identity provider as the `state` query
//! parameter and comes back on the callback. It is not secret, but it must not
//! be forgeable, so each token carries an HMAC-SHA256 tag over its payload.
//!
//! # Token format
//!
//! ```text
//! base64url(json(flow_state)) "." base64url(hmac_sha256(secret, first_part))
//! ```
//!
//! Both parts use the URL-safe alphabet without padding.

use crate::error::BridgeError;
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as B64URL},
    Engine,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Caller-supplied data round-tripped through the provider redirect.
pub type FlowState = serde_json::Map<String, serde_json::Value>;

/// Size of generated signing keys in bytes
const KEY_SIZE: usize = 32;

/// Minimum accepted size for configured signing keys
const MIN_KEY_SIZE: usize = 16;

/// Signs and verifies flow state tokens with a process-wide secret.
#[derive(Clone)]
pub struct StateCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCodec").finish_non_exhaustive()
    }
}

impl StateCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Build a codec from a base64-encoded secret (standard alphabet).
    ///
    /// The decoded key must be at least 16 bytes.
    pub fn from_base64(key_base64: &str) -> Result<Self, BridgeError> {
        let key = BASE64
            .decode(key_base64.trim())
            .map_err(|e| BridgeError::Config(format!("state secret is not valid base64: {}", e)))?;

        if key.len() < MIN_KEY_SIZE {
            return Err(BridgeError::Config(format!(
                "state secret must be at least {} bytes, got {}",
                MIN_KEY_SIZE,
                key.len()
            )));
        }

        Ok(Self::new(key))
    }

    /// Codec with a freshly generated key. Tokens it issues only verify in
    /// this process.
    pub fn random() -> Self {
        let key: [u8; KEY_SIZE] = rand::random();
        Self::new(key.to_vec())
    }

    pub fn encode(&self, data: &FlowState) -> String {
        let json = serde_json::Value::Object(data.clone()).to_string();
        let payload = B64URL.encode(json);
        let signature = B64URL.encode(self.sign(payload.as_bytes()));
        format!("{}.{}", payload, signature)
    }

    pub fn decode(&self, token: &str) -> Result<FlowState, BridgeError> {
        let (payload, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| BridgeError::InvalidState("missing signature".to_string()))?;

        if payload.is_empty() || signature.is_empty() {
            return Err(BridgeError::InvalidState("empty payload or signature".to_string()));
        }

        let signature = B64URL
            .decode(signature)
            .map_err(|_| BridgeError::InvalidState("malformed signature".to_string()))?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| BridgeError::InvalidState("signature does not match".to_string()))?;

        let json = B64URL
            .decode(payload)
            .map_err(|_| BridgeError::InvalidState("malformed payload".to_string()))?;

        serde_json::from_slice::<FlowState>(&json)
            .map_err(|e| BridgeError::InvalidState(format!("payload is not a JSON object: {}", e)))
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length")
    }
}
