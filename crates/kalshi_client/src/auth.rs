//! RSA-PSS authentication for the Kalshi API.
//!
//! Signature format: `RSA-PSS(SHA256, timestamp + method + path)` → base64.
//! The `path` must NOT include query parameters.

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};

use common::Error;

use crate::keystore::{Credential, KeyStore};

pub const HEADER_KEY: &str = "KALSHI-ACCESS-KEY";
pub const HEADER_TIMESTAMP: &str = "KALSHI-ACCESS-TIMESTAMP";
pub const HEADER_SIGNATURE: &str = "KALSHI-ACCESS-SIGNATURE";

/// Canonical signing message: `{timestamp}{METHOD}{path_without_query}`.
pub fn signing_message(timestamp_ms: &str, method: &str, path: &str) -> String {
    let path_clean = path.split('?').next().unwrap_or(path);
    format!("{}{}{}", timestamp_ms, method, path_clean)
}

/// Signs requests with the credential held by a key store.
#[derive(Debug, Clone)]
pub struct KalshiAuth {
    credential: Credential,
}

impl KalshiAuth {
    pub fn from_credential(credential: Credential) -> Self {
        Self { credential }
    }

    /// Create from raw API key and PEM-encoded private key string, without
    /// persisting anything.
    pub fn new(api_key: &str, pem_string: &str) -> Result<Self, Error> {
        Credential::from_pem(api_key, pem_string).map(Self::from_credential)
    }

    /// Use whatever the store holds; fails with `NoCredential` when empty.
    pub fn from_store(store: &dyn KeyStore) -> Result<Self, Error> {
        store
            .load()?
            .map(Self::from_credential)
            .ok_or(Error::NoCredential)
    }

    pub fn key_id(&self) -> &str {
        self.credential.key_id()
    }

    /// Base64 signature for one request.
    pub fn sign(&self, timestamp_ms: &str, method: &str, path: &str) -> String {
        let message = signing_message(timestamp_ms, method, path);
        let signature = self.credential.sign(message.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(signature)
    }

    /// Sign a request at the current time, returning `(timestamp_ms, base64_signature)`.
    pub fn sign_request(&self, method: &str, path: &str) -> (String, String) {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&timestamp, method, path);
        (timestamp, signature)
    }

    /// Build the three authentication headers.
    pub fn headers(&self, method: &str, path: &str) -> Result<HeaderMap, Error> {
        let (timestamp, signature) = self.sign_request(method, path);

        let value = |raw: &str, what: &str| {
            HeaderValue::from_str(raw).map_err(|e| Error::Auth(format!("invalid {what} header: {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_KEY, value(self.key_id(), "key id")?);
        headers.insert(HEADER_TIMESTAMP, value(&timestamp, "timestamp")?);
        headers.insert(HEADER_SIGNATURE, value(&signature, "signature")?);
        Ok(headers)
    }
}
