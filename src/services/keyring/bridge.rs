//! HTTP bridge to a locally running hardware-wallet daemon
//!
//! The bridge exposes three endpoints per device brand:
//!
//! - `POST {base}/{brand}/open`
//! - `POST {base}/{brand}/close`
//! - `POST {base}/{brand}/sign` with `{hdPath, digest}` returning `{r, s, v}`
//!
//! `r`, `s` and `v` come back as hex strings. `v` may be a recovery id
//! (`00`/`01`) or a legacy value (`1b`/`1c`).

use alloy::primitives::{B256, Signature, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::hardware::{HardwareTransport, TransportFactory};
use crate::error::WalletError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignDigestRequest<'a> {
    hd_path: &'a str,
    digest: String,
}

#[derive(Debug, Deserialize)]
struct SignDigestResponse {
    r: String,
    s: String,
    v: String,
}

pub struct BridgeTransport {
    client: reqwest::Client,
    base_url: String,
    brand: String,
}

impl BridgeTransport {
    pub fn new(client: reqwest::Client, base_url: &str, brand: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            brand: brand.to_lowercase(),
        }
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.brand, action)
    }

    async fn post_empty(&self, action: &str) -> Result<(), String> {
        let response = self
            .client
            .post(self.url(action))
            .send()
            .await
            .map_err(|e| format!("Bridge {action} request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("Bridge {action} returned {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl HardwareTransport for BridgeTransport {
    async fn open(&self) -> Result<(), String> {
        self.post_empty("open").await
    }

    async fn close(&self) -> Result<(), String> {
        self.post_empty("close").await
    }

    async fn sign_digest(&self, hd_path: &str, digest: B256) -> Result<Signature, String> {
        let payload_hex = hex::encode(digest.as_slice());
        tracing::debug!("Bridge sign request: path={}, digest={}", hd_path, payload_hex);

        let response = self
            .client
            .post(self.url("sign"))
            .json(&SignDigestRequest {
                hd_path,
                digest: payload_hex,
            })
            .send()
            .await
            .map_err(|e| format!("Bridge sign request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Bridge sign returned {}", response.status()));
        }

        let body: SignDigestResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid bridge sign response: {e}"))?;
        signature_from_parts(&body.r, &body.s, &body.v)
    }
}

/// Creates one [`BridgeTransport`] per device brand over a shared client.
pub struct BridgeTransportFactory {
    client: reqwest::Client,
    base_url: String,
}

impl BridgeTransportFactory {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

impl TransportFactory for BridgeTransportFactory {
    fn create(&self, brand: &str) -> Result<Arc<dyn HardwareTransport>, WalletError> {
        if brand.trim().is_empty() {
            return Err(WalletError::Keyring("Hardware brand must not be empty".to_string()));
        }
        Ok(Arc::new(BridgeTransport::new(
            self.client.clone(),
            &self.base_url,
            brand,
        )))
    }
}

/// Assemble a signature from hex r/s/v, accepting v in {0, 1, 27, 28}.
fn signature_from_parts(r: &str, s: &str, v: &str) -> Result<Signature, String> {
    let r = parse_hex_to_u256(r).map_err(|e| format!("Failed to parse signature r: {e}"))?;
    let s = parse_hex_to_u256(s).map_err(|e| format!("Failed to parse signature s: {e}"))?;
    let v_raw = parse_hex_to_u8(v).map_err(|e| format!("Failed to parse signature v: {e}"))?;

    let recovery_id = match v_raw {
        0 | 1 => v_raw,
        27 => 0,
        28 => 1,
        _ => {
            tracing::error!("Invalid signature v value from bridge: {}", v_raw);
            return Err(format!(
                "Invalid signature v value: {v_raw} (expected 0, 1, 27, or 28)"
            ));
        }
    };

    Ok(Signature::new(r, s, recovery_id != 0))
}

fn parse_hex_to_u256(hex_str: &str) -> Result<U256, String> {
    let clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    U256::from_str_radix(clean, 16).map_err(|e| format!("Invalid hex for U256: {e}"))
}

fn parse_hex_to_u8(hex_str: &str) -> Result<u8, String> {
    let clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    u8::from_str_radix(clean, 16).map_err(|e| format!("Invalid hex for u8: {e}"))
}
