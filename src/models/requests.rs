use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of the page that sent a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub origin: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPayload {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Envelope delivered by the content-script bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub data: RpcPayload,
    pub session: Session,
}

/// A single inbound dapp call, alive until its handler settles.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub session: Session,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>, session: Session) -> Self {
        Self {
            method: method.into(),
            params,
            session,
        }
    }

    /// The request payload as it was received, for error reporting.
    pub fn payload(&self) -> Value {
        serde_json::json!({
            "method": self.method,
            "params": self.params,
        })
    }
}

impl From<RpcEnvelope> for IncomingRequest {
    fn from(envelope: RpcEnvelope) -> Self {
        Self {
            method: envelope.data.method,
            params: envelope.data.params,
            session: envelope.session,
        }
    }
}

/// Answer to a pending approval prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    /// Required when approving an unlock prompt
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

/// Create a local keyring from a mnemonic or raw private keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocalKeyringRequest {
    pub password: String,
    #[serde(default)]
    pub mnemonic: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub private_keys: Vec<String>,
}

/// Optional explicit transaction for multisig confirm/exec; the staged one is used otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultisigActionRequest {
    #[serde(default)]
    pub transaction: Option<crate::models::MultisigTransaction>,
}
