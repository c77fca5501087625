use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WalletError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    pub data: Value,
}

impl From<&WalletError> for RpcErrorBody {
    fn from(err: &WalletError) -> Self {
        Self {
            code: err.rpc_code(),
            message: err.to_string(),
            data: err.rpc_data(),
        }
    }
}

/// Reply sent back over the channel: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn success(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(err: &WalletError) -> Self {
        Self {
            result: None,
            error: Some(RpcErrorBody::from(err)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub chain_id: String,
    pub keyrings: usize,
    pub unlocked: bool,
    pub methods: Vec<String>,
}

/// Envelope for the management routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
        }
    }
}
