use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Family of signer backend a descriptor instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyringType {
    #[serde(rename = "Local")]
    Local,
    #[serde(rename = "HardwareTransport")]
    HardwareTransport,
    #[serde(rename = "MultisigCoordinator")]
    MultisigCoordinator,
}

impl KeyringType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyringType::Local => "Local",
            KeyringType::HardwareTransport => "HardwareTransport",
            KeyringType::MultisigCoordinator => "MultisigCoordinator",
        }
    }
}

/// Persisted form of a signer backend: `{type, options}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyringDescriptor {
    #[serde(rename = "type")]
    pub keyring_type: KeyringType,
    #[serde(default)]
    pub options: Value,
}

impl KeyringDescriptor {
    pub fn new(keyring_type: KeyringType, options: Value) -> Self {
        Self {
            keyring_type,
            options,
        }
    }
}

/// An account and the backend family that can sign for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    pub brand_name: String,
    pub keyring_type: KeyringType,
}

/// Redis key generator with configurable prefix for test isolation
#[derive(Debug, Clone)]
pub struct PrefixedStoreKeys {
    prefix: String,
}

impl PrefixedStoreKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Set of all persisted keyring ids
    pub fn keyring_ids(&self) -> String {
        format!("{}keyrings", self.prefix)
    }

    /// Descriptor JSON for one keyring: keyring:{id}
    pub fn keyring(&self, id: &str) -> String {
        format!("{}keyring:{id}", self.prefix)
    }
}

impl Default for PrefixedStoreKeys {
    fn default() -> Self {
        Self::new("wallet-gate:")
    }
}
