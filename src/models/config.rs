use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Per-chain settings used by the transaction pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub id: u64,
    pub rpc_url: Option<String>,
    /// Chain accepts `maxFeePerGas` / `maxPriorityFeePerGas`
    pub eip1559: bool,
}

/// Configuration for the transaction pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chains: HashMap<u64, ChainConfig>,
    /// The network's primary chain gets the higher gas-cost threshold
    pub primary_chain_id: u64,
    /// USD threshold for the primary chain, as a decimal string
    pub gas_check_primary_usd: String,
    /// USD threshold for every other chain, as a decimal string
    pub gas_check_other_usd: String,
    /// Safety multiplier applied to simulated gas, as a decimal string
    pub gas_limit_ratio: String,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
    /// How long a failed or abandoned pending record stays queryable
    pub pending_record_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let chains = DEFAULT_EIP1559_CHAINS
            .iter()
            .map(|id| {
                (
                    *id,
                    ChainConfig {
                        id: *id,
                        rpc_url: None,
                        eip1559: true,
                    },
                )
            })
            .collect();
        Self {
            chains,
            primary_chain_id: 1,
            gas_check_primary_usd: "10".to_string(),
            gas_check_other_usd: "1".to_string(),
            gas_limit_ratio: "1.5".to_string(),
            receipt_poll_interval: Duration::from_secs(3),
            receipt_timeout: Duration::from_secs(600),
            pending_record_ttl: Duration::from_secs(600),
        }
    }
}

const DEFAULT_EIP1559_CHAINS: [u64; 5] = [1, 10, 137, 8453, 42161];

fn parse_chain_list(raw: &str) -> Result<Vec<u64>, String> {
    raw.split(',')
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>()
                .map_err(|e| format!("Invalid chain id '{id}': {e}"))
        })
        .collect()
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Chains are discovered from `CHAIN_RPC_<id>` variables plus the
    /// `EIP1559_CHAINS` list.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("EIP1559_CHAINS") {
            let eip1559 = parse_chain_list(&raw)?;
            config.chains.clear();
            for id in eip1559 {
                config.chains.insert(
                    id,
                    ChainConfig {
                        id,
                        rpc_url: None,
                        eip1559: true,
                    },
                );
            }
        }

        for (key, value) in env::vars() {
            let Some(id) = key.strip_prefix("CHAIN_RPC_") else {
                continue;
            };
            let id = id
                .parse::<u64>()
                .map_err(|e| format!("Invalid chain id in {key}: {e}"))?;
            config
                .chains
                .entry(id)
                .or_insert(ChainConfig {
                    id,
                    rpc_url: None,
                    eip1559: false,
                })
                .rpc_url = Some(value);
        }

        if let Ok(id) = env::var("PRIMARY_CHAIN_ID") {
            config.primary_chain_id = id
                .parse()
                .map_err(|e| format!("Invalid PRIMARY_CHAIN_ID '{id}': {e}"))?;
        }
        if let Ok(usd) = env::var("GAS_CHECK_PRIMARY_USD") {
            config.gas_check_primary_usd = usd;
        }
        if let Ok(usd) = env::var("GAS_CHECK_OTHER_USD") {
            config.gas_check_other_usd = usd;
        }
        if let Ok(ratio) = env::var("GAS_LIMIT_RATIO") {
            config.gas_limit_ratio = ratio;
        }
        if let Ok(secs) = env::var("PENDING_RECORD_TTL_SECS") {
            config.pending_record_ttl = Duration::from_secs(
                secs.parse()
                    .map_err(|e| format!("Invalid PENDING_RECORD_TTL_SECS '{secs}': {e}"))?,
            );
        }

        Ok(config)
    }

    pub fn supports_eip1559(&self, chain_id: u64) -> bool {
        self.chains.get(&chain_id).is_some_and(|c| c.eip1559)
    }
}

/// Retry policy for opening a hardware transport
#[derive(Debug, Clone)]
pub struct HardwareConfig {
    pub bridge_url: String,
    pub init_attempts: u32,
    pub init_interval: Duration,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            bridge_url: "http://127.0.0.1:21325".to_string(),
            init_attempts: 5,
            init_interval: Duration::from_secs(1),
        }
    }
}

impl HardwareConfig {
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        if let Ok(url) = env::var("HARDWARE_BRIDGE_URL") {
            config.bridge_url = url;
        }
        if let Ok(attempts) = env::var("HARDWARE_INIT_ATTEMPTS") {
            config.init_attempts = attempts
                .parse()
                .map_err(|e| format!("Invalid HARDWARE_INIT_ATTEMPTS '{attempts}': {e}"))?;
        }
        if let Ok(ms) = env::var("HARDWARE_INIT_INTERVAL_MS") {
            config.init_interval = Duration::from_millis(
                ms.parse()
                    .map_err(|e| format!("Invalid HARDWARE_INIT_INTERVAL_MS '{ms}': {e}"))?,
            );
        }
        Ok(config)
    }
}

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub access_token: String,
    pub chain_id: u64,
    /// Descriptor store; in-memory when unset
    pub redis_url: Option<String>,
    pub chain_data_url: String,
    pub safe_service_url: String,
    pub pipeline: PipelineConfig,
    pub hardware: HardwareConfig,
}

impl GateConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let access_token = env::var("WALLET_GATE_ACCESS_TOKEN")
            .map_err(|_| "WALLET_GATE_ACCESS_TOKEN environment variable not set")?;

        let chain_id = match env::var("CHAIN_ID") {
            Ok(id) => id
                .parse::<u64>()
                .map_err(|e| format!("Invalid CHAIN_ID '{id}': {e}"))?,
            Err(_) => 1,
        };

        Ok(Self {
            access_token,
            chain_id,
            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            chain_data_url: env::var("CHAIN_DATA_URL")
                .unwrap_or_else(|_| "https://api.rabby.io".to_string()),
            safe_service_url: env::var("SAFE_SERVICE_URL")
                .unwrap_or_else(|_| "https://safe-transaction-mainnet.safe.global".to_string()),
            pipeline: PipelineConfig::from_env()?,
            hardware: HardwareConfig::from_env()?,
        })
    }
}
