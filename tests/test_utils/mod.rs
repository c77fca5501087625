//! Mock collaborators and a harness wiring them into real services.
#![allow(dead_code)]

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, Bytes, Signature, U256, address, keccak256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wallet_gate::WalletError;
use wallet_gate::models::{
    GasLevel, GateConfig, HardwareConfig, MultisigTransaction, PipelineConfig, PreExecResult, ReceiptSummary,
    SafeConfirmation, SafeInfo, Session, TxAction,
};
use wallet_gate::services::events::EventBus;
use wallet_gate::services::gate::{ApprovalUi, ConnectedSites, MethodHandlers, RequestGate};
use wallet_gate::services::keyring::{
    FederationService, HardwareTransport, KeyringRegistry, MemoryDescriptorStore, TransportFactory,
};
use wallet_gate::services::transaction::{ChainDataService, ChainRpc, TransactionPipeline};

// Anvil's deterministic development accounts
pub const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_1: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const KEY_2: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
pub const ADDRESS_0: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const ADDRESS_1: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
pub const ADDRESS_2: Address = address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");
pub const SAFE: Address = address!("0x5afe5afe5afe5afe5afe5afe5afe5afe5afe5afe");
pub const RECIPIENT: Address = address!("0x1111111111111111111111111111111111111111");
pub const PASSWORD: &str = "correct horse battery staple";
pub const ORIGIN: &str = "https://dapp.example";

pub fn signer(key: &str) -> PrivateKeySigner {
    key.parse().unwrap()
}

pub fn session() -> Session {
    Session {
        origin: ORIGIN.to_string(),
        name: "Example Dapp".to_string(),
        icon: "https://dapp.example/icon.png".to_string(),
    }
}

pub const GWEI: u64 = 1_000_000_000;

pub fn send_tx(from: Address) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(RECIPIENT)
        .with_value(U256::from(1_000_000_000_000_000u64))
}

pub fn fast_hardware_config(attempts: u32) -> HardwareConfig {
    HardwareConfig {
        bridge_url: "http://127.0.0.1:0".to_string(),
        init_attempts: attempts,
        init_interval: Duration::from_millis(1),
    }
}

pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        receipt_poll_interval: Duration::from_millis(5),
        receipt_timeout: Duration::from_secs(2),
        pending_record_ttl: Duration::from_secs(60),
        ..PipelineConfig::default()
    }
}

/// UI that answers every prompt from fixed flags and records what it was asked.
pub struct MockUi {
    pub approve_unlock: bool,
    pub approve_connect: bool,
    pub approve_sign: bool,
    /// Unlocked with [`PASSWORD`] when an unlock prompt is approved
    pub registry: Mutex<Option<Arc<KeyringRegistry>>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockUi {
    pub fn approving() -> Self {
        Self {
            approve_unlock: true,
            approve_connect: true,
            approve_sign: true,
            registry: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_sign() -> Self {
        Self {
            approve_sign: false,
            ..Self::approving()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, call: String, approved: bool) -> Result<(), WalletError> {
        self.calls.lock().unwrap().push(call.clone());
        if approved {
            Ok(())
        } else {
            Err(WalletError::UserRejected(format!("{call} rejected")))
        }
    }
}

#[async_trait]
impl ApprovalUi for MockUi {
    async fn request_unlock(&self, _session: &Session) -> Result<(), WalletError> {
        self.answer("unlock".to_string(), self.approve_unlock)?;
        let registry = self.registry.lock().unwrap().clone();
        if let Some(registry) = registry {
            registry.unlock(PASSWORD)?;
        }
        Ok(())
    }

    async fn request_connect(&self, _session: &Session) -> Result<(), WalletError> {
        self.answer("connect".to_string(), self.approve_connect)
    }

    async fn request_sign(&self, _session: &Session, method: &str, _params: &[Value]) -> Result<(), WalletError> {
        self.answer(format!("sign:{method}"), self.approve_sign)
    }
}

pub struct MockChainData {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_used: u64,
    pub native_price: String,
    pub pre_exec_fails: bool,
    pub nonce_calls: AtomicU32,
}

impl Default for MockChainData {
    fn default() -> Self {
        Self {
            nonce: 7,
            gas_price: U256::from(GWEI),
            gas_used: 21_000,
            native_price: "3000".to_string(),
            pre_exec_fails: false,
            nonce_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ChainDataService for MockChainData {
    async fn recommend_nonce(&self, _chain_id: u64, _from: Address) -> Result<u64, WalletError> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce)
    }

    async fn gas_market(&self, _chain_id: u64) -> Result<Vec<GasLevel>, WalletError> {
        Ok(vec![
            GasLevel {
                level: "slow".to_string(),
                price: self.gas_price / U256::from(2),
                priority_price: None,
                base_fee: None,
            },
            GasLevel {
                level: "normal".to_string(),
                price: self.gas_price,
                priority_price: Some(self.gas_price / U256::from(10)),
                base_fee: None,
            },
        ])
    }

    async fn pre_exec(
        &self,
        _chain_id: u64,
        _tx: &TransactionRequest,
        _pending: &[TransactionRequest],
    ) -> Result<PreExecResult, WalletError> {
        if self.pre_exec_fails {
            return Err(WalletError::ChainData("simulator offline".to_string()));
        }
        Ok(PreExecResult {
            success: true,
            gas_used: self.gas_used,
            error: None,
            balance_change: Value::Null,
        })
    }

    async fn native_price_usd(&self, _chain_id: u64) -> Result<String, WalletError> {
        Ok(self.native_price.clone())
    }

    async fn parse_action(&self, _chain_id: u64, _tx: &TransactionRequest) -> Result<TxAction, WalletError> {
        Err(WalletError::ChainData("parser offline".to_string()))
    }

    async fn contract_protocol(&self, _chain_id: u64, _contract: Address) -> Result<Option<String>, WalletError> {
        Ok(None)
    }
}

/// Node that accepts every broadcast and mines it on the next receipt poll.
#[derive(Default)]
pub struct MockRpc {
    pub sent: Mutex<Vec<Bytes>>,
    pub reject_with: Mutex<Option<String>>,
    pub withhold_receipts: AtomicBool,
}

impl MockRpc {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn send_raw_transaction(&self, _chain_id: u64, raw: &Bytes) -> Result<B256, WalletError> {
        if let Some(message) = self.reject_with.lock().unwrap().clone() {
            return Err(WalletError::SubmitTxFailed(message));
        }
        self.sent.lock().unwrap().push(raw.clone());
        Ok(keccak256(raw))
    }

    async fn get_receipt(&self, _chain_id: u64, hash: B256) -> Result<Option<ReceiptSummary>, WalletError> {
        if self.withhold_receipts.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(ReceiptSummary {
            tx_hash: hash,
            gas_used: 21_000,
            effective_gas_price: GWEI as u128,
            success: true,
        }))
    }
}

/// In-memory Safe transaction service.
pub struct MockFederation {
    pub info: SafeInfo,
    pub proposals: Mutex<Vec<MultisigTransaction>>,
    pub confirmations: Mutex<HashMap<B256, Vec<SafeConfirmation>>>,
    pub executed: Mutex<Vec<B256>>,
}

impl MockFederation {
    /// Safe owned by the first three anvil accounts, 2-of-3.
    pub fn two_of_three() -> Self {
        Self {
            info: SafeInfo {
                address: SAFE,
                nonce: 4,
                threshold: 2,
                owners: vec![ADDRESS_0, ADDRESS_1, ADDRESS_2],
                version: "1.3.0".to_string(),
            },
            proposals: Mutex::new(Vec::new()),
            confirmations: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn push_confirmation(&self, hash: B256, owner: Address, signature: Bytes) {
        self.confirmations
            .lock()
            .unwrap()
            .entry(hash)
            .or_default()
            .push(SafeConfirmation { owner, signature });
    }
}

#[async_trait]
impl FederationService for MockFederation {
    async fn get_safe_info(&self, _safe: Address, _network_id: u64) -> Result<SafeInfo, WalletError> {
        Ok(self.info.clone())
    }

    async fn post_transaction(
        &self,
        tx: &MultisigTransaction,
        sender: Address,
        signature: &Bytes,
    ) -> Result<(), WalletError> {
        self.proposals.lock().unwrap().push(tx.clone());
        self.push_confirmation(tx.hash, sender, signature.clone());
        Ok(())
    }

    async fn confirm_transaction(&self, tx: &MultisigTransaction, signature: &Bytes) -> Result<(), WalletError> {
        // the real service recovers the owner from the signature
        let sig = Signature::try_from(signature.as_ref())
            .map_err(|e| WalletError::Federation(e.to_string()))?;
        let owner = sig
            .recover_address_from_prehash(&tx.hash)
            .map_err(|e| WalletError::Federation(e.to_string()))?;
        self.push_confirmation(tx.hash, owner, signature.clone());
        Ok(())
    }

    async fn list_confirmations(&self, tx: &MultisigTransaction) -> Result<Vec<SafeConfirmation>, WalletError> {
        Ok(self
            .confirmations
            .lock()
            .unwrap()
            .get(&tx.hash)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_transaction(&self, tx: &MultisigTransaction) -> Result<B256, WalletError> {
        let onchain = keccak256(tx.hash);
        self.executed.lock().unwrap().push(tx.hash);
        Ok(onchain)
    }
}

/// Device that signs with a local key after failing a configurable number of opens.
pub struct MockTransport {
    key: PrivateKeySigner,
    pub failing_opens: AtomicU32,
    pub opens: AtomicU32,
    pub closes: AtomicU32,
    pub sign_calls: AtomicU32,
    /// Never answer sign requests, like a device waiting for a button press
    pub hang_signing: AtomicBool,
}

impl MockTransport {
    pub fn new(key: &str, failing_opens: u32) -> Self {
        Self {
            key: signer(key),
            failing_opens: AtomicU32::new(failing_opens),
            opens: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            sign_calls: AtomicU32::new(0),
            hang_signing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl HardwareTransport for MockTransport {
    async fn open(&self) -> Result<(), String> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_opens.store(remaining - 1, Ordering::SeqCst);
            return Err("device not found".to_string());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), String> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_digest(&self, _hd_path: &str, digest: B256) -> Result<Signature, String> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_signing.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.key.sign_hash_sync(&digest).map_err(|e| e.to_string())
    }
}

pub struct MockTransportFactory {
    pub transport: Arc<MockTransport>,
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, _brand: &str) -> Result<Arc<dyn HardwareTransport>, WalletError> {
        Ok(self.transport.clone())
    }
}

/// Real registry, pipeline and gate over mock collaborators.
pub struct Harness {
    pub bus: Arc<EventBus>,
    pub registry: Arc<KeyringRegistry>,
    pub pipeline: Arc<TransactionPipeline>,
    pub chain_data: Arc<MockChainData>,
    pub rpc: Arc<MockRpc>,
    pub federation: Arc<MockFederation>,
    pub transport: Arc<MockTransport>,
    pub permissions: Arc<ConnectedSites>,
    pub ui: Arc<MockUi>,
    pub gate: RequestGate,
}

pub struct HarnessOptions {
    pub chain_data: MockChainData,
    pub ui: MockUi,
    pub hardware: HardwareConfig,
    pub pipeline: PipelineConfig,
    pub failing_opens: u32,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            chain_data: MockChainData::default(),
            ui: MockUi::approving(),
            hardware: fast_hardware_config(3),
            pipeline: test_pipeline_config(),
            failing_opens: 0,
        }
    }
}

pub fn harness() -> Harness {
    harness_with(HarnessOptions::default())
}

pub fn harness_with(options: HarnessOptions) -> Harness {
    let bus = Arc::new(EventBus::new());
    let federation = Arc::new(MockFederation::two_of_three());
    let transport = Arc::new(MockTransport::new(KEY_2, options.failing_opens));
    let registry = Arc::new(KeyringRegistry::new(
        Arc::new(MemoryDescriptorStore::new()),
        bus.clone(),
        federation.clone(),
        Arc::new(MockTransportFactory {
            transport: transport.clone(),
        }),
        options.hardware,
    ));
    let chain_data = Arc::new(options.chain_data);
    let rpc = Arc::new(MockRpc::default());
    let pipeline = Arc::new(TransactionPipeline::new(
        options.pipeline,
        chain_data.clone(),
        rpc.clone(),
        registry.clone(),
        bus.clone(),
    ));
    let permissions = Arc::new(ConnectedSites::new());
    let ui = Arc::new(options.ui);
    *ui.registry.lock().unwrap() = Some(registry.clone());
    let handlers = MethodHandlers::new(1, registry.clone(), pipeline.clone(), permissions.clone());
    let gate = RequestGate::new(1, registry.clone(), permissions.clone(), ui.clone(), handlers);
    Harness {
        bus,
        registry,
        pipeline,
        chain_data,
        rpc,
        federation,
        transport,
        permissions,
        ui,
        gate,
    }
}

impl Harness {
    /// Local vault holding anvil account 0, sealed under [`PASSWORD`].
    pub async fn add_local(&self) -> String {
        let secret = wallet_gate::services::keyring::VaultSecret {
            private_keys: vec![KEY_0.to_string()],
            ..Default::default()
        };
        self.registry.create_local(&secret, PASSWORD).await.unwrap()
    }

    /// Hardware keyring for anvil account 2. Waits for the transport to open.
    pub async fn add_hardware(&self) -> String {
        let descriptor = wallet_gate::models::KeyringDescriptor::new(
            wallet_gate::models::KeyringType::HardwareTransport,
            serde_json::json!({
                "brand": "Ledger",
                "accounts": [{"address": ADDRESS_2.to_string(), "hdPath": "m/44'/60'/0'/0/2"}]
            }),
        );
        self.registry.add_keyring(descriptor).await.unwrap()
    }

    /// Coordinator for [`SAFE`] whose owner is the local account 0.
    pub async fn add_multisig(&self, network_ids: Vec<u64>) -> String {
        let descriptor = wallet_gate::models::KeyringDescriptor::new(
            wallet_gate::models::KeyringType::MultisigCoordinator,
            serde_json::json!({
                "owner": ADDRESS_0.to_string(),
                "accounts": [{"address": SAFE.to_string(), "networkIds": network_ids}]
            }),
        );
        self.registry.add_keyring(descriptor).await.unwrap()
    }
}

pub fn gate_config() -> GateConfig {
    GateConfig {
        access_token: "test_token".to_string(),
        chain_id: 1,
        redis_url: None,
        chain_data_url: "http://127.0.0.1:0".to_string(),
        safe_service_url: "http://127.0.0.1:0".to_string(),
        pipeline: test_pipeline_config(),
        hardware: fast_hardware_config(2),
    }
}
