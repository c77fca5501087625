pub mod app_state;
pub mod config;
pub mod keyring;
pub mod multisig;
pub mod requests;
pub mod responses;
pub mod transaction;

pub use app_state::AppState;
pub use config::{ChainConfig, GateConfig, HardwareConfig, PipelineConfig};
pub use keyring::{Account, KeyringDescriptor, KeyringType, PrefixedStoreKeys};
pub use multisig::{MultisigTransaction, SafeConfirmation, SafeInfo, SafeTxData};
pub use requests::{
    ApprovalDecision, CreateLocalKeyringRequest, IncomingRequest, MultisigActionRequest, RpcEnvelope,
    RpcPayload, Session, UnlockRequest,
};
pub use responses::{ApiResponse, RpcErrorBody, RpcResponse, ServiceSummary};
pub use transaction::{
    CostExplain, GasCost, GasLevel, GasPlan, PendingTransaction, PreExecResult, ReceiptSummary,
    SubmitOptions, SubmitResult, TxAction, TxStatus,
};
