pub mod action;
pub mod chain;
pub mod execution;
pub mod gas;
pub mod pipeline;
pub mod watcher;

pub use action::decode_local;
pub use chain::{AlloyChainRpc, ChainDataService, ChainRpc, HttpChainData};
pub use execution::{SenderLocks, is_nonce_error};
pub use pipeline::TransactionPipeline;
pub use watcher::ReceiptWatcher;
