//! Local transaction action decoding
//!
//! Used when the chain data service cannot describe a transaction. Covers
//! native sends, ERC-20 `transfer`/`approve` and deployments; anything else
//! is reported as a contract call with its 4-byte selector.

use alloy::primitives::TxKind;
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::models::TxAction;

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

pub fn decode_local(tx: &TransactionRequest) -> TxAction {
    let input = tx.input.input().cloned().unwrap_or_default();
    let to = match tx.to {
        Some(TxKind::Call(to)) => to,
        Some(TxKind::Create) | None => return TxAction::Deploy,
    };

    if input.is_empty() {
        return TxAction::NativeSend {
            to,
            value: tx.value.unwrap_or_default(),
        };
    }

    if let Ok(call) = IERC20::transferCall::abi_decode(&input) {
        return TxAction::TokenTransfer {
            token: to,
            to: call.to,
            amount: call.amount,
        };
    }
    if let Ok(call) = IERC20::approveCall::abi_decode(&input) {
        return TxAction::TokenApprove {
            token: to,
            spender: call.spender,
            amount: call.amount,
        };
    }

    TxAction::ContractCall {
        contract: to,
        selector: input.get(..4).map(|s| format!("0x{}", hex::encode(s))),
        protocol: None,
    }
}
