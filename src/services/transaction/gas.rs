//! Gas limit recommendation and cost explanation
//!
//! Amounts are fixed-point `U256` scaled by 1e18. Decimal strings from config
//! and from the price feed are parsed with alloy's unit helpers, so nothing
//! passes through floating point.

use alloy::primitives::U256;
use alloy::primitives::utils::{format_units, parse_units};

use crate::error::WalletError;
use crate::models::{CostExplain, PipelineConfig};

/// Intrinsic gas of a plain transfer; no limit is ever recommended below it.
pub const MIN_GAS_LIMIT: u64 = 21_000;

const SCALE_DECIMALS: u8 = 18;

fn scale() -> U256 {
    U256::from(10u64).pow(U256::from(SCALE_DECIMALS))
}

/// Parse a non-negative decimal string into a 1e18-scaled integer.
pub fn parse_decimal(value: &str) -> Result<U256, WalletError> {
    let trimmed = value.trim();
    if trimmed.starts_with('-') {
        return Err(WalletError::InvalidParams(format!("negative amount '{value}'")));
    }
    parse_units(trimmed, SCALE_DECIMALS)
        .map(|units| units.get_absolute())
        .map_err(|e| WalletError::InvalidParams(format!("invalid decimal '{value}': {e}")))
}

/// Render a 1e18-scaled integer as a decimal string without trailing zeros.
pub fn format_decimal(value: U256) -> Result<String, WalletError> {
    let formatted = format_units(value, SCALE_DECIMALS)
        .map_err(|e| WalletError::DefaultFailed(format!("failed to format amount: {e}")))?;
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    Ok(trimmed.to_string())
}

/// `ceil(gas_used * ratio)`, floored at [`MIN_GAS_LIMIT`].
pub fn recommend_gas_limit(gas_used: u64, ratio: &str) -> Result<u64, WalletError> {
    let ratio = parse_decimal(ratio)?;
    let scaled = U256::from(gas_used) * ratio;
    let (quotient, remainder) = scaled.div_rem(scale());
    let limit = if remainder.is_zero() {
        quotient
    } else {
        quotient + U256::from(1)
    };
    let limit: u64 = limit
        .try_into()
        .map_err(|_| WalletError::DefaultFailed(format!("gas limit overflow for {gas_used}")))?;
    Ok(limit.max(MIN_GAS_LIMIT))
}

/// Cost of `gas_limit` units at `gas_price` wei, in native token and USD.
pub fn explain_cost(
    gas_price: U256,
    gas_limit: u64,
    native_price_usd: &str,
) -> Result<CostExplain, WalletError> {
    let wei = gas_price * U256::from(gas_limit);
    let usd_scaled = usd_value(wei, native_price_usd)?;
    Ok(CostExplain {
        gas_cost_wei: wei,
        gas_cost_native: format_decimal(wei)?,
        gas_cost_usd: format_decimal(usd_scaled)?,
        native_price_usd: native_price_usd.to_string(),
    })
}

/// USD value (1e18-scaled) of `wei` at `native_price_usd` per whole token.
fn usd_value(wei: U256, native_price_usd: &str) -> Result<U256, WalletError> {
    let price = parse_decimal(native_price_usd)?;
    Ok(wei * price / scale())
}

/// Per-chain USD threshold above which a submission is refused.
pub fn usd_threshold(config: &PipelineConfig, chain_id: u64) -> &str {
    if chain_id == config.primary_chain_id {
        &config.gas_check_primary_usd
    } else {
        &config.gas_check_other_usd
    }
}

/// Whether a decimal USD cost is strictly above a decimal threshold.
pub fn exceeds_threshold(cost_usd: &str, threshold_usd: &str) -> Result<bool, WalletError> {
    Ok(parse_decimal(cost_usd)? > parse_decimal(threshold_usd)?)
}
