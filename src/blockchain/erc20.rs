// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 call data encoding.

use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall,
};

use super::address::parse_address;
use crate::error::{PaymentsError, PaymentsResult};
use crate::numeric::{to_smallest_denomination, AmountValue};

// Define the ERC-20 interface using alloy's sol! macro
sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// `balanceOf(address)` selector.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// `transfer(address,uint256)` selector.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Call data for `balanceOf(wallet)`.
pub fn balance_of_call_data(wallet: &Address) -> Bytes {
    IERC20::balanceOfCall { account: *wallet }.abi_encode().into()
}

/// Call data for `transfer(to, amount * 10^decimals)`.
pub fn transfer_call_data(to: &str, amount: &AmountValue, decimals: u8) -> PaymentsResult<Bytes> {
    let to = parse_address(to)?;
    if amount.is_negative() {
        return Err(PaymentsError::invalid_parameter(format!("invalid amount: {amount}")));
    }
    let amount = token_units(amount, decimals)?;

    Ok(IERC20::transferCall { to, amount }.abi_encode().into())
}

/// Smallest-denomination amount as a 256-bit integer.
pub(crate) fn token_units(amount: &AmountValue, decimals: u8) -> PaymentsResult<U256> {
    to_smallest_denomination(amount, u32::from(decimals))
        .to_u256()
        .ok_or_else(|| {
            PaymentsError::invalid_parameter(format!(
                "amount {amount} is not representable with {decimals} decimals"
            ))
        })
}

/// Decode the return data of a `balanceOf` call. Empty output is zero.
pub fn decode_balance(output: &[u8]) -> PaymentsResult<U256> {
    if output.is_empty() {
        return Ok(U256::ZERO);
    }
    IERC20::balanceOfCall::abi_decode_returns(output)
        .map_err(|e| PaymentsError::rpc(format!("invalid balanceOf output: {e}")))
}
