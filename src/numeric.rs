// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Amount arithmetic
//!
//! Every monetary quantity (balances, amounts, fees, gas prices) is an
//! [`AmountValue`]: an arbitrary-precision decimal stored as a `BigInt`
//! mantissa and a base-10 scale. Denomination conversions only shift the
//! scale, so they are exact for any number of decimals.
//!
//! ## Parsing policy
//!
//! RPC endpoints legitimately return `""` or `"0x"` for zero, so the lenient
//! conversion ([`AmountValue::parse_lenient`], used by `From<&str>`) maps
//! empty, `0x` and non-numeric input to zero. Use `str::parse` when malformed
//! input must be rejected instead.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

use alloy::primitives::U256;
use num_bigint::{BigInt, Sign};
use num_traits::{Num, One, Signed, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PaymentsError, PaymentsResult};

/// Minimum number of fractional digits kept by inexact divisions before the
/// final rounding step.
const DIVISION_SCALE: u32 = 40;

/// Largest exponent accepted in scientific notation (`1e18`).
const MAX_EXPONENT: i64 = 4096;

/// Decimals of the native coin (wei -> ether).
pub const NATIVE_DECIMALS: u32 = 18;

fn pow10(exponent: u32) -> BigInt {
    BigInt::from(10u8).pow(exponent)
}

/// Arbitrary-precision decimal amount: `mantissa * 10^-scale`.
#[derive(Clone, Debug)]
pub struct AmountValue {
    mantissa: BigInt,
    scale: u32,
}

impl AmountValue {
    pub fn new(mantissa: BigInt, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    pub fn zero() -> Self {
        Self::new(BigInt::zero(), 0)
    }

    pub fn one() -> Self {
        Self::new(BigInt::one(), 0)
    }

    /// The unscaled integer.
    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    /// Number of fractional digits in the current representation.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa.is_negative()
    }

    /// Strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.mantissa.is_positive()
    }

    pub fn is_integer(&self) -> bool {
        self.normalized().scale == 0
    }

    /// Same value with trailing fractional zeros removed.
    pub fn normalized(&self) -> Self {
        if self.mantissa.is_zero() {
            return Self::zero();
        }
        let ten = BigInt::from(10u8);
        let mut mantissa = self.mantissa.clone();
        let mut scale = self.scale;
        while scale > 0 && (&mantissa % &ten).is_zero() {
            mantissa /= &ten;
            scale -= 1;
        }
        Self::new(mantissa, scale)
    }

    /// Multiplies by `10^places` without loss.
    pub fn shift_left(&self, places: u32) -> Self {
        if self.scale >= places {
            Self::new(self.mantissa.clone(), self.scale - places)
        } else {
            Self::new(&self.mantissa * pow10(places - self.scale), 0)
        }
    }

    /// Divides by `10^places` without loss.
    ///
    /// A result needing more than `u32::MAX` fractional digits is below the
    /// smallest representable step and becomes zero.
    pub fn shift_right(&self, places: u32) -> Self {
        match self.scale.checked_add(places) {
            Some(scale) => Self::new(self.mantissa.clone(), scale),
            None => Self::zero(),
        }
    }

    /// Rounds half away from zero to `decimals` fractional digits.
    pub fn round_half_up(&self, decimals: u32) -> Self {
        if self.scale <= decimals {
            return self.clone();
        }
        let divisor = pow10(self.scale - decimals);
        let mut quotient = &self.mantissa / &divisor;
        let remainder = &self.mantissa % &divisor;
        if remainder.abs() * BigInt::from(2u8) >= divisor {
            if self.mantissa.is_negative() {
                quotient -= BigInt::one();
            } else {
                quotient += BigInt::one();
            }
        }
        Self::new(quotient, decimals)
    }

    /// Division truncated to `scale` fractional digits. `None` on a zero divisor.
    pub fn checked_div(&self, rhs: &Self, scale: u32) -> Option<Self> {
        if rhs.mantissa.is_zero() {
            return None;
        }
        let numerator = &self.mantissa * pow10(scale + rhs.scale);
        let denominator = &rhs.mantissa * pow10(self.scale);
        Some(Self::new(numerator / denominator, scale))
    }

    /// The value as `U256` when it is a non-negative integer that fits.
    pub fn to_u256(&self) -> Option<U256> {
        let normalized = self.normalized();
        if normalized.scale != 0 || normalized.mantissa.is_negative() {
            return None;
        }
        let (_, bytes) = normalized.mantissa.to_bytes_be();
        U256::try_from_be_slice(&bytes)
    }

    /// Parses decimal (`-1.5`, `2e18`) or `0x` hex text, falling back to zero
    /// on empty or malformed input.
    pub fn parse_lenient(input: &str) -> Self {
        match parse_decimal(input) {
            Some(value) => value,
            None => {
                if !input.trim().is_empty() {
                    tracing::debug!(input, "Non-numeric amount treated as zero");
                }
                Self::zero()
            }
        }
    }

    fn aligned(&self, other: &Self) -> (BigInt, BigInt, u32) {
        match self.scale.cmp(&other.scale) {
            Ordering::Less => (
                &self.mantissa * pow10(other.scale - self.scale),
                other.mantissa.clone(),
                other.scale,
            ),
            Ordering::Greater => (
                self.mantissa.clone(),
                &other.mantissa * pow10(self.scale - other.scale),
                self.scale,
            ),
            Ordering::Equal => (self.mantissa.clone(), other.mantissa.clone(), self.scale),
        }
    }
}

fn parse_decimal(input: &str) -> Option<AmountValue> {
    let s = input.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() {
            return Some(AmountValue::zero());
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return BigInt::from_str_radix(hex, 16)
            .ok()
            .map(|mantissa| AmountValue::new(mantissa, 0));
    }

    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (number, exponent) = match body.find(['e', 'E']) {
        Some(index) => (&body[..index], body[index + 1..].parse::<i64>().ok()?),
        None => (body, 0),
    };
    if exponent.abs() > MAX_EXPONENT {
        return None;
    }
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(int_part) || !is_digits(frac_part) {
        return None;
    }

    let mut mantissa = BigInt::from_str(&format!("{int_part}{frac_part}")).ok()?;
    let mut scale = frac_part.len() as i64 - exponent;
    if scale < 0 {
        mantissa *= pow10(u32::try_from(-scale).ok()?);
        scale = 0;
    }
    if negative {
        mantissa = -mantissa;
    }
    Some(AmountValue::new(mantissa, u32::try_from(scale).ok()?))
}

impl Default for AmountValue {
    fn default() -> Self {
        Self::zero()
    }
}

impl FromStr for AmountValue {
    type Err = PaymentsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s)
            .ok_or_else(|| PaymentsError::invalid_parameter(format!("invalid amount: {s:?}")))
    }
}

impl fmt::Display for AmountValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.normalized();
        if value.scale == 0 {
            return write!(f, "{}", value.mantissa);
        }
        let divisor = pow10(value.scale);
        let magnitude = value.mantissa.abs();
        let whole = &magnitude / &divisor;
        let fraction = (&magnitude % &divisor).to_string();
        let padding = "0".repeat(value.scale as usize - fraction.len());
        let sign = if value.mantissa.is_negative() { "-" } else { "" };
        write!(f, "{sign}{whole}.{padding}{fraction}")
    }
}

impl PartialEq for AmountValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AmountValue {}

impl PartialOrd for AmountValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AmountValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right, _) = self.aligned(other);
        left.cmp(&right)
    }
}

impl Add for &AmountValue {
    type Output = AmountValue;

    fn add(self, rhs: Self) -> AmountValue {
        let (left, right, scale) = self.aligned(rhs);
        AmountValue::new(left + right, scale)
    }
}

impl Sub for &AmountValue {
    type Output = AmountValue;

    fn sub(self, rhs: Self) -> AmountValue {
        let (left, right, scale) = self.aligned(rhs);
        AmountValue::new(left - right, scale)
    }
}

impl Mul for &AmountValue {
    type Output = AmountValue;

    fn mul(self, rhs: Self) -> AmountValue {
        AmountValue::new(&self.mantissa * &rhs.mantissa, self.scale + rhs.scale)
    }
}

impl Add for AmountValue {
    type Output = AmountValue;

    fn add(self, rhs: Self) -> AmountValue {
        &self + &rhs
    }
}

impl Sub for AmountValue {
    type Output = AmountValue;

    fn sub(self, rhs: Self) -> AmountValue {
        &self - &rhs
    }
}

impl Mul for AmountValue {
    type Output = AmountValue;

    fn mul(self, rhs: Self) -> AmountValue {
        &self * &rhs
    }
}

impl Neg for AmountValue {
    type Output = AmountValue;

    fn neg(self) -> AmountValue {
        AmountValue::new(-self.mantissa, self.scale)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AmountValue {
                fn from(value: $ty) -> Self {
                    Self::new(BigInt::from(value), 0)
                }
            }
        )*
    };
}

impl_from_integer!(u8, u16, u32, u64, u128, i32, i64, i128);

impl From<BigInt> for AmountValue {
    fn from(value: BigInt) -> Self {
        Self::new(value, 0)
    }
}

impl From<U256> for AmountValue {
    fn from(value: U256) -> Self {
        Self::new(BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>()), 0)
    }
}

impl From<&str> for AmountValue {
    fn from(value: &str) -> Self {
        Self::parse_lenient(value)
    }
}

impl From<String> for AmountValue {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<&AmountValue> for AmountValue {
    fn from(value: &AmountValue) -> Self {
        value.clone()
    }
}

impl Serialize for AmountValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AmountValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// `value / 10^decimals`: smallest unit (wei) to main unit (ether).
pub fn to_main_denomination(value: impl Into<AmountValue>, decimals: u32) -> AmountValue {
    value.into().shift_right(decimals)
}

/// `value * 10^decimals`: main unit (ether) to smallest unit (wei).
pub fn to_smallest_denomination(value: impl Into<AmountValue>, decimals: u32) -> AmountValue {
    value.into().shift_left(decimals)
}

/// Rounds to the nearest `10^-decimals`, half away from zero.
pub fn to_precision(amount: impl Into<AmountValue>, decimals: u32) -> AmountValue {
    amount.into().round_half_up(decimals)
}

/// Converts `amount` with an exchange `rate`: divides when `invert` is set,
/// multiplies otherwise, then rounds to `decimals`. Dividing by a zero rate
/// yields zero.
pub fn to_unit(
    amount: impl Into<AmountValue>,
    rate: impl Into<AmountValue>,
    decimals: u32,
    invert: bool,
) -> AmountValue {
    let amount = amount.into();
    let rate = rate.into();
    let converted = if invert {
        match amount.checked_div(&rate, DIVISION_SCALE.max(decimals.saturating_add(20))) {
            Some(quotient) => quotient,
            None => return AmountValue::zero(),
        }
    } else {
        &amount * &rate
    };
    to_precision(converted, decimals)
}

/// `amount / total * 100` rounded to two decimals. A zero total yields zero.
pub fn to_percentage(amount: impl Into<AmountValue>, total: impl Into<AmountValue>) -> AmountValue {
    let amount = amount.into();
    match amount.checked_div(&total.into(), DIVISION_SCALE) {
        Some(ratio) => to_precision(&ratio * &AmountValue::from(100u8), 2),
        None => AmountValue::zero(),
    }
}

/// Transaction fee in ether for a gas limit and a gas price in wei.
pub fn to_tx_fee(gas_limit: impl Into<AmountValue>, gas_price: impl Into<AmountValue>) -> AmountValue {
    to_main_denomination(&gas_limit.into() * &gas_price.into(), NATIVE_DECIMALS)
}

/// `0x`-prefixed lowercase hex of a non-negative integral amount.
pub fn to_hex(value: impl Into<AmountValue>) -> PaymentsResult<String> {
    let value = value.into().normalized();
    if value.scale != 0 || value.is_negative() {
        return Err(PaymentsError::invalid_parameter(format!(
            "{value} is not a non-negative integer"
        )));
    }
    Ok(format!("0x{}", value.mantissa.to_str_radix(16)))
}

/// `0x`-prefixed lowercase hex of a `U256` quantity.
pub fn u256_to_hex(value: U256) -> String {
    format!("0x{value:x}")
}

/// Strictly decodes a `0x`-prefixed hex quantity.
pub fn parse_hex_quantity(raw: &str) -> PaymentsResult<U256> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| PaymentsError::invalid_parameter(format!("missing 0x prefix: {raw:?}")))?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| PaymentsError::invalid_parameter(format!("invalid hex quantity {raw:?}: {e}")))
}
