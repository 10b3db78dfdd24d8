//! Common utilities for Tally indexers.
//!
//! Conversions between the loosely-typed JSON a Substrate node emits for
//! event fields and the values stored by sinks.

use num_bigint::BigUint;
use serde_json::Value;

// ===== Accounts =====

/// Parse an account address, kept as the opaque string the chain reports.
///
/// Accepted shapes:
/// - address string: `"5Grw..."` or `"0x1234..."` (case preserved);
/// - wrapped object: `{ "Id": "..." }` / `{ "id": "..." }`;
/// - single-element array: `["..."]`;
/// - 32-byte array: `[b0, ..., b31]`, rendered as `0x`-prefixed hex.
pub fn parse_account(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Object(obj) => obj
            .get("Id")
            .or_else(|| obj.get("id"))
            .and_then(parse_account),
        Value::Array(arr) => {
            if arr.len() == 1 {
                return parse_account(&arr[0]);
            }
            if arr.len() != 32 {
                return None;
            }
            let mut bytes = [0u8; 32];
            for (i, v) in arr.iter().enumerate() {
                bytes[i] = u8::try_from(v.as_u64()?).ok()?;
            }
            Some(format!("0x{}", hex::encode(bytes)))
        }
        _ => None,
    }
}

// ===== Numbers =====

/// Parse a non-negative integer of any size.
///
/// Accepts JSON integers, decimal strings and `0x`-prefixed hex strings.
/// Negative numbers, floats, empty strings and signs are rejected.
pub fn parse_biguint(value: &Value) -> Option<BigUint> {
    match value {
        // Literal digits: no sign, fraction or exponent.
        Value::Number(n) => parse_decimal_str(&n.to_string()),
        Value::String(s) => parse_biguint_str(s.trim()),
        _ => None,
    }
}

fn parse_biguint_str(s: &str) -> Option<BigUint> {
    if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex_digits.is_empty() || !hex_digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return BigUint::parse_bytes(hex_digits.as_bytes(), 16);
    }
    parse_decimal_str(s)
}

fn parse_decimal_str(s: &str) -> Option<BigUint> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

// ===== Storage codecs =====

/// Decimal TEXT representation used for amount columns.
///
/// Lossless for any size.
pub fn biguint_to_text(value: &BigUint) -> String {
    value.to_str_radix(10)
}

/// Inverse of [`biguint_to_text`].
pub fn text_to_biguint(text: &str) -> anyhow::Result<BigUint> {
    parse_biguint_str(text).ok_or_else(|| anyhow::anyhow!("invalid decimal amount: {text:?}"))
}
