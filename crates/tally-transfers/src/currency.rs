//! Multi-asset currency identifiers.
//!
//! Only token-tagged currencies (`{"token": "KAR"}`) produce transfer
//! records. Foreign assets, LP tokens and other variants are dropped by the
//! router.

use serde_json::{Map, Value};

use crate::error::{TransferError, TransferResult};
use crate::token::TokenInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyId {
    /// Token-tagged currency, with its symbol when one is usable.
    Token(Option<String>),
    /// Any other shape, described for logs.
    Other(String),
}

impl CurrencyId {
    /// Classify a raw currency field.
    ///
    /// Object keys are compared case-insensitively since nodes emit both
    /// `Token` and `token`. A string holding a JSON object is parsed first.
    /// `token: null` counts as no tag.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_object(map),
            Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
                Ok(Value::Object(map)) => Self::from_object(&map),
                _ => Self::Other(format!("string {s:?}")),
            },
            Value::Null => Self::Other("null".to_string()),
            Value::Bool(_) => Self::Other("boolean".to_string()),
            Value::Number(n) => Self::Other(format!("number {n}")),
            Value::Array(_) => Self::Other("array".to_string()),
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        match map.iter().find(|(key, _)| key.eq_ignore_ascii_case("token")) {
            Some((_, Value::Null)) | None => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                Self::Other(format!("{{{}}}", keys.join(", ")))
            }
            Some((_, symbol)) => Self::Token(token_symbol(symbol)),
        }
    }

    /// Display metadata: the tag's symbol with the default decimals, or the
    /// default token entirely when the tag has no usable symbol.
    pub fn display_token(&self, default: &TokenInfo) -> TransferResult<TokenInfo> {
        match self {
            Self::Token(Some(symbol)) => Ok(TokenInfo::new(symbol.clone(), default.decimals)),
            Self::Token(None) => Ok(default.clone()),
            Self::Other(description) => Err(TransferError::UnsupportedAsset(description.clone())),
        }
    }
}

/// Non-empty symbol string, directly or as the payload of a single-key object.
fn token_symbol(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) if map.len() == 1 => map.values().next().and_then(token_symbol),
        _ => None,
    }
}
