//! Height-indexed native token metadata.
//!
//! A chain's native token may be renamed or re-denominated by a runtime
//! upgrade, so display metadata is a pure function of block height.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{TransferError, TransferResult};

/// Display metadata embedded in every transfer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(name: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            decimals,
        }
    }
}

/// Resolves the native token metadata in force at a block height.
pub trait TokenResolver: Send + Sync {
    fn resolve_token(&self, height: u64) -> TokenInfo;
}

/// Metadata in force from `from_height` until the next epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEpoch {
    pub from_height: u64,
    pub name: String,
    pub decimals: u8,
}

/// Ordered list of token epochs.
///
/// Heights before the first epoch resolve to the first epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSchedule {
    epochs: Vec<TokenEpoch>,
}

impl TokenSchedule {
    /// Epochs must be non-empty with strictly increasing `from_height`.
    pub fn new(epochs: Vec<TokenEpoch>) -> TransferResult<Self> {
        if epochs.is_empty() {
            return Err(TransferError::InvalidTokenSchedule(
                "at least one epoch is required".to_string(),
            ));
        }

        for pair in epochs.windows(2) {
            if pair[1].from_height <= pair[0].from_height {
                return Err(TransferError::InvalidTokenSchedule(format!(
                    "epoch heights must be strictly increasing ({} then {})",
                    pair[0].from_height, pair[1].from_height
                )));
            }
        }

        if let Some(epoch) = epochs.iter().find(|e| e.name.trim().is_empty()) {
            return Err(TransferError::InvalidTokenSchedule(format!(
                "epoch at height {} has an empty name",
                epoch.from_height
            )));
        }

        Ok(Self { epochs })
    }

    /// One epoch covering every height.
    pub fn single(name: impl Into<String>, decimals: u8) -> Self {
        Self {
            epochs: vec![TokenEpoch {
                from_height: 0,
                name: name.into(),
                decimals,
            }],
        }
    }

    /// Parse either `[{epoch}, ...]` or `{"epochs": [{epoch}, ...]}`.
    pub fn from_json_str(json: &str) -> TransferResult<Self> {
        let invalid = |e: serde_json::Error| TransferError::InvalidTokenSchedule(e.to_string());
        let epochs = match serde_json::from_str::<Value>(json).map_err(invalid)? {
            Value::Object(mut map) => map.remove("epochs").ok_or_else(|| {
                TransferError::InvalidTokenSchedule("missing `epochs` key".to_string())
            })?,
            value => value,
        };
        Self::new(serde_json::from_value(epochs).map_err(invalid)?)
    }

    pub fn from_file(path: &Path) -> TransferResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            TransferError::InvalidTokenSchedule(format!("{}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn epochs(&self) -> &[TokenEpoch] {
        &self.epochs
    }
}

impl TokenResolver for TokenSchedule {
    fn resolve_token(&self, height: u64) -> TokenInfo {
        let idx = self
            .epochs
            .partition_point(|e| e.from_height <= height)
            .saturating_sub(1);
        let epoch = &self.epochs[idx];
        TokenInfo::new(epoch.name.clone(), epoch.decimals)
    }
}
