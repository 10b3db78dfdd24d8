//! Runtime event model shared by extractors, decoders and sinks.
//!
//! A [`ChainEvent`] is one event emitted by the runtime, with its payload kept
//! as the ordered, loosely-typed field list the node reports. Block and
//! extrinsic context are shared through `Arc` so that every event of the same
//! block (or extrinsic) points at a single copy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Block context for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub number: u64,
    pub hash: String,
    /// Block time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// An event record as listed under its extrinsic.
///
/// Fee policies inspect these (e.g. `TransactionPayment.TransactionFeePaid`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub pallet: String,
    pub method: String,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl EventRecord {
    /// Case-insensitive pallet match, exact method match.
    pub fn is(&self, pallet: &str, method: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.method == method
    }
}

/// Signed extrinsic that emitted an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicContext {
    /// Position of the extrinsic in its block.
    pub index: u32,
    pub hash: String,
    pub success: bool,
    /// Every event the extrinsic emitted, in order.
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

/// A single runtime event with its enclosing context.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    /// Position of the event in its block.
    pub index: u32,
    pub pallet: String,
    pub method: String,
    /// Positional payload fields, as reported by the node.
    pub data: Vec<serde_json::Value>,
    pub block: Arc<BlockContext>,
    /// `None` for events not emitted inside a signed extrinsic
    /// (inherents, `on_initialize` hooks, ...).
    pub extrinsic: Option<Arc<ExtrinsicContext>>,
}

impl ChainEvent {
    /// Case-insensitive pallet match, exact method match.
    pub fn is(&self, pallet: &str, method: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.method == method
    }

    pub fn extrinsic_hash(&self) -> Option<&str> {
        self.extrinsic.as_deref().map(|ext| ext.hash.as_str())
    }

    /// Metadata map attached to envelopes produced from this event.
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("pallet".to_string(), self.pallet.clone());
        metadata.insert("method".to_string(), self.method.clone());
        metadata.insert("block_number".to_string(), self.block.number.to_string());
        metadata.insert("block_hash".to_string(), self.block.hash.clone());
        metadata.insert("event_index".to_string(), self.index.to_string());
        if let Some(hash) = self.extrinsic_hash() {
            metadata.insert("extrinsic_hash".to_string(), hash.to_string());
        }
        metadata
    }
}
