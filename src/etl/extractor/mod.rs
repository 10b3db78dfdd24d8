//! Extractor trait for fetching runtime events from a source.

pub mod json;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::etl::event::{BlockContext, ChainEvent};

pub use json::{JsonBlockExtractor, JsonBlockExtractorConfig};

/// Events extracted in one cycle, in block order.
///
/// `blocks` holds every block the batch covers, including blocks that
/// emitted no events, keyed by number.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<ChainEvent>,
    pub blocks: BTreeMap<u64, Arc<BlockContext>>,
    /// Opaque cursor to resume after this batch.
    pub cursor: Option<String>,
}

impl EventBatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn latest_block(&self) -> Option<u64> {
        self.blocks.keys().next_back().copied()
    }
}

/// Source of event batches.
///
/// - non-empty batch: process it, call `extract` again with its cursor;
/// - empty batch and `is_finished() == false`: nothing new yet, wait and retry;
/// - empty batch and `is_finished() == true`: the source is exhausted.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&mut self, cursor: Option<String>) -> Result<EventBatch>;

    fn is_finished(&self) -> bool;
}
