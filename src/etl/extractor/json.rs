//! Replays captured blocks from a JSON file.
//!
//! Useful for tests, fixtures and re-indexing captured ranges without a live
//! node. Two layouts are accepted:
//!
//! 1. Direct array: `[{block}, {block}]`
//! 2. Object with a `blocks` key: `{"chain": "...", "blocks": [{block}]}`
//!
//! ```json
//! {
//!   "number": 100,
//!   "hash": "0x...",
//!   "timestamp": 1700000000000,
//!   "extrinsics": [{ "index": 1, "hash": "0xabc", "success": true }],
//!   "events": [
//!     {
//!       "pallet": "Balances", "method": "Transfer",
//!       "data": ["A", "B", "10"], "extrinsic_index": 1
//!     }
//!   ]
//! }
//! ```
//!
//! An extrinsic without an explicit `events` list receives the block events
//! that reference it. The cursor is the offset of the next block to replay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use super::{EventBatch, Extractor};
use crate::etl::event::{BlockContext, ChainEvent, EventRecord, ExtrinsicContext};

#[derive(Debug, Clone)]
pub struct JsonBlockExtractorConfig {
    pub file_path: PathBuf,
    /// Number of blocks returned per `extract` call (at least 1).
    pub blocks_per_batch: usize,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

/// Block list of either file layout. Dispatched on the parsed `Value` rather
/// than an untagged enum, which cannot buffer arbitrary-precision numbers.
fn blocks_from_value(value: serde_json::Value) -> Result<Vec<BlockEntry>> {
    let blocks = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map
            .remove("blocks")
            .context("expected a block array or an object with a `blocks` key")?,
        _ => anyhow::bail!("expected a block array or an object with a `blocks` key"),
    };
    serde_json::from_value(blocks).context("failed to parse block entries")
}

#[derive(Debug, Deserialize)]
struct BlockEntry {
    number: u64,
    hash: String,
    timestamp: u64,
    #[serde(default)]
    extrinsics: Vec<ExtrinsicEntry>,
    #[serde(default)]
    events: Vec<EventEntry>,
}

#[derive(Debug, Deserialize)]
struct ExtrinsicEntry {
    index: u32,
    hash: String,
    success: bool,
    #[serde(default)]
    events: Option<Vec<EventRecord>>,
}

#[derive(Debug, Deserialize)]
struct EventEntry {
    #[serde(default)]
    index: Option<u32>,
    pallet: String,
    method: String,
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default)]
    extrinsic_index: Option<u32>,
}

pub struct JsonBlockExtractor {
    blocks: Vec<BlockEntry>,
    blocks_per_batch: usize,
    offset: usize,
}

impl JsonBlockExtractor {
    pub fn new(config: JsonBlockExtractorConfig) -> Result<Self> {
        tracing::info!(
            target: "tally::etl::json_extractor",
            path = %config.file_path.display(),
            "Loading blocks from JSON file"
        );

        let contents = fs::read_to_string(&config.file_path)
            .with_context(|| format!("failed to read file: {}", config.file_path.display()))?;

        Self::from_json_str(&contents, config)
    }

    /// Build the extractor from JSON text instead of a file.
    pub fn from_json_str(contents: &str, config: JsonBlockExtractorConfig) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(contents).context("failed to parse blocks JSON")?;
        let blocks = blocks_from_value(value)?;

        let total = blocks.len();
        let mut blocks: Vec<BlockEntry> = blocks
            .into_iter()
            .filter(|b| b.number >= config.from_block)
            .filter(|b| config.to_block.map_or(true, |to| b.number <= to))
            .collect();
        blocks.sort_by_key(|b| b.number);

        tracing::info!(
            target: "tally::etl::json_extractor",
            total_blocks = total,
            selected_blocks = blocks.len(),
            from_block = config.from_block,
            to_block = ?config.to_block,
            "Loaded blocks"
        );

        Ok(Self {
            blocks,
            blocks_per_batch: config.blocks_per_batch.max(1),
            offset: 0,
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn build_events(entry: &BlockEntry) -> Result<(Arc<BlockContext>, Vec<ChainEvent>)> {
        let block = Arc::new(BlockContext {
            number: entry.number,
            hash: entry.hash.clone(),
            timestamp: entry.timestamp,
        });

        let mut extrinsics: HashMap<u32, Arc<ExtrinsicContext>> = HashMap::new();
        for ext in &entry.extrinsics {
            let events = match &ext.events {
                Some(events) => events.clone(),
                None => entry
                    .events
                    .iter()
                    .filter(|e| e.extrinsic_index == Some(ext.index))
                    .map(|e| EventRecord {
                        pallet: e.pallet.clone(),
                        method: e.method.clone(),
                        data: e.data.clone(),
                    })
                    .collect(),
            };
            extrinsics.insert(
                ext.index,
                Arc::new(ExtrinsicContext {
                    index: ext.index,
                    hash: ext.hash.clone(),
                    success: ext.success,
                    events,
                }),
            );
        }

        let mut events = Vec::with_capacity(entry.events.len());
        for (position, e) in entry.events.iter().enumerate() {
            let extrinsic = match e.extrinsic_index {
                Some(index) => Some(extrinsics.get(&index).cloned().with_context(|| {
                    format!(
                        "block {} event {}.{} references unknown extrinsic {}",
                        entry.number, e.pallet, e.method, index
                    )
                })?),
                None => None,
            };

            events.push(ChainEvent {
                index: e.index.unwrap_or(position as u32),
                pallet: e.pallet.clone(),
                method: e.method.clone(),
                data: e.data.clone(),
                block: block.clone(),
                extrinsic,
            });
        }

        Ok((block, events))
    }
}

#[async_trait]
impl Extractor for JsonBlockExtractor {
    async fn extract(&mut self, cursor: Option<String>) -> Result<EventBatch> {
        if let Some(cursor) = cursor {
            self.offset = cursor
                .parse()
                .with_context(|| format!("invalid JSON extractor cursor: {cursor}"))?;
        }

        if self.offset >= self.blocks.len() {
            return Ok(EventBatch::empty());
        }

        let end = (self.offset + self.blocks_per_batch).min(self.blocks.len());
        let mut batch = EventBatch::empty();
        for entry in &self.blocks[self.offset..end] {
            let (block, events) = Self::build_events(entry)?;
            batch.blocks.insert(block.number, block);
            batch.events.extend(events);
        }

        self.offset = end;
        batch.cursor = Some(end.to_string());

        tracing::debug!(
            target: "tally::etl::json_extractor",
            blocks = batch.blocks.len(),
            events = batch.events.len(),
            cursor = end,
            "Extracted batch"
        );

        Ok(batch)
    }

    fn is_finished(&self) -> bool {
        self.offset >= self.blocks.len()
    }
}
