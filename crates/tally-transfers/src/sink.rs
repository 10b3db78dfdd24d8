//! Transfer sink.
//!
//! For every transfer envelope, in order:
//! 1. ensure `[to, from]` accounts, then bump their statistics;
//! 2. concurrently, ensure the block;
//! 3. once both complete, build and persist the record.
//!
//! The first error aborts the batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tally::etl::{Envelope, EventBatch, Sink, TypeId};

use crate::decoder::{NormalizedTransfer, TRANSFER_TYPE};
use crate::error::TransferResult;
use crate::record::{TransferIdScheme, TransferRecordBuilder};
use crate::storage::{BlockRow, SqliteTransferStore, StatisticsAggregator, TransferStore};

pub struct TransferSink {
    store: Arc<dyn TransferStore>,
    statistics: Arc<dyn StatisticsAggregator>,
    builder: TransferRecordBuilder,
}

impl TransferSink {
    pub fn new(
        store: Arc<dyn TransferStore>,
        statistics: Arc<dyn StatisticsAggregator>,
        scheme: TransferIdScheme,
    ) -> Self {
        Self {
            builder: TransferRecordBuilder::new(store.clone(), scheme),
            store,
            statistics,
        }
    }

    /// Sink backed by one SQLite store for transfers and statistics.
    pub fn sqlite(store: Arc<SqliteTransferStore>, scheme: TransferIdScheme) -> Self {
        Self::new(store.clone(), store, scheme)
    }

    pub async fn handle_transfer(&self, transfer: &NormalizedTransfer) -> TransferResult<()> {
        let participants = [transfer.to.clone(), transfer.from.clone()];
        let block = BlockRow {
            hash: transfer.block_hash.clone(),
            number: transfer.block_number,
            timestamp: transfer.timestamp,
        };

        let accounts = async {
            self.store.ensure_accounts(&participants).await?;
            self.statistics
                .update_transfer_statistics(&participants)
                .await
        };
        tokio::try_join!(accounts, self.store.ensure_block(&block))?;

        self.builder.build_and_persist(transfer).await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for TransferSink {
    fn name(&self) -> &str {
        "transfers"
    }

    fn interested_types(&self) -> Vec<TypeId> {
        vec![TypeId::new(TRANSFER_TYPE)]
    }

    async fn process(&self, envelopes: &[Envelope], _batch: &EventBatch) -> Result<()> {
        let transfer_type = TypeId::new(TRANSFER_TYPE);
        let mut persisted = 0usize;

        for envelope in envelopes {
            if envelope.type_id != transfer_type {
                continue;
            }
            let Some(transfer) = envelope.downcast_ref::<NormalizedTransfer>() else {
                continue;
            };

            self.handle_transfer(transfer)
                .await
                .with_context(|| format!("failed to persist transfer envelope {}", envelope.id))?;
            persisted += 1;
        }

        if persisted > 0 {
            tracing::info!(
                target: "tally_transfers::sink",
                count = persisted,
                "Persisted transfers"
            );
        }
        Ok(())
    }
}
