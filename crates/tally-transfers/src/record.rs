//! Transfer record builder.

use num_bigint::BigUint;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::decoder::NormalizedTransfer;
use crate::error::TransferResult;
use crate::metrics;
use crate::storage::TransferStore;
use crate::token::TokenInfo;

/// Persisted transfer. Never mutated by the pipeline once written, except
/// when a later transfer shares its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount: BigUint,
    pub fees: BigUint,
    pub status: bool,
    /// Block time in milliseconds.
    pub timestamp: u64,
    pub block_hash: String,
    pub block_number: u64,
    pub extrinsic_hash: Option<String>,
    pub event_index: u32,
    pub token: TokenInfo,
}

/// How transfer ids are derived.
///
/// `BlockExtrinsic` gives every transfer of an extrinsic the same id, so the
/// last one written wins. `BlockExtrinsicEvent` appends the event index and
/// keeps them all.
///
/// Transfers outside an extrinsic are keyed `{blockNumber}-none`. Indexers
/// that interpolate the missing hash key them `{blockNumber}-undefined`, so
/// rows written by those are not overwritten when re-indexing into the same
/// table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransferIdScheme {
    /// `{blockNumber}-{extrinsicHash}`
    #[default]
    BlockExtrinsic,
    /// `{blockNumber}-{extrinsicHash}-{eventIndex}`
    BlockExtrinsicEvent,
}

impl TransferIdScheme {
    /// A transfer outside any extrinsic uses `none` as its extrinsic hash.
    pub fn transfer_id(
        self,
        block_number: u64,
        extrinsic_hash: Option<&str>,
        event_index: u32,
    ) -> String {
        let extrinsic = extrinsic_hash.unwrap_or("none");
        match self {
            Self::BlockExtrinsic => format!("{block_number}-{extrinsic}"),
            Self::BlockExtrinsicEvent => format!("{block_number}-{extrinsic}-{event_index}"),
        }
    }
}

impl fmt::Display for TransferIdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BlockExtrinsic => "block-extrinsic",
            Self::BlockExtrinsicEvent => "block-extrinsic-event",
        })
    }
}

impl FromStr for TransferIdScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block-extrinsic" => Ok(Self::BlockExtrinsic),
            "block-extrinsic-event" => Ok(Self::BlockExtrinsicEvent),
            other => Err(format!(
                "unknown transfer id scheme '{other}' \
                 (expected block-extrinsic or block-extrinsic-event)"
            )),
        }
    }
}

/// Assembles transfer records and writes them.
///
/// Expects the accounts and block to exist already; it does not check.
pub struct TransferRecordBuilder {
    store: Arc<dyn TransferStore>,
    scheme: TransferIdScheme,
}

impl TransferRecordBuilder {
    pub fn new(store: Arc<dyn TransferStore>, scheme: TransferIdScheme) -> Self {
        Self { store, scheme }
    }

    pub fn build(&self, transfer: &NormalizedTransfer) -> TransferRecord {
        TransferRecord {
            id: self.scheme.transfer_id(
                transfer.block_number,
                transfer.extrinsic_hash.as_deref(),
                transfer.event_index,
            ),
            from: transfer.from.clone(),
            to: transfer.to.clone(),
            amount: transfer.amount.clone(),
            fees: transfer.fees.clone(),
            status: transfer.success,
            timestamp: transfer.timestamp,
            block_hash: transfer.block_hash.clone(),
            block_number: transfer.block_number,
            extrinsic_hash: transfer.extrinsic_hash.clone(),
            event_index: transfer.event_index,
            token: transfer.token.clone(),
        }
    }

    /// Build the record and insert or overwrite it.
    pub async fn build_and_persist(
        &self,
        transfer: &NormalizedTransfer,
    ) -> TransferResult<TransferRecord> {
        let record = self.build(transfer);
        self.store.upsert_transfer(&record).await?;
        metrics::record_transfer_persisted(transfer.kind.as_str());

        tracing::debug!(
            target: "tally_transfers::record",
            id = %record.id,
            amount = %record.amount,
            token = %record.token.name,
            "Persisted transfer"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::TransferKind;
    use crate::storage::SqliteTransferStore;

    fn transfer(extrinsic_hash: Option<&str>, event_index: u32) -> NormalizedTransfer {
        NormalizedTransfer {
            kind: TransferKind::Native,
            from: "A".to_string(),
            to: "B".to_string(),
            amount: BigUint::from(10u32),
            fees: BigUint::from(1u32),
            success: true,
            extrinsic_hash: extrinsic_hash.map(ToString::to_string),
            block_number: 100,
            block_hash: "0xb100".to_string(),
            timestamp: 5,
            event_index,
            token: TokenInfo::new("UNIT", 12),
        }
    }

    #[test]
    fn test_transfer_ids() {
        let default = TransferIdScheme::default();
        assert_eq!(default.transfer_id(100, Some("0xabc"), 4), "100-0xabc");
        assert_eq!(default.transfer_id(100, None, 4), "100-none");
        assert_eq!(
            TransferIdScheme::BlockExtrinsicEvent.transfer_id(100, Some("0xabc"), 4),
            "100-0xabc-4"
        );
    }

    #[test]
    fn test_scheme_parse() {
        for scheme in [TransferIdScheme::BlockExtrinsic, TransferIdScheme::BlockExtrinsicEvent] {
            assert_eq!(scheme.to_string().parse::<TransferIdScheme>(), Ok(scheme));
        }
        assert!("event".parse::<TransferIdScheme>().is_err());
    }

    #[tokio::test]
    async fn test_build_and_persist() {
        let store = Arc::new(SqliteTransferStore::in_memory().unwrap());
        let builder =
            TransferRecordBuilder::new(store.clone(), TransferIdScheme::BlockExtrinsicEvent);

        builder.build_and_persist(&transfer(Some("0xabc"), 1)).await.unwrap();
        builder.build_and_persist(&transfer(Some("0xabc"), 2)).await.unwrap();

        assert_eq!(store.transfer_count().await.unwrap(), 2);
        let stored = store.get_transfer("100-0xabc-2").await.unwrap().unwrap();
        assert_eq!(stored, builder.build(&transfer(Some("0xabc"), 2)));
    }
}
