use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tally::etl::{
    BlockContext, ChainEvent, Decoder, EventBatch, EventRecord, ExtrinsicContext,
    JsonBlockExtractor, JsonBlockExtractorConfig, Sink,
};
use tally_transfers::{
    AccountRow, BlockRow, EventFeeCalculator, FeeCalculator, SqliteTransferStore,
    StatisticsAggregator, TokenEpoch, TokenInfo, TokenSchedule, TransferDecoder, TransferError,
    TransferIdScheme, TransferRecord, TransferResult, TransferSink, TransferStore,
};

fn block(number: u64) -> Arc<BlockContext> {
    Arc::new(BlockContext {
        number,
        hash: format!("0xb{number}"),
        timestamp: 1_700_000_000_000 + number * 6_000,
    })
}

fn extrinsic(hash: &str, success: bool) -> Arc<ExtrinsicContext> {
    Arc::new(ExtrinsicContext {
        index: 1,
        hash: hash.to_string(),
        success,
        events: vec![EventRecord {
            pallet: "TransactionPayment".to_string(),
            method: "TransactionFeePaid".to_string(),
            data: vec![json!("A"), json!("1250000"), json!("50")],
        }],
    })
}

fn event(
    block: &Arc<BlockContext>,
    extrinsic: Option<&Arc<ExtrinsicContext>>,
    index: u32,
    pallet: &str,
    method: &str,
    data: Vec<Value>,
) -> ChainEvent {
    ChainEvent {
        index,
        pallet: pallet.to_string(),
        method: method.to_string(),
        data,
        block: block.clone(),
        extrinsic: extrinsic.cloned(),
    }
}

fn native(
    block: &Arc<BlockContext>,
    ext: Option<&Arc<ExtrinsicContext>>,
    index: u32,
    from: &str,
    to: &str,
    amount: &str,
) -> ChainEvent {
    let data = vec![json!(from), json!(to), json!(amount)];
    event(block, ext, index, "Balances", "Transfer", data)
}

fn schedule() -> Arc<TokenSchedule> {
    Arc::new(
        TokenSchedule::new(vec![
            TokenEpoch {
                from_height: 0,
                name: "UNIT".to_string(),
                decimals: 12,
            },
            TokenEpoch {
                from_height: 150,
                name: "UNIT".to_string(),
                decimals: 6,
            },
        ])
        .unwrap(),
    )
}

struct Pipeline {
    decoder: TransferDecoder,
    sink: TransferSink,
    store: Arc<SqliteTransferStore>,
}

impl Pipeline {
    fn new(scheme: TransferIdScheme) -> Self {
        let store = Arc::new(SqliteTransferStore::in_memory().unwrap());
        Self {
            decoder: TransferDecoder::new(schedule()),
            sink: TransferSink::sqlite(store.clone(), scheme),
            store,
        }
    }

    async fn process(&self, events: Vec<ChainEvent>) -> anyhow::Result<()> {
        let envelopes = self.decoder.decode(&events).await?;
        self.sink.process(&envelopes, &EventBatch::empty()).await
    }

    async fn account(&self, address: &str) -> Option<AccountRow> {
        self.store.get_account(address).await.unwrap()
    }
}

#[tokio::test]
async fn test_native_transfer_with_extrinsic() {
    let pipeline = Pipeline::new(TransferIdScheme::default());
    let b100 = block(100);
    let ext = extrinsic("0xabc", true);

    pipeline
        .process(vec![native(&b100, Some(&ext), 2, "A", "B", "1000000000000")])
        .await
        .unwrap();

    let record = pipeline.store.get_transfer("100-0xabc").await.unwrap().unwrap();
    assert_eq!(record.amount, BigUint::from(1_000_000_000_000u64));
    assert!(record.status);
    assert_eq!(record.fees, EventFeeCalculator.compute_fees(&ext));
    assert_eq!(record.fees, BigUint::from(1_250_050u64));
    assert_eq!(record.from, "A");
    assert_eq!(record.to, "B");
    assert_eq!(record.block_hash, "0xb100");
    assert_eq!(record.timestamp, b100.timestamp);
    assert_eq!(record.extrinsic_hash.as_deref(), Some("0xabc"));
    assert_eq!(record.token, TokenInfo::new("UNIT", 12));

    assert_eq!(pipeline.account("A").await.unwrap().transfer_count, 1);
    assert_eq!(pipeline.account("B").await.unwrap().transfer_count, 1);
    assert_eq!(
        pipeline.store.get_block("0xb100").await.unwrap(),
        Some(BlockRow {
            hash: "0xb100".to_string(),
            number: 100,
            timestamp: b100.timestamp,
        })
    );
}

#[tokio::test]
async fn test_token_tagged_currency_transfer() {
    let pipeline = Pipeline::new(TransferIdScheme::default());
    let b200 = block(200);
    let ext = extrinsic("0xdef", true);

    pipeline
        .process(vec![event(
            &b200,
            Some(&ext),
            0,
            "Tokens",
            "Transfer",
            vec![json!({"token": "USDT"}), json!("A"), json!("B"), json!("5000000")],
        )])
        .await
        .unwrap();

    let record = pipeline.store.get_transfer("200-0xdef").await.unwrap().unwrap();
    assert_eq!(record.token, TokenInfo::new("USDT", 6));
    assert_eq!(record.amount, BigUint::from(5_000_000u32));
}

#[tokio::test]
async fn test_foreign_asset_is_dropped() {
    let pipeline = Pipeline::new(TransferIdScheme::default());
    let b300 = block(300);

    pipeline
        .process(vec![event(
            &b300,
            Some(&extrinsic("0x123", true)),
            0,
            "Currencies",
            "Transferred",
            vec![json!({"foreign": {"id": 3}}), json!("A"), json!("B"), json!("10")],
        )])
        .await
        .unwrap();

    assert_eq!(pipeline.store.transfer_count().await.unwrap(), 0);
    assert_eq!(pipeline.store.account_count().await.unwrap(), 0);
    assert_eq!(pipeline.store.latest_block().await.unwrap(), None);
}

#[tokio::test]
async fn test_same_extrinsic_transfers_share_an_id() {
    let pipeline = Pipeline::new(TransferIdScheme::default());
    let b100 = block(100);
    let ext = extrinsic("0xabc", true);

    pipeline
        .process(vec![
            native(&b100, Some(&ext), 2, "A", "B", "10"),
            native(&b100, Some(&ext), 3, "A", "C", "20"),
        ])
        .await
        .unwrap();

    assert_eq!(pipeline.store.transfer_count().await.unwrap(), 1);
    let record = pipeline.store.get_transfer("100-0xabc").await.unwrap().unwrap();
    assert_eq!(record.to, "C");
    assert_eq!(record.amount, BigUint::from(20u32));
    assert_eq!(record.event_index, 3);

    // Statistics count every processed event
    assert_eq!(pipeline.account("A").await.unwrap().transfer_count, 2);
    assert_eq!(pipeline.account("B").await.unwrap().transfer_count, 1);
    assert_eq!(pipeline.account("C").await.unwrap().transfer_count, 1);
}

#[tokio::test]
async fn test_event_index_scheme_keeps_every_transfer() {
    let pipeline = Pipeline::new(TransferIdScheme::BlockExtrinsicEvent);
    let b100 = block(100);
    let ext = extrinsic("0xabc", true);

    pipeline
        .process(vec![
            native(&b100, Some(&ext), 2, "A", "B", "10"),
            native(&b100, Some(&ext), 3, "A", "C", "20"),
        ])
        .await
        .unwrap();

    assert_eq!(pipeline.store.transfer_count().await.unwrap(), 2);
    assert!(pipeline.store.get_transfer("100-0xabc-2").await.unwrap().is_some());
    assert!(pipeline.store.get_transfer("100-0xabc-3").await.unwrap().is_some());
}

#[tokio::test]
async fn test_transfer_without_extrinsic() {
    let pipeline = Pipeline::new(TransferIdScheme::default());

    pipeline
        .process(vec![native(&block(7), None, 0, "A", "B", "10")])
        .await
        .unwrap();

    let record = pipeline.store.get_transfer("7-none").await.unwrap().unwrap();
    assert!(!record.status);
    assert_eq!(record.fees, BigUint::default());
    assert!(record.extrinsic_hash.is_none());
}

#[tokio::test]
async fn test_failed_extrinsic_keeps_status_false() {
    let pipeline = Pipeline::new(TransferIdScheme::default());
    let ext = extrinsic("0xfail", false);

    pipeline
        .process(vec![native(&block(8), Some(&ext), 0, "A", "B", "10")])
        .await
        .unwrap();

    let record = pipeline.store.get_transfer("8-0xfail").await.unwrap().unwrap();
    assert!(!record.status);
}

#[tokio::test]
async fn test_replayed_batch_keeps_reference_entities_unique() {
    let pipeline = Pipeline::new(TransferIdScheme::default());
    let b100 = block(100);
    let ext = extrinsic("0xabc", true);
    let events = vec![native(&b100, Some(&ext), 2, "A", "B", "10")];

    pipeline.process(events.clone()).await.unwrap();
    pipeline.process(events).await.unwrap();

    assert_eq!(pipeline.store.transfer_count().await.unwrap(), 1);
    assert_eq!(pipeline.store.account_count().await.unwrap(), 2);
    assert_eq!(pipeline.store.latest_block().await.unwrap(), Some(100));
}

#[tokio::test]
async fn test_malformed_event_aborts_before_any_write() {
    let pipeline = Pipeline::new(TransferIdScheme::default());
    let b100 = block(100);

    let err = pipeline
        .process(vec![
            native(&b100, None, 0, "A", "B", "10"),
            event(&b100, None, 1, "Balances", "Transfer", vec![json!("A"), json!("B")]),
        ])
        .await
        .unwrap_err();

    let transfer_err = err.downcast_ref::<TransferError>().unwrap();
    assert!(matches!(transfer_err, TransferError::MalformedEvent { .. }));
    assert_eq!(pipeline.store.transfer_count().await.unwrap(), 0);
}

/// Wraps the SQLite store, logs every call and optionally fails `ensure_block`.
struct RecordingStore {
    inner: SqliteTransferStore,
    calls: Mutex<Vec<&'static str>>,
    fail_block: bool,
}

impl RecordingStore {
    fn new(fail_block: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteTransferStore::in_memory().unwrap(),
            calls: Mutex::new(Vec::new()),
            fail_block,
        })
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferStore for RecordingStore {
    async fn ensure_accounts(&self, addresses: &[String]) -> TransferResult<()> {
        self.log("ensure_accounts");
        self.inner.ensure_accounts(addresses).await
    }

    async fn ensure_block(&self, block: &BlockRow) -> TransferResult<()> {
        self.log("ensure_block");
        if self.fail_block {
            return Err(TransferError::store("ensure_block", "disk full"));
        }
        self.inner.ensure_block(block).await
    }

    async fn upsert_transfer(&self, record: &TransferRecord) -> TransferResult<()> {
        self.log("upsert_transfer");
        self.inner.upsert_transfer(record).await
    }

    async fn get_transfer(&self, id: &str) -> TransferResult<Option<TransferRecord>> {
        self.inner.get_transfer(id).await
    }

    async fn get_account(&self, address: &str) -> TransferResult<Option<AccountRow>> {
        self.inner.get_account(address).await
    }

    async fn get_block(&self, hash: &str) -> TransferResult<Option<BlockRow>> {
        self.inner.get_block(hash).await
    }

    async fn transfer_count(&self) -> TransferResult<u64> {
        self.inner.transfer_count().await
    }

    async fn account_count(&self) -> TransferResult<u64> {
        self.inner.account_count().await
    }

    async fn latest_block(&self) -> TransferResult<Option<u64>> {
        self.inner.latest_block().await
    }
}

#[async_trait]
impl StatisticsAggregator for RecordingStore {
    async fn update_transfer_statistics(&self, addresses: &[String]) -> TransferResult<()> {
        self.log("update_transfer_statistics");
        assert_eq!(addresses.len(), 2);
        self.inner.update_transfer_statistics(addresses).await
    }
}

#[tokio::test]
async fn test_sink_operation_order() {
    let store = RecordingStore::new(false);
    let sink = TransferSink::new(store.clone(), store.clone(), TransferIdScheme::default());
    let decoder = TransferDecoder::new(schedule());

    let envelopes = decoder
        .decode(&[native(&block(100), None, 0, "A", "B", "10")])
        .await
        .unwrap();
    sink.process(&envelopes, &EventBatch::empty()).await.unwrap();

    let calls = store.calls();
    let position = |call: &str| calls.iter().position(|c| *c == call).unwrap();
    assert_eq!(calls.len(), 4);
    assert!(position("ensure_accounts") < position("update_transfer_statistics"));
    assert_eq!(calls.last(), Some(&"upsert_transfer"));

    // Statistics are keyed [to, from]
    assert_eq!(store.get_account("B").await.unwrap().unwrap().transfer_count, 1);
}

#[tokio::test]
async fn test_store_failure_propagates_without_transfer_write() {
    let store = RecordingStore::new(true);
    let sink = TransferSink::new(store.clone(), store.clone(), TransferIdScheme::default());
    let decoder = TransferDecoder::new(schedule());

    let envelopes = decoder
        .decode(&[native(&block(100), None, 0, "A", "B", "10")])
        .await
        .unwrap();
    let err = sink.process(&envelopes, &EventBatch::empty()).await.unwrap_err();

    let transfer_err = err.downcast_ref::<TransferError>().unwrap();
    assert!(matches!(
        transfer_err,
        TransferError::StoreUnavailable {
            operation: "ensure_block",
            ..
        }
    ));
    assert!(!store.calls().contains(&"upsert_transfer"));
    assert_eq!(store.transfer_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_end_to_end_from_block_file() {
    let dir = tempfile::tempdir().unwrap();
    let blocks_path = dir.path().join("blocks.json");
    let blocks = json!({
        "chain": "test",
        "blocks": [
            {
                "number": 100,
                "hash": "0xb100",
                "timestamp": 1700000000000u64,
                "extrinsics": [{ "index": 1, "hash": "0xabc", "success": true }],
                "events": [
                    {
                        "pallet": "Balances", "method": "Withdraw",
                        "data": ["A", "300"], "extrinsic_index": 1
                    },
                    {
                        "pallet": "Balances", "method": "Transfer",
                        "data": ["A", "B", "1000000000000"], "extrinsic_index": 1
                    }
                ]
            },
            {
                "number": 101,
                "hash": "0xb101",
                "timestamp": 1700000006000u64,
                "extrinsics": [{ "index": 2, "hash": "0xdef", "success": true }],
                "events": [
                    {
                        "pallet": "Tokens", "method": "Transfer",
                        "data": [{"Token": "KUSD"}, "B", "C", "0x10"], "extrinsic_index": 2
                    },
                    {
                        "pallet": "Tokens", "method": "Transfer",
                        "data": [{"ForeignAsset": 0}, "B", "C", "5"], "extrinsic_index": 2
                    },
                    {
                        "pallet": "System", "method": "ExtrinsicSuccess",
                        "data": [{}], "extrinsic_index": 2
                    }
                ]
            }
        ]
    });
    std::fs::write(&blocks_path, blocks.to_string()).unwrap();

    let extractor = JsonBlockExtractor::new(JsonBlockExtractorConfig {
        file_path: blocks_path,
        blocks_per_batch: 1,
        from_block: 0,
        to_block: None,
    })
    .unwrap();

    let store = Arc::new(SqliteTransferStore::in_memory().unwrap());
    let decoder: Arc<dyn Decoder> = Arc::new(TransferDecoder::new(schedule()));
    let config = tally::TallyConfig::builder()
        .with_extractor(Box::new(extractor))
        .add_decoder(decoder)
        .add_sink(Arc::new(TransferSink::sqlite(store.clone(), TransferIdScheme::default())))
        .cycle_interval(Duration::from_millis(10))
        .handle_signals(false)
        .build()
        .unwrap();

    let summary = tally::run(config).await.unwrap();
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.events, 5);
    assert_eq!(summary.envelopes, 2);
    assert_eq!(summary.latest_block, Some(101));

    let native_record = store.get_transfer("100-0xabc").await.unwrap().unwrap();
    assert_eq!(native_record.fees, BigUint::from(300u32));
    assert!(native_record.status);

    let currency = store.get_transfer("101-0xdef").await.unwrap().unwrap();
    assert_eq!(currency.token, TokenInfo::new("KUSD", 12));
    assert_eq!(currency.amount, BigUint::from(16u32));

    assert_eq!(store.transfer_count().await.unwrap(), 2);
    assert_eq!(store.account_count().await.unwrap(), 3);
    assert_eq!(store.get_account("B").await.unwrap().unwrap().transfer_count, 2);
}
