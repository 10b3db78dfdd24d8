//! Tally Transfers - transfer indexer for Substrate-based chains
//!
//! Replays a captured block file through the transfer pipeline and stores
//! normalized transfers in SQLite.
//!
//! # Usage
//!
//! ```bash
//! # Index every block of a capture
//! tally-transfers --events-file ./blocks.json
//!
//! # Index a range with a token schedule and Prometheus metrics
//! tally-transfers --events-file ./blocks.json --from-block 1000 --to-block 2000 \
//!     --token-schedule ./tokens.json --metrics-addr 0.0.0.0:9100
//!
//! # Keep every transfer of multi-transfer extrinsics
//! tally-transfers --events-file ./blocks.json --transfer-id-scheme block-extrinsic-event
//! ```

mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tally::etl::decoder::{DecoderId, PalletFilter};
use tally::etl::{Decoder, JsonBlockExtractor, JsonBlockExtractorConfig};
use tally_transfers::{SqliteTransferStore, TransferDecoder, TransferSink, TransferStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .init();

    tracing::info!(target: "tally::main", "Starting Tally transfer indexer");
    tracing::info!(
        target: "tally::main",
        events_file = %config.events_file.display(),
        "Block source"
    );
    tracing::info!(target: "tally::main", db_path = %config.db_path, "Database");
    tracing::info!(
        target: "tally::main",
        from_block = config.from_block,
        to_block = ?config.to_block,
        transfer_id_scheme = %config.transfer_id_scheme,
        "Indexing range"
    );

    // Metrics exporter is optional; failing to bind it does not stop indexing.
    if let Some(addr) = config.metrics_addr {
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => tracing::info!(target: "tally::main", %addr, "Prometheus exporter listening"),
            Err(e) => tracing::warn!(
                target: "tally::main",
                error = %e,
                "Failed to start metrics exporter, continuing without metrics"
            ),
        }
    }
    tally_transfers::metrics::init_metrics();

    let token_schedule = config.token_schedule()?;
    for epoch in token_schedule.epochs() {
        tracing::info!(
            target: "tally::main",
            from_height = epoch.from_height,
            name = %epoch.name,
            decimals = epoch.decimals,
            "Token epoch"
        );
    }

    let store = Arc::new(SqliteTransferStore::new(&config.db_path)?);
    tracing::info!(target: "tally::main", "Database initialized");

    let extractor = JsonBlockExtractor::new(JsonBlockExtractorConfig {
        file_path: config.events_file.clone(),
        blocks_per_batch: config.blocks_per_batch,
        from_block: config.from_block,
        to_block: config.to_block,
    })?;

    let decoder = Arc::new(TransferDecoder::new(Arc::new(token_schedule)));
    let sink = Arc::new(TransferSink::sqlite(store.clone(), config.transfer_id_scheme));

    // Only transfer pallets reach the decoder.
    let decoder_id = DecoderId::new(decoder.decoder_name());
    let pallet_filter = decoder
        .event_set()
        .pallets()
        .iter()
        .fold(PalletFilter::new(), |filter, pallet| {
            filter.map_pallet(pallet, vec![decoder_id])
        })
        .skip_unmapped(true);

    let tally_config = tally::TallyConfig::builder()
        .with_extractor(Box::new(extractor))
        .add_decoder(decoder)
        .add_sink(sink)
        .with_pallet_filter(pallet_filter)
        .cycle_interval(Duration::from_secs(config.cycle_interval))
        .build()?;

    let summary = tally::run(tally_config).await?;

    tracing::info!(
        target: "tally::main",
        batches = summary.batches,
        events = summary.events,
        transfers = summary.envelopes,
        "Indexing complete"
    );
    let transfers = store.transfer_count().await?;
    let accounts = store.account_count().await?;
    let latest_block = store.latest_block().await?;
    tracing::info!(
        target: "tally::main",
        transfers,
        accounts,
        latest_block = ?latest_block,
        "Database totals"
    );

    Ok(())
}
