//! Tally - event indexing pipeline for Substrate-based chains.
//!
//! Raw runtime events flow through an extract → decode → sink loop:
//! an [`Extractor`] produces ordered batches, a [`DecoderContext`] turns
//! events into typed [`Envelope`](etl::Envelope)s and a [`MultiSink`]
//! persists them. Domain crates plug in their own decoders and sinks.

pub mod etl;

// Re-export commonly used types for external decoder/sink authors
pub use async_trait::async_trait;
pub use tokio;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use etl::decoder::{DecoderId, PalletFilter};
use etl::extractor::Extractor;
use etl::sink::Sink;
use etl::{Decoder, DecoderContext, MultiSink};

/// Configuration for a pipeline run with pluggable decoders and sinks.
pub struct TallyConfig {
    pub extractor: Box<dyn Extractor>,
    pub decoders: Vec<Arc<dyn Decoder>>,
    pub sinks: Vec<Arc<dyn Sink>>,
    /// Pallet mappings + blacklist.
    pub pallet_filter: PalletFilter,
    /// Delay before polling again when the extractor has nothing new.
    pub cycle_interval: Duration,
    /// Stop between batches once this token is cancelled.
    pub shutdown_token: CancellationToken,
    /// Cancel `shutdown_token` on SIGINT/SIGTERM.
    pub handle_signals: bool,
}

impl TallyConfig {
    pub fn builder() -> TallyConfigBuilder {
        TallyConfigBuilder::default()
    }
}

/// Builder for [`TallyConfig`].
#[derive(Default)]
pub struct TallyConfigBuilder {
    extractor: Option<Box<dyn Extractor>>,
    decoders: Vec<Arc<dyn Decoder>>,
    sinks: Vec<Arc<dyn Sink>>,
    pallet_filter: Option<PalletFilter>,
    cycle_interval: Option<Duration>,
    shutdown_token: Option<CancellationToken>,
    handle_signals: Option<bool>,
}

impl TallyConfigBuilder {
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn add_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    pub fn add_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_pallet_filter(mut self, filter: PalletFilter) -> Self {
        self.pallet_filter = Some(filter);
        self
    }

    /// Route a pallet only to the given decoders.
    pub fn map_pallet(mut self, pallet: &str, decoder_ids: Vec<DecoderId>) -> Self {
        let filter = self.pallet_filter.take().unwrap_or_default();
        self.pallet_filter = Some(filter.map_pallet(pallet, decoder_ids));
        self
    }

    /// Drop every event of a pallet before decoding.
    pub fn blacklist_pallet(mut self, pallet: &str) -> Self {
        let filter = self.pallet_filter.take().unwrap_or_default();
        self.pallet_filter = Some(filter.blacklist_pallet(pallet));
        self
    }

    pub fn cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = Some(interval);
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = Some(token);
        self
    }

    pub fn handle_signals(mut self, handle: bool) -> Self {
        self.handle_signals = Some(handle);
        self
    }

    /// Builds the configuration.
    ///
    /// Fails when no extractor was set or the pallet filter is inconsistent.
    pub fn build(self) -> anyhow::Result<TallyConfig> {
        let pallet_filter = self.pallet_filter.unwrap_or_default();
        pallet_filter.validate()?;

        let extractor = self
            .extractor
            .ok_or_else(|| anyhow::anyhow!("an extractor is required"))?;

        Ok(TallyConfig {
            extractor,
            decoders: self.decoders,
            sinks: self.sinks,
            pallet_filter,
            cycle_interval: self.cycle_interval.unwrap_or(Duration::from_secs(3)),
            shutdown_token: self.shutdown_token.unwrap_or_default(),
            handle_signals: self.handle_signals.unwrap_or(true),
        })
    }
}

/// Totals for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: u64,
    pub events: u64,
    pub envelopes: u64,
    pub latest_block: Option<u64>,
}

/// Runs the pipeline until the extractor is finished or shutdown is requested.
///
/// A decode or sink failure stops the loop and is returned. The cursor only
/// advances after a batch has been fully processed by every sink.
///
/// NOTE: The caller is responsible for initializing the tracing subscriber.
pub async fn run(config: TallyConfig) -> anyhow::Result<RunSummary> {
    tracing::info!(
        target: "tally::main",
        decoders = config.decoders.len(),
        sinks = config.sinks.len(),
        "Starting pipeline"
    );

    let decoder_context = DecoderContext::new(config.decoders, config.pallet_filter);
    let multi_sink = MultiSink::new(config.sinks);
    let shutdown_token = config.shutdown_token;

    let signal_handle = config
        .handle_signals
        .then(|| tokio::spawn(shutdown_signal(shutdown_token.clone())));

    let result = etl_loop(
        config.extractor,
        &decoder_context,
        &multi_sink,
        config.cycle_interval,
        &shutdown_token,
    )
    .await;

    if let Some(handle) = signal_handle {
        handle.abort();
    }

    match &result {
        Ok(summary) => tracing::info!(
            target: "tally::main",
            batches = summary.batches,
            events = summary.events,
            envelopes = summary.envelopes,
            latest_block = ?summary.latest_block,
            "Pipeline stopped"
        ),
        Err(e) => tracing::error!(
            target: "tally::main",
            error = %format!("{e:#}"),
            "Pipeline failed"
        ),
    }

    result
}

async fn etl_loop(
    mut extractor: Box<dyn Extractor>,
    decoder_context: &DecoderContext,
    multi_sink: &MultiSink,
    cycle_interval: Duration,
    shutdown_token: &CancellationToken,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();
    let mut cursor: Option<String> = None;

    loop {
        if shutdown_token.is_cancelled() {
            tracing::info!(target: "tally::etl", "Shutdown requested, stopping ETL loop");
            break;
        }

        let batch = extractor.extract(cursor.clone()).await?;

        if batch.is_empty() {
            if extractor.is_finished() {
                tracing::info!(target: "tally::etl", "Extractor finished, stopping ETL loop");
                break;
            }

            tokio::select! {
                () = shutdown_token.cancelled() => {
                    tracing::info!(
                        target: "tally::etl",
                        "Shutdown requested while waiting for blocks"
                    );
                    break;
                }
                () = tokio::time::sleep(cycle_interval) => continue,
            }
        }

        tracing::info!(
            target: "tally::etl",
            events = batch.len(),
            blocks = batch.blocks.len(),
            "Extracted batch"
        );

        let envelopes = decoder_context.decode(&batch.events).await?;
        multi_sink.process(&envelopes, &batch).await?;

        // Advance only after every sink accepted the batch.
        summary.batches += 1;
        summary.events += batch.len() as u64;
        summary.envelopes += envelopes.len() as u64;
        if let Some(latest) = batch.latest_block() {
            summary.latest_block = Some(latest);
        }
        cursor = batch.cursor;

        tracing::debug!(
            target: "tally::etl",
            envelopes = envelopes.len(),
            cursor = ?cursor,
            "ETL cycle complete"
        );
    }

    Ok(summary)
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "tally::main", error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(
                    target: "tally::main",
                    error = %e,
                    "Failed to install SIGTERM handler"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!(
                target: "tally::main",
                "Received SIGINT (Ctrl+C), stopping after the current batch"
            );
        }
        () = terminate => {
            tracing::info!(
                target: "tally::main",
                "Received SIGTERM, stopping after the current batch"
            );
        }
    }

    token.cancel();
}
