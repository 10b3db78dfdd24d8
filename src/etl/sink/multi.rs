//! MultiSink runs multiple sinks in sequence.
//!
//! Each sink sees the same envelopes and filters by TypeId itself.
//! The first failing sink aborts the batch.

use anyhow::Context as _;
use async_trait::async_trait;
use std::sync::Arc;

use super::Sink;
use crate::etl::envelope::{Envelope, TypeId};
use crate::etl::extractor::EventBatch;

pub struct MultiSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }
}

#[async_trait]
impl Sink for MultiSink {
    fn name(&self) -> &str {
        "multi"
    }

    fn interested_types(&self) -> Vec<TypeId> {
        // Delegates to the individual sinks.
        vec![]
    }

    async fn process(&self, envelopes: &[Envelope], batch: &EventBatch) -> anyhow::Result<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.process(envelopes, batch).await {
                tracing::error!(
                    target: "tally::etl::multi_sink",
                    sink = sink.name(),
                    error = %format!("{e:#}"),
                    "Sink failed"
                );
                return Err(e).with_context(|| format!("sink '{}' failed", sink.name()));
            }
        }

        tracing::debug!(
            target: "tally::etl::multi_sink",
            envelopes = envelopes.len(),
            sinks = self.sinks.len(),
            "Processed envelopes"
        );

        Ok(())
    }
}
