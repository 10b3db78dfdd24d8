//! DecoderContext routes events to the registered decoders.
//!
//! - Decoders are keyed by [`DecoderId`] (hash of `decoder_name()`).
//! - Blacklisted pallets are dropped before any decoder runs.
//! - Mapped pallets only reach their mapped decoders.
//! - Unmapped pallets reach every decoder, in sorted `DecoderId` order,
//!   unless the filter skips them.
//! - A decoder error aborts the batch: a malformed event must not be skipped.

use anyhow::Context as _;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Decoder, DecoderId, PalletFilter};
use crate::etl::envelope::Envelope;
use crate::etl::event::ChainEvent;

pub struct DecoderContext {
    /// BTreeMap keeps dispatch order deterministic.
    decoders: BTreeMap<DecoderId, Arc<dyn Decoder>>,
    pallet_filter: PalletFilter,
}

impl DecoderContext {
    pub fn new(decoders: Vec<Arc<dyn Decoder>>, pallet_filter: PalletFilter) -> Self {
        let mut decoder_map = BTreeMap::new();
        for decoder in decoders {
            let id = DecoderId::new(decoder.decoder_name());
            if decoder_map.insert(id, decoder.clone()).is_some() {
                tracing::warn!(
                    target: "tally::etl::decoder_context",
                    decoder = decoder.decoder_name(),
                    "Duplicate decoder name, keeping the last one registered"
                );
            }
        }

        tracing::info!(
            target: "tally::etl::decoder_context",
            decoders = decoder_map.len(),
            mapped_pallets = pallet_filter.mappings.len(),
            blacklisted_pallets = pallet_filter.blacklist.len(),
            skip_unmapped = pallet_filter.skip_unmapped,
            "Initialized DecoderContext"
        );

        Self {
            decoders: decoder_map,
            pallet_filter,
        }
    }

    async fn run_decoder(
        decoder: &Arc<dyn Decoder>,
        event: &ChainEvent,
    ) -> anyhow::Result<Vec<Envelope>> {
        let envelopes = decoder.decode_event(event).await.with_context(|| {
            format!(
                "decoder '{}' failed on {}.{} (block {}, event {})",
                decoder.decoder_name(),
                event.pallet,
                event.method,
                event.block.number,
                event.index
            )
        })?;

        if !envelopes.is_empty() {
            tracing::trace!(
                target: "tally::etl::decoder_context",
                decoder = decoder.decoder_name(),
                block = event.block.number,
                event = event.index,
                envelopes = envelopes.len(),
                "Decoded event"
            );
        }
        Ok(envelopes)
    }
}

#[async_trait]
impl Decoder for DecoderContext {
    fn decoder_name(&self) -> &str {
        "context"
    }

    async fn decode_event(&self, event: &ChainEvent) -> anyhow::Result<Vec<Envelope>> {
        if !self.pallet_filter.allows(&event.pallet) {
            return Ok(Vec::new());
        }

        let mut all_envelopes = Vec::new();

        if let Some(decoder_ids) = self.pallet_filter.get_decoders(&event.pallet) {
            for decoder_id in decoder_ids {
                match self.decoders.get(decoder_id) {
                    Some(decoder) => {
                        all_envelopes.extend(Self::run_decoder(decoder, event).await?);
                    }
                    None => {
                        tracing::warn!(
                            target: "tally::etl::decoder_context",
                            pallet = %event.pallet,
                            decoder_id = decoder_id.as_u64(),
                            "Mapped decoder not registered"
                        );
                    }
                }
            }
        } else if self.pallet_filter.skip_unmapped {
            tracing::trace!(
                target: "tally::etl::decoder_context",
                pallet = %event.pallet,
                "Skipping unmapped pallet"
            );
        } else {
            for decoder in self.decoders.values() {
                all_envelopes.extend(Self::run_decoder(decoder, event).await?);
            }
        }

        Ok(all_envelopes)
    }

    async fn decode(&self, events: &[ChainEvent]) -> anyhow::Result<Vec<Envelope>> {
        let mut all_envelopes = Vec::new();
        for event in events {
            all_envelopes.extend(self.decode_event(event).await?);
        }

        tracing::debug!(
            target: "tally::etl::decoder_context",
            events = events.len(),
            envelopes = all_envelopes.len(),
            decoders = self.decoders.len(),
            "Decoded batch"
        );

        Ok(all_envelopes)
    }
}
