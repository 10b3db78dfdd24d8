pub mod context;

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use super::envelope::Envelope;
use super::event::ChainEvent;

pub use context::DecoderContext;

/// Decoder turns runtime events into typed envelopes.
///
/// Decoders:
/// - examine the raw event (pallet, method, positional fields);
/// - skip events they do not handle by returning an empty `Vec`;
/// - validate the payload shape and return an error when an event they
///   handle is malformed;
/// - copy the block/extrinsic values sinks need into the envelope body or
///   metadata, so sinks never have to look the original event up again.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl Decoder for RemarkDecoder {
///     fn decoder_name(&self) -> &str {
///         "remarks"
///     }
///
///     async fn decode_event(&self, event: &ChainEvent) -> anyhow::Result<Vec<Envelope>> {
///         if !event.is("system", "Remarked") {
///             return Ok(Vec::new());
///         }
///         let body = Remark { /* decoded fields */ };
///         let id = format!("remark-{}", event.index);
///         Ok(vec![Envelope::new(id, Box::new(body), event.metadata())])
///     }
/// }
/// ```
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Stable, unique name. Hashed into the [`DecoderId`] used by pallet mappings.
    fn decoder_name(&self) -> &str;

    /// Decode a single event. Empty when the decoder is not interested.
    async fn decode_event(&self, event: &ChainEvent) -> anyhow::Result<Vec<Envelope>>;

    /// Decode a slice of events in order.
    async fn decode(&self, events: &[ChainEvent]) -> anyhow::Result<Vec<Envelope>> {
        let mut all_envelopes = Vec::new();
        for event in events {
            let envelopes = self.decode_event(event).await?;
            all_envelopes.extend(envelopes);
        }
        Ok(all_envelopes)
    }
}

/// Decoder identifier: a hash of the decoder name, stable within a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecoderId(u64);

impl DecoderId {
    pub fn new(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        DecoderId(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Pallet routing: explicit pallet → decoders mappings plus a blacklist.
///
/// Pallet names are compared lowercased. A pallet without a mapping is
/// offered to every registered decoder, unless `skip_unmapped` is set.
#[derive(Debug, Clone, Default)]
pub struct PalletFilter {
    pub mappings: HashMap<String, Vec<DecoderId>>,
    pub blacklist: HashSet<String>,
    pub skip_unmapped: bool,
}

impl PalletFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` only for blacklisted pallets.
    pub fn allows(&self, pallet: &str) -> bool {
        !self.blacklist.contains(&pallet.to_ascii_lowercase())
    }

    /// Decoders explicitly mapped to `pallet`, if any.
    pub fn get_decoders(&self, pallet: &str) -> Option<&Vec<DecoderId>> {
        self.mappings.get(&pallet.to_ascii_lowercase())
    }

    /// Reject a pallet that is both mapped and blacklisted.
    pub fn validate(&self) -> anyhow::Result<()> {
        for pallet in self.mappings.keys() {
            if self.blacklist.contains(pallet) {
                anyhow::bail!("Pallet '{}' appears in both mapping and blacklist", pallet);
            }
        }
        Ok(())
    }

    pub fn map_pallet(mut self, pallet: &str, decoder_ids: Vec<DecoderId>) -> Self {
        self.mappings.insert(pallet.to_ascii_lowercase(), decoder_ids);
        self
    }

    pub fn blacklist_pallet(mut self, pallet: &str) -> Self {
        self.blacklist.insert(pallet.to_ascii_lowercase());
        self
    }

    pub fn skip_unmapped(mut self, skip: bool) -> Self {
        self.skip_unmapped = skip;
        self
    }
}
