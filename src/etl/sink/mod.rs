pub mod multi;

use async_trait::async_trait;

use super::envelope::{Envelope, TypeId};
use super::extractor::EventBatch;

pub use multi::MultiSink;

/// Sink trait: persists or reacts to decoded envelopes.
///
/// A sink filters envelopes by [`TypeId`], downcasts the bodies it handles
/// and ignores the rest. Returning an error stops the pipeline before the
/// batch cursor advances, so the batch is replayed on restart.
///
/// # Enriched Context
///
/// `batch` is the extraction batch the envelopes were decoded from.
/// `batch.blocks[&number]` gives the block context of any event in it.
/// Values that come from the event itself should be put in the envelope by
/// the decoder instead of being looked up again in `batch.events`.
///
/// # Example
///
/// ```rust,ignore
/// async fn process(&self, envelopes: &[Envelope], batch: &EventBatch) -> anyhow::Result<()> {
///     for envelope in envelopes {
///         if let Some(remark) = envelope.downcast_ref::<Remark>() {
///             let block = &batch.blocks[&remark.block_number];
///             self.store.insert(remark, block.timestamp).await?;
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Type IDs this sink handles. Empty means every type.
    fn interested_types(&self) -> Vec<TypeId>;

    async fn process(&self, envelopes: &[Envelope], batch: &EventBatch) -> anyhow::Result<()>;
}
