pub mod decoder;
pub mod envelope;
pub mod event;
pub mod extractor;
pub mod sink;

pub use decoder::{Decoder, DecoderContext, DecoderId, PalletFilter};
pub use envelope::{Envelope, TypeId, TypedBody};
pub use event::{BlockContext, ChainEvent, EventRecord, ExtrinsicContext};
pub use extractor::{EventBatch, Extractor, JsonBlockExtractor, JsonBlockExtractorConfig};
pub use sink::{MultiSink, Sink};
