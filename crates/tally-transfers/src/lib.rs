//! Transfer indexer library for Tally.
//!
//! Normalizes native (`Balances.Transfer`) and multi-asset
//! (`Currencies.Transferred`, `Tokens.Transfer`) transfer events into
//! uniquely keyed transfer records, with idempotent account and block
//! reference entities.
//!
//! # Components
//!
//! - [`TransferDecoder`]: routes and validates transfer events
//! - [`TransferSink`]: ensures references, updates statistics, persists records
//! - [`SqliteTransferStore`]: SQLite store implementing [`TransferStore`] and
//!   [`StatisticsAggregator`]
//! - [`TokenSchedule`]: height-indexed native token metadata
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_transfers::{
//!     SqliteTransferStore, TokenSchedule, TransferDecoder, TransferIdScheme, TransferSink,
//! };
//!
//! let store = Arc::new(SqliteTransferStore::new("./transfers.db")?);
//! let decoder = Arc::new(TransferDecoder::new(Arc::new(TokenSchedule::single("KSM", 12))));
//! let sink = Arc::new(TransferSink::sqlite(store, TransferIdScheme::default()));
//!
//! let config = tally::TallyConfig::builder()
//!     .with_extractor(extractor)
//!     .add_decoder(decoder)
//!     .add_sink(sink)
//!     .build()?;
//! tally::run(config).await?;
//! ```

pub mod amount;
pub mod currency;
pub mod decoder;
pub mod error;
pub mod metrics;
pub mod record;
pub mod sink;
pub mod storage;
pub mod token;

pub use amount::{to_canonical_amount, EventFeeCalculator, ExtrinsicOutcome, FeeCalculator};
pub use currency::CurrencyId;
pub use decoder::{
    NormalizedTransfer, TransferDecoder, TransferEventSet, TransferKind, TRANSFER_TYPE,
};
pub use error::{TransferError, TransferResult};
pub use record::{TransferIdScheme, TransferRecord, TransferRecordBuilder};
pub use sink::TransferSink;
pub use storage::{AccountRow, BlockRow, SqliteTransferStore, StatisticsAggregator, TransferStore};
pub use token::{TokenEpoch, TokenInfo, TokenResolver, TokenSchedule};
