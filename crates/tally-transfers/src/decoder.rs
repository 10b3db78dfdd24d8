//! Transfer event router.
//!
//! Recognizes native and multi-asset transfer events, validates their
//! payload and normalizes them into a [`NormalizedTransfer`] envelope that
//! carries every value the sink needs.

use anyhow::Result;
use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tally::etl::envelope::TypeId;
use tally::etl::{ChainEvent, Decoder, Envelope, TypedBody};
use tally_common::parse_account;

use crate::amount::{to_canonical_amount, EventFeeCalculator, ExtrinsicOutcome, FeeCalculator};
use crate::currency::CurrencyId;
use crate::error::{TransferError, TransferResult};
use crate::metrics;
use crate::token::{TokenInfo, TokenResolver};

pub const TRANSFER_TYPE: &str = "transfers.transfer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// `(from, to, amount)`
    Native,
    /// `(currency_id, from, to, amount)`
    MultiAsset,
}

impl TransferKind {
    pub fn field_count(self) -> usize {
        match self {
            Self::Native => 3,
            Self::MultiAsset => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::MultiAsset => "multi_asset",
        }
    }
}

/// Transfer event, decoded and normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTransfer {
    pub kind: TransferKind,
    pub from: String,
    pub to: String,
    pub amount: BigUint,
    pub fees: BigUint,
    pub success: bool,
    pub extrinsic_hash: Option<String>,
    pub block_number: u64,
    pub block_hash: String,
    /// Block time in milliseconds.
    pub timestamp: u64,
    pub event_index: u32,
    pub token: TokenInfo,
}

impl TypedBody for NormalizedTransfer {
    fn envelope_type_id(&self) -> TypeId {
        TypeId::new(TRANSFER_TYPE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Which `(pallet, method)` pairs count as transfers.
///
/// Pallets match case-insensitively, methods exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEventSet {
    native: Vec<(String, String)>,
    multi_asset: Vec<(String, String)>,
}

impl Default for TransferEventSet {
    /// `Balances.Transfer` as native; `Currencies.Transferred` and
    /// `Tokens.Transfer` as multi-asset.
    fn default() -> Self {
        Self::empty()
            .with_native("balances", "Transfer")
            .with_multi_asset("currencies", "Transferred")
            .with_multi_asset("tokens", "Transfer")
    }
}

impl TransferEventSet {
    pub fn empty() -> Self {
        Self {
            native: Vec::new(),
            multi_asset: Vec::new(),
        }
    }

    pub fn with_native(mut self, pallet: &str, method: &str) -> Self {
        self.native
            .push((pallet.to_ascii_lowercase(), method.to_string()));
        self
    }

    pub fn with_multi_asset(mut self, pallet: &str, method: &str) -> Self {
        self.multi_asset
            .push((pallet.to_ascii_lowercase(), method.to_string()));
        self
    }

    pub fn classify(&self, event: &ChainEvent) -> Option<TransferKind> {
        let matches = |set: &[(String, String)]| set.iter().any(|(p, m)| event.is(p, m));
        if matches(&self.native) {
            Some(TransferKind::Native)
        } else if matches(&self.multi_asset) {
            Some(TransferKind::MultiAsset)
        } else {
            None
        }
    }

    /// Pallets referenced by the set, lowercased and deduplicated.
    pub fn pallets(&self) -> Vec<String> {
        let mut pallets: Vec<String> = self
            .native
            .iter()
            .chain(&self.multi_asset)
            .map(|(p, _)| p.clone())
            .collect();
        pallets.sort();
        pallets.dedup();
        pallets
    }
}

/// Transfer decoder.
///
/// Every field is validated before anything is written: a wrong field count
/// or an unreadable account/amount fails with [`TransferError::MalformedEvent`].
/// A multi-asset transfer without a `token` tag is dropped with a warning
/// and the `transfers_dropped_total` counter.
pub struct TransferDecoder {
    events: TransferEventSet,
    tokens: Arc<dyn TokenResolver>,
    fees: Arc<dyn FeeCalculator>,
}

impl TransferDecoder {
    pub fn new(tokens: Arc<dyn TokenResolver>) -> Self {
        Self {
            events: TransferEventSet::default(),
            tokens,
            fees: Arc::new(EventFeeCalculator),
        }
    }

    pub fn with_event_set(mut self, events: TransferEventSet) -> Self {
        self.events = events;
        self
    }

    pub fn with_fee_calculator(mut self, fees: Arc<dyn FeeCalculator>) -> Self {
        self.fees = fees;
        self
    }

    pub fn event_set(&self) -> &TransferEventSet {
        &self.events
    }

    /// Normalize a recognized transfer event.
    pub fn normalize(
        &self,
        kind: TransferKind,
        event: &ChainEvent,
    ) -> TransferResult<NormalizedTransfer> {
        let malformed =
            |reason: String| TransferError::malformed(&event.pallet, &event.method, reason);

        if event.data.len() != kind.field_count() {
            return Err(malformed(format!(
                "expected {} fields, got {}",
                kind.field_count(),
                event.data.len()
            )));
        }

        // Multi-asset payloads carry the currency first.
        let offset = kind.field_count() - 3;
        let account = |idx: usize, name: &str| -> TransferResult<String> {
            parse_account(&event.data[idx])
                .ok_or_else(|| malformed(format!("field {idx} ({name}) is not an account")))
        };
        let from = account(offset, "from")?;
        let to = account(offset + 1, "to")?;
        let amount = to_canonical_amount(&event.data[offset + 2]).ok_or_else(|| {
            malformed(format!(
                "field {} (amount) is not a non-negative integer: {}",
                offset + 2,
                describe(&event.data[offset + 2])
            ))
        })?;

        let default_token = self.tokens.resolve_token(event.block.number);
        let token = match kind {
            TransferKind::Native => default_token,
            TransferKind::MultiAsset => {
                CurrencyId::from_value(&event.data[0]).display_token(&default_token)?
            }
        };

        let outcome =
            ExtrinsicOutcome::from_context(event.extrinsic.as_deref(), self.fees.as_ref());

        Ok(NormalizedTransfer {
            kind,
            from,
            to,
            amount,
            fees: outcome.fees,
            success: outcome.success,
            extrinsic_hash: outcome.extrinsic_hash,
            block_number: event.block.number,
            block_hash: event.block.hash.clone(),
            timestamp: event.block.timestamp,
            event_index: event.index,
            token,
        })
    }
}

fn describe(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 64 {
        format!("{}...", text.chars().take(64).collect::<String>())
    } else {
        text
    }
}

#[async_trait]
impl Decoder for TransferDecoder {
    fn decoder_name(&self) -> &str {
        "transfers"
    }

    async fn decode_event(&self, event: &ChainEvent) -> Result<Vec<Envelope>> {
        let Some(kind) = self.events.classify(event) else {
            return Ok(Vec::new());
        };

        match self.normalize(kind, event) {
            Ok(transfer) => {
                tracing::debug!(
                    target: "tally_transfers::decoder",
                    kind = kind.as_str(),
                    block_number = transfer.block_number,
                    event_index = transfer.event_index,
                    from = %transfer.from,
                    to = %transfer.to,
                    amount = %transfer.amount,
                    token = %transfer.token.name,
                    "Decoded transfer"
                );

                let mut metadata = event.metadata();
                metadata.insert("transfer_kind".to_string(), kind.as_str().to_string());
                let envelope_id =
                    format!("transfer_{}_{}", transfer.block_number, transfer.event_index);

                Ok(vec![Envelope::new(envelope_id, Box::new(transfer), metadata)])
            }
            Err(TransferError::UnsupportedAsset(asset)) => {
                tracing::warn!(
                    target: "tally_transfers::decoder",
                    pallet = %event.pallet,
                    method = %event.method,
                    block_number = event.block.number,
                    event_index = event.index,
                    asset = %asset,
                    "Dropping transfer of unsupported asset"
                );
                metrics::record_transfer_dropped("unsupported_asset");
                Ok(Vec::new())
            }
            Err(e) => {
                if matches!(e, TransferError::MalformedEvent { .. }) {
                    metrics::record_malformed_event(&event.pallet, &event.method);
                }
                Err(e.into())
            }
        }
    }
}
