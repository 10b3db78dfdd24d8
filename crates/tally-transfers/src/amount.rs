//! Amount & fee normalization.
//!
//! Every amount is an arbitrary-precision unsigned integer; nothing here
//! goes through floating point.

use num_bigint::BigUint;
use serde_json::Value;
use tally::etl::ExtrinsicContext;
use tally_common::parse_biguint;

/// Canonical form of a raw balance field.
///
/// `None` when the value is not a non-negative integer (JSON integer,
/// decimal string or `0x` hex string).
pub fn to_canonical_amount(raw: &Value) -> Option<BigUint> {
    parse_biguint(raw)
}

/// Fee policy applied to the extrinsic a transfer belongs to.
pub trait FeeCalculator: Send + Sync {
    fn compute_fees(&self, extrinsic: &ExtrinsicContext) -> BigUint;
}

/// Fees derived from the events the extrinsic emitted.
///
/// 1. `TransactionPayment.TransactionFeePaid(who, actual_fee, tip)` gives
///    `actual_fee + tip`;
/// 2. otherwise the sum of `Balances.Withdraw(who, amount)` amounts;
/// 3. otherwise zero.
///
/// Fields that cannot be read count as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFeeCalculator;

impl FeeCalculator for EventFeeCalculator {
    fn compute_fees(&self, extrinsic: &ExtrinsicContext) -> BigUint {
        let field = |data: &[Value], idx: usize| -> BigUint {
            data.get(idx)
                .and_then(to_canonical_amount)
                .unwrap_or_default()
        };

        if let Some(paid) = extrinsic
            .events
            .iter()
            .find(|e| e.is("transactionpayment", "TransactionFeePaid"))
        {
            return field(&paid.data, 1) + field(&paid.data, 2);
        }

        extrinsic
            .events
            .iter()
            .filter(|e| e.is("balances", "Withdraw"))
            .map(|e| field(&e.data, 1))
            .sum()
    }
}

/// Success flag and fees of the extrinsic that emitted an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtrinsicOutcome {
    pub extrinsic_hash: Option<String>,
    pub success: bool,
    pub fees: BigUint,
}

impl ExtrinsicOutcome {
    /// Without an extrinsic the transfer counts as failed with zero fees.
    pub fn from_context(extrinsic: Option<&ExtrinsicContext>, fees: &dyn FeeCalculator) -> Self {
        match extrinsic {
            Some(ext) => Self {
                extrinsic_hash: Some(ext.hash.clone()),
                success: ext.success,
                fees: fees.compute_fees(ext),
            },
            None => Self {
                extrinsic_hash: None,
                success: false,
                fees: BigUint::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally::etl::EventRecord;

    fn extrinsic(events: Vec<EventRecord>) -> ExtrinsicContext {
        ExtrinsicContext {
            index: 1,
            hash: "0xabc".to_string(),
            success: true,
            events,
        }
    }

    fn record(pallet: &str, method: &str, data: Vec<Value>) -> EventRecord {
        EventRecord {
            pallet: pallet.to_string(),
            method: method.to_string(),
            data,
        }
    }

    #[test]
    fn test_canonical_amount() {
        assert_eq!(
            to_canonical_amount(&json!("1000000000000")),
            Some(BigUint::from(1_000_000_000_000u64))
        );
        assert_eq!(to_canonical_amount(&json!(5000000)), Some(BigUint::from(5_000_000u32)));
        assert!(to_canonical_amount(&json!("1e6")).is_none());
        assert!(to_canonical_amount(&json!(-3)).is_none());
    }

    #[test]
    fn test_fee_paid_event_wins() {
        let ext = extrinsic(vec![
            record("Balances", "Withdraw", vec![json!("A"), json!("999")]),
            record(
                "TransactionPayment",
                "TransactionFeePaid",
                vec![json!("A"), json!("150"), json!("5")],
            ),
        ]);
        assert_eq!(EventFeeCalculator.compute_fees(&ext), BigUint::from(155u32));
    }

    #[test]
    fn test_fee_from_withdraw_events() {
        let ext = extrinsic(vec![
            record("Balances", "Withdraw", vec![json!("A"), json!("100")]),
            record("Balances", "Transfer", vec![json!("A"), json!("B"), json!("7")]),
            record("Balances", "Withdraw", vec![json!("A"), json!("0x14")]),
        ]);
        assert_eq!(EventFeeCalculator.compute_fees(&ext), BigUint::from(120u32));
    }

    #[test]
    fn test_fee_defaults_to_zero() {
        assert_eq!(EventFeeCalculator.compute_fees(&extrinsic(Vec::new())), BigUint::default());
    }

    #[test]
    fn test_outcome_without_extrinsic() {
        let outcome = ExtrinsicOutcome::from_context(None, &EventFeeCalculator);
        assert!(!outcome.success);
        assert_eq!(outcome.fees, BigUint::default());
        assert!(outcome.extrinsic_hash.is_none());
    }

    #[test]
    fn test_outcome_with_extrinsic() {
        let ext = extrinsic(vec![record("Balances", "Withdraw", vec![json!("A"), json!(42)])]);
        let outcome = ExtrinsicOutcome::from_context(Some(&ext), &EventFeeCalculator);
        assert!(outcome.success);
        assert_eq!(outcome.fees, BigUint::from(42u32));
        assert_eq!(outcome.extrinsic_hash.as_deref(), Some("0xabc"));
    }
}
