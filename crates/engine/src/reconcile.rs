//! Spending and payment reconciliation.
//!
//! A transaction's contribution to period totals is expressed as a list of
//! [`PeriodEffect`]s. On update the engine applies `after - before` instead
//! of re-summing every transaction of a period; on delete it applies
//! `-before`. Effects are keyed by resource and date, the engine resolves them
//! to the resource periods containing that date.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
    Money,
    resource_periods::TotalsDelta,
    resources::ResourceKind,
    transactions::{Split, Transaction},
};

/// Corrective writes a single change may trigger before reconciliation
/// proceeds with whatever it has.
pub const MAX_CORRECTION_HOPS: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeriodEffect {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub at: DateTime<Utc>,
    pub delta: TotalsDelta,
}

/// Effects of `tx` on period totals. Unassigned budget splits go to
/// `everything_else_id`; without one they only affect linked bills.
pub fn effects(tx: &Transaction, everything_else_id: Option<&str>) -> Vec<PeriodEffect> {
    if tx.is_deleted() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for split in &tx.splits {
        if let Some(inflow_id) = &split.inflow_id {
            out.push(PeriodEffect {
                resource_id: inflow_id.clone(),
                kind: ResourceKind::Inflow,
                at: tx.occurred_at,
                delta: TotalsDelta {
                    paid: split.amount,
                    withheld: split.withheld,
                    ..TotalsDelta::default()
                },
            });
            continue;
        }
        let budget = split.budget_id.as_deref().or(everything_else_id);
        if let Some(budget_id) = budget {
            out.push(PeriodEffect {
                resource_id: budget_id.to_string(),
                kind: ResourceKind::Budget,
                at: tx.occurred_at,
                delta: TotalsDelta {
                    spent: split.amount,
                    ..TotalsDelta::default()
                },
            });
        }
        if let Some(outflow_id) = &split.outflow_id {
            out.push(PeriodEffect {
                resource_id: outflow_id.clone(),
                kind: ResourceKind::Outflow,
                at: tx.occurred_at,
                delta: TotalsDelta {
                    paid: split.amount,
                    ..TotalsDelta::default()
                },
            });
        }
    }
    out
}

/// `after - before`, merged per `(resource, kind, date)` with zero deltas
/// dropped. The output order is deterministic.
pub fn net_deltas(before: &[PeriodEffect], after: &[PeriodEffect]) -> Vec<PeriodEffect> {
    let mut acc: BTreeMap<(String, ResourceKind, DateTime<Utc>), TotalsDelta> = BTreeMap::new();
    let signed = before
        .iter()
        .map(|e| (e, e.delta.negated()))
        .chain(after.iter().map(|e| (e, e.delta)));
    for (effect, delta) in signed {
        *acc.entry((effect.resource_id.clone(), effect.kind, effect.at))
            .or_default() += delta;
    }
    acc.into_iter()
        .filter(|(_, delta)| !delta.is_zero())
        .map(|((resource_id, kind, at), delta)| PeriodEffect {
            resource_id,
            kind,
            at,
            delta,
        })
        .collect()
}

/// `true` when a field that drives totals differs between two versions.
pub fn spending_changed(before: &Transaction, after: &Transaction) -> bool {
    fn shape(split: &Split) -> (Money, Option<&str>, Option<&str>, Option<&str>, Money) {
        (
            split.amount,
            split.budget_id.as_deref(),
            split.outflow_id.as_deref(),
            split.inflow_id.as_deref(),
            split.withheld,
        )
    }
    before.occurred_at != after.occurred_at
        || before.amount != after.amount
        || before.is_deleted() != after.is_deleted()
        || before.splits.len() != after.splits.len()
        || before
            .splits
            .iter()
            .zip(&after.splits)
            .any(|(a, b)| shape(a) != shape(b))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitCheck {
    Valid,
    Corrected(Vec<Split>),
}

/// Checks that splits sum to the transaction amount.
///
/// The difference is absorbed by the unassigned split (created when missing,
/// dropped when it reaches zero), so a corrected set always validates.
pub fn validate_splits(tx: &Transaction) -> SplitCheck {
    if tx.splits.is_empty() {
        return SplitCheck::Corrected(vec![Split::new(tx.amount)]);
    }
    let diff = tx.amount - tx.split_total();
    if diff.is_zero() {
        return SplitCheck::Valid;
    }

    let mut splits = tx.splits.clone();
    match splits.iter().position(Split::is_unassigned) {
        Some(idx) => {
            splits[idx].amount += diff;
            if splits[idx].amount.is_zero() && splits.len() > 1 {
                splits.remove(idx);
            }
        }
        None => splits.push(Split::new(diff)),
    }
    SplitCheck::Corrected(splits)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeDelta, TimeZone};

    use crate::{Currency, resource_periods::PeriodTotals};

    use super::*;

    fn tx(amount: i64, splits: Vec<Split>) -> Transaction {
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut tx = Transaction::new("alice", at, Money::new(amount), Currency::Usd, at).unwrap();
        tx.splits = splits;
        tx
    }

    fn apply(book: &mut HashMap<String, PeriodTotals>, effects: &[PeriodEffect]) {
        for effect in effects {
            book.entry(effect.resource_id.clone())
                .or_default()
                .apply(effect.delta);
        }
    }

    #[test]
    fn applying_then_reversing_restores_totals() {
        let t = tx(
            12_500,
            vec![
                Split::new(Money::new(2_500)).budget("groceries"),
                Split::new(Money::new(7_000)).budget("home").outflow("rent"),
                Split::new(Money::new(3_000)),
            ],
        );
        let mut book: HashMap<String, PeriodTotals> = HashMap::new();
        book.insert("groceries".into(), PeriodTotals::default());
        book.insert(
            "rent".into(),
            PeriodTotals::for_allocation(ResourceKind::Outflow, Money::new(7_000)),
        );
        let initial = book.clone();

        let applied = effects(&t, Some("ee"));
        apply(&mut book, &net_deltas(&[], &applied));
        assert_eq!(book["groceries"].spent, Money::new(2_500));
        assert_eq!(book["ee"].spent, Money::new(3_000));
        assert_eq!(book["rent"].total_amount_unpaid, Money::ZERO);

        apply(&mut book, &net_deltas(&applied, &[]));
        for (id, totals) in &initial {
            assert_eq!(&book[id], totals, "{id}");
        }
        assert_eq!(book["ee"], PeriodTotals::default());
    }

    #[test]
    fn update_applies_only_the_difference() {
        let before = tx(2_500, vec![Split::new(Money::new(2_500)).budget("food")]);
        let mut after = before.clone();
        after.amount = Money::new(4_000);
        after.splits[0].amount = Money::new(4_000);

        assert!(spending_changed(&before, &after));
        let net = net_deltas(&effects(&before, None), &effects(&after, None));
        assert_eq!(net.len(), 1);
        assert_eq!(net[0].delta.spent, Money::new(1_500));
    }

    #[test]
    fn cosmetic_edits_are_not_spending_changes() {
        let before = tx(2_500, vec![Split::new(Money::new(2_500)).budget("food")]);
        let mut after = before.clone();
        after.description = Some("lunch".to_string());
        assert!(!spending_changed(&before, &after));
        assert!(net_deltas(&effects(&before, None), &effects(&after, None)).is_empty());
    }

    #[test]
    fn moving_the_date_reverses_then_reapplies() {
        let before = tx(2_500, vec![Split::new(Money::new(2_500)).budget("food")]);
        let mut after = before.clone();
        after.occurred_at += TimeDelta::days(40);
        let net = net_deltas(&effects(&before, None), &effects(&after, None));
        assert_eq!(net.len(), 2);
        assert_eq!(net[0].delta.spent + net[1].delta.spent, Money::ZERO);
    }

    #[test]
    fn income_never_counts_as_spending() {
        let t = tx(
            300_000,
            vec![Split::new(Money::new(300_000)).inflow("salary").withheld(Money::new(45_000))],
        );
        let out = effects(&t, Some("ee"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ResourceKind::Inflow);
        assert_eq!(out[0].delta.withheld, Money::new(45_000));
        assert!(out[0].delta.spent.is_zero());
    }

    #[test]
    fn correction_converges_in_one_hop() {
        let mut t = tx(10_000, vec![Split::new(Money::new(6_000)).budget("food")]);
        let SplitCheck::Corrected(fixed) = validate_splits(&t) else {
            panic!("expected a correction");
        };
        assert_eq!(fixed.len(), 2);
        assert!(fixed[1].is_unassigned());
        assert_eq!(fixed[1].amount, Money::new(4_000));

        t.splits = fixed;
        assert_eq!(validate_splits(&t), SplitCheck::Valid);
    }

    #[test]
    fn correction_drops_a_zeroed_remainder() {
        let t = tx(
            5_000,
            vec![
                Split::new(Money::new(5_000)).budget("food"),
                Split::new(Money::new(1_000)),
            ],
        );
        let SplitCheck::Corrected(fixed) = validate_splits(&t) else {
            panic!("expected a correction");
        };
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].budget_id.as_deref(), Some("food"));
    }
}
