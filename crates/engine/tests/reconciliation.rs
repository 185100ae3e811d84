mod common;

use engine::{
    EngineError, Frequency, Money, NewResourceCmd, NewTransactionCmd, PeriodStatus, PeriodType,
    ResourceDetails, Split, UpdateTransactionCmd,
};

use common::*;

async fn rent(engine: &engine::Engine) -> engine::RecurringResource {
    engine
        .create_recurring_resource(
            &alice(),
            NewResourceCmd::new(
                "Rent",
                Money::new(150_000),
                Frequency::Monthly,
                ResourceDetails::Outflow {
                    merchant: Some("Landlord".to_string()),
                    due_day: Some(1),
                    is_essential: true,
                },
            )
            .start_date(utc(2025, 1, 1)),
            utc(2025, 1, 1),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn spending_follows_create_update_and_delete() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let at = utc(2025, 3, 10);

    let tx = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(2_500))
                .merchant("Market")
                .split(Split::new(Money::new(2_500)).budget(&budget.id)),
        )
        .await
        .unwrap();

    for period_type in [PeriodType::Monthly, PeriodType::BiMonthly, PeriodType::Weekly] {
        let period = period_at(&engine, &budget.id, period_type, at).await;
        assert_eq!(period.totals.spent, Money::new(2_500), "{}", period.id);
    }
    let april = period_at(&engine, &budget.id, PeriodType::Monthly, utc(2025, 4, 10)).await;
    assert!(april.totals.spent.is_zero());

    engine
        .update_transaction(
            &alice(),
            tx.id,
            UpdateTransactionCmd::default()
                .amount(Money::new(4_000))
                .splits(vec![Split::new(Money::new(4_000)).budget(&budget.id)]),
        )
        .await
        .unwrap();
    for period_type in [PeriodType::Monthly, PeriodType::BiMonthly, PeriodType::Weekly] {
        let period = period_at(&engine, &budget.id, period_type, at).await;
        assert_eq!(period.totals.spent, Money::new(4_000), "{}", period.id);
    }

    engine.delete_transaction(&alice(), tx.id).await.unwrap();
    for period_type in [PeriodType::Monthly, PeriodType::BiMonthly, PeriodType::Weekly] {
        let period = period_at(&engine, &budget.id, period_type, at).await;
        assert!(period.totals.spent.is_zero(), "{}", period.id);
    }

    let stored = engine.transaction(&alice(), tx.id).await.unwrap();
    assert!(stored.is_deleted());
    let err = engine
        .update_transaction(
            &alice(),
            tx.id,
            UpdateTransactionCmd::default().description("again"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn moving_a_transaction_moves_its_spending() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;

    let tx = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(utc(2025, 3, 10), Money::new(1_000))
                .split(Split::new(Money::new(1_000)).budget(&budget.id)),
        )
        .await
        .unwrap();
    engine
        .update_transaction(
            &alice(),
            tx.id,
            UpdateTransactionCmd::default().occurred_at(utc(2025, 5, 20)),
        )
        .await
        .unwrap();

    let march = period_at(&engine, &budget.id, PeriodType::Monthly, utc(2025, 3, 10)).await;
    let may = period_at(&engine, &budget.id, PeriodType::Monthly, utc(2025, 5, 20)).await;
    assert!(march.totals.spent.is_zero());
    assert_eq!(may.totals.spent, Money::new(1_000));
}

#[tokio::test]
async fn unsplit_spending_lands_in_everything_else() {
    let (engine, _db) = engine_with_db().await;
    let everything_else = engine.register_user("alice", utc(2025, 1, 1)).await.unwrap();
    let at = utc(2025, 3, 10);

    let tx = engine
        .create_transaction(&alice(), NewTransactionCmd::new(at, Money::new(1_234)))
        .await
        .unwrap();

    assert_eq!(tx.splits.len(), 1);
    assert!(tx.splits[0].is_unassigned());
    assert_eq!(tx.splits[0].amount, Money::new(1_234));

    let period = period_at(&engine, &everything_else.id, PeriodType::Monthly, at).await;
    assert_eq!(period.totals.spent, Money::new(1_234));
    assert_eq!(period.status, PeriodStatus::Pending);
}

#[tokio::test]
async fn bill_payment_settles_the_matching_occurrence() {
    let (engine, _db) = engine_with_db().await;
    let rent = rent(&engine).await;

    let march = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 2)).await;
    assert_eq!(march.occurrences.due_dates, vec![utc(2025, 3, 1)]);
    assert_eq!(march.totals.total_amount_due, Money::new(150_000));

    let tx = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(utc(2025, 3, 2), Money::new(150_000))
                .split(Split::new(Money::new(150_000)).outflow(&rent.id)),
        )
        .await
        .unwrap();

    let march = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 2)).await;
    assert_eq!(march.totals.total_amount_paid, Money::new(150_000));
    assert!(march.totals.total_amount_unpaid.is_zero());
    assert_eq!(march.status, PeriodStatus::Paid);
    assert_eq!(march.occurrences.paid_flags, vec![true]);
    assert_eq!(march.occurrences.transaction_ids, vec![Some(tx.id.to_string())]);

    engine.delete_transaction(&alice(), tx.id).await.unwrap();
    let march = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 2)).await;
    assert!(march.totals.total_amount_paid.is_zero());
    assert_eq!(march.occurrences.paid_flags, vec![false]);
}

#[tokio::test]
async fn distant_payment_leaves_the_occurrence_open() {
    let (engine, _db) = engine_with_db().await;
    let rent = rent(&engine).await;

    engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(utc(2025, 4, 5), Money::new(150_000))
                .split(Split::new(Money::new(150_000)).outflow(&rent.id)),
        )
        .await
        .unwrap();

    let april = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 4, 5)).await;
    assert_eq!(april.totals.total_amount_paid, Money::new(150_000));
    assert_eq!(april.occurrences.paid_flags, vec![false]);
    assert_eq!(april.occurrences.transaction_ids, vec![None]);
}

#[tokio::test]
async fn income_tracks_received_and_withheld() {
    let (engine, _db) = engine_with_db().await;
    let everything_else = engine.register_user("alice", utc(2025, 1, 1)).await.unwrap();
    let salary = engine
        .create_recurring_resource(
            &alice(),
            NewResourceCmd::new(
                "Salary",
                Money::new(500_000),
                Frequency::Monthly,
                ResourceDetails::Inflow {
                    payer: Some("Acme".to_string()),
                    is_regular_salary: true,
                },
            )
            .start_date(utc(2025, 1, 1)),
            utc(2025, 1, 1),
        )
        .await
        .unwrap();
    let at = utc(2025, 3, 15);

    engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(450_000)).split(
                Split::new(Money::new(450_000))
                    .inflow(&salary.id)
                    .withheld(Money::new(50_000)),
            ),
        )
        .await
        .unwrap();

    let march = period_at(&engine, &salary.id, PeriodType::Monthly, at).await;
    assert_eq!(march.totals.total_amount_paid, Money::new(450_000));
    assert_eq!(march.totals.amount_withheld, Money::new(50_000));
    let everything_else = period_at(&engine, &everything_else.id, PeriodType::Monthly, at).await;
    assert!(everything_else.totals.spent.is_zero());
}

#[tokio::test]
async fn split_targets_are_validated() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let bobs_budget = engine.register_user("bob", utc(2025, 1, 1)).await.unwrap();
    let at = utc(2025, 3, 10);

    let err = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(100))
                .split(Split::new(Money::new(100)).budget(&bobs_budget.id)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(100))
                .split(Split::new(Money::new(100)).budget("missing")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let err = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(100))
                .split(Split::new(Money::new(100)).inflow(&budget.id)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidField(_)));

    let err = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(100))
                .split(Split::new(Money::new(100)).budget(&budget.id).withheld(Money::new(10))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidField(_)));

    let march = period_at(&engine, &budget.id, PeriodType::Monthly, at).await;
    assert!(march.totals.spent.is_zero());
}
