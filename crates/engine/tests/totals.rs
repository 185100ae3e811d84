mod common;

use std::time::{Duration, Instant};

use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use engine::{
    Change, Currency, EngineError, Money, NewTransactionCmd, PeriodType, RecurringResource, Split,
    TotalsTarget, UpdateTransactionCmd, contributions, resource_periods, resources,
};

use common::*;

async fn overwrite_spent(db: &sea_orm::DatabaseConnection, period_id: &str, spent_minor: i64) {
    let mut model: resource_periods::ActiveModel = resource_periods::Entity::find_by_id(period_id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
        .into();
    model.spent_minor = ActiveValue::Set(spent_minor);
    model.update(db).await.unwrap();
}

#[tokio::test]
async fn recreated_everything_else_only_reverses_what_it_received() {
    let (engine, db) = engine_with_db().await;
    let original = engine.register_user("alice", utc(2025, 1, 1)).await.unwrap();
    let at = utc(2025, 3, 10);
    let tx = engine
        .create_transaction(&alice(), NewTransactionCmd::new(at, Money::new(1_234)))
        .await
        .unwrap();

    resources::Entity::delete_by_id(original.id.clone())
        .exec(&db)
        .await
        .unwrap();
    engine
        .handle_resource_change(Change::deleted(original.clone()), utc(2025, 1, 1))
        .await;
    let recreated = engine.register_user("alice", utc(2025, 1, 1)).await.unwrap();
    assert_ne!(recreated.id, original.id);

    // The new catch-all picks up unassigned spending already on the books.
    let march = period_at(&engine, &recreated.id, PeriodType::Monthly, at).await;
    assert_eq!(march.totals.spent, Money::new(1_234));

    engine
        .update_transaction(&alice(), tx.id, UpdateTransactionCmd::default().amount(Money::new(2_000)))
        .await
        .unwrap();
    let march = period_at(&engine, &recreated.id, PeriodType::Monthly, at).await;
    assert_eq!(march.totals.spent, Money::new(2_000));

    engine.delete_transaction(&alice(), tx.id).await.unwrap();
    for period_type in [PeriodType::Monthly, PeriodType::BiMonthly, PeriodType::Weekly] {
        let period = period_at(&engine, &recreated.id, period_type, at).await;
        assert_eq!(period.totals.spent, Money::ZERO, "{}", period.id);
    }
    let left = contributions::Entity::find()
        .filter(contributions::Column::TransactionId.eq(tx.id.to_string()))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn periods_created_later_include_earlier_transactions() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let at = utc(2026, 2, 10);
    assert!(
        !periods_of(&engine, &budget.id)
            .await
            .iter()
            .any(|p| p.contains(at))
    );

    let tx = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(2_500))
                .split(Split::new(Money::new(2_500)).budget(&budget.id)),
        )
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(60);
    let report = engine
        .extend_recurring_periods(utc(2025, 6, 1), deadline)
        .await
        .unwrap();
    assert_eq!(report.failed, 0);

    for period_type in [PeriodType::Monthly, PeriodType::BiMonthly, PeriodType::Weekly] {
        let period = period_at(&engine, &budget.id, period_type, at).await;
        assert_eq!(period.totals.spent, Money::new(2_500), "{}", period.id);
    }

    engine.delete_transaction(&alice(), tx.id).await.unwrap();
    for period_type in [PeriodType::Monthly, PeriodType::BiMonthly, PeriodType::Weekly] {
        let period = period_at(&engine, &budget.id, period_type, at).await;
        assert_eq!(period.totals.spent, Money::ZERO, "{}", period.id);
    }
}

#[tokio::test]
async fn recalculation_repairs_drifted_totals() {
    let (engine, db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let at = utc(2025, 3, 10);
    engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(2_500))
                .split(Split::new(Money::new(2_500)).budget(&budget.id)),
        )
        .await
        .unwrap();
    let march = period_at(&engine, &budget.id, PeriodType::Monthly, at).await;
    let april = period_at(&engine, &budget.id, PeriodType::Monthly, utc(2025, 4, 10)).await;

    overwrite_spent(&db, &march.id, 99_999).await;
    overwrite_spent(&db, &april.id, -1_234).await;

    let err = engine
        .recalculate_period_totals(&alice(), TotalsTarget::Resource(budget.id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let report = engine
        .recalculate_period_totals(&admin(), TotalsTarget::Resource(budget.id.clone()))
        .await
        .unwrap();
    assert_eq!(report.periods, periods_of(&engine, &budget.id).await.len());
    assert_eq!(report.corrected, 2);
    let repaired = period_at(&engine, &budget.id, PeriodType::Monthly, at).await;
    assert_eq!(repaired.totals.spent, Money::new(2_500));
    let repaired = period_at(&engine, &budget.id, PeriodType::Monthly, utc(2025, 4, 10)).await;
    assert_eq!(repaired.totals.spent, Money::ZERO);

    // Nothing left to fix.
    let rerun = engine
        .recalculate_period_totals(&admin(), TotalsTarget::Resource(budget.id.clone()))
        .await
        .unwrap();
    assert_eq!(rerun.corrected, 0);

    overwrite_spent(&db, &march.id, 1).await;
    let single = engine
        .recalculate_period_totals(&admin(), TotalsTarget::Period(march.id.clone()))
        .await
        .unwrap();
    assert_eq!(single.periods, 1);
    assert_eq!(single.corrected, 1);
    let repaired = period_at(&engine, &budget.id, PeriodType::Monthly, at).await;
    assert_eq!(repaired.totals.spent, Money::new(2_500));

    let err = engine
        .recalculate_period_totals(&admin(), TotalsTarget::Period("nope".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn editing_a_transaction_keeps_splits_to_deleted_budgets() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let tx = engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(utc(2025, 3, 10), Money::new(2_500))
                .split(Split::new(Money::new(2_500)).budget(&budget.id)),
        )
        .await
        .unwrap();
    engine
        .delete_recurring_resource(&alice(), &budget.id)
        .await
        .unwrap();

    let edited = engine
        .update_transaction(&alice(), tx.id, UpdateTransactionCmd::default().description("lunch"))
        .await
        .unwrap();
    assert_eq!(edited.description.as_deref(), Some("lunch"));
    assert_eq!(edited.splits, tx.splits);

    // Newly named targets are still checked.
    let err = engine
        .update_transaction(
            &alice(),
            tx.id,
            UpdateTransactionCmd::default()
                .splits(vec![Split::new(Money::new(2_500)).budget("missing")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn store_holds_one_everything_else_budget_per_owner() {
    let (engine, db) = engine_with_db().await;
    let existing = engine.register_user("alice", utc(2025, 1, 1)).await.unwrap();

    let duplicate = RecurringResource::everything_else("alice", Currency::Usd, utc(2025, 2, 1));
    let inserted = resources::ActiveModel::try_from(&duplicate)
        .unwrap()
        .insert(&db)
        .await;
    assert!(inserted.is_err());

    // Another owner's catch-all is unaffected.
    let carol = engine.register_user("carol", utc(2025, 1, 1)).await.unwrap();
    assert_ne!(carol.id, existing.id);
    assert_eq!(
        engine.register_user("alice", utc(2025, 3, 1)).await.unwrap().id,
        existing.id
    );
}
