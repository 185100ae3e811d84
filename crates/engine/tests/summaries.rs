mod common;

use engine::{
    ChecklistPatch, EngineError, Frequency, Money, NewResourceCmd, NewTransactionCmd,
    PeriodStatus, PeriodType, ResourceDetails, Split, SummaryScope, summaries::summary_id,
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
async fn incremental_summary_matches_a_rebuild() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let rent = rent(&engine).await;
    let at = utc(2025, 3, 2);

    engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(150_000))
                .split(Split::new(Money::new(150_000)).outflow(&rent.id)),
        )
        .await
        .unwrap();
    engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(at, Money::new(7_500))
                .split(Split::new(Money::new(7_500)).budget(&budget.id)),
        )
        .await
        .unwrap();

    let scope = SummaryScope::User("alice".to_string());
    let id = summary_id(&scope, PeriodType::Monthly, "2025M03");
    let incremental = engine.stored_summary(&id).await.unwrap().unwrap();
    let rebuilt = engine
        .recalculate_period_summary(scope, PeriodType::Monthly, "2025M03")
        .await
        .unwrap();

    assert_eq!(incremental.budgets, rebuilt.budgets);
    assert_eq!(incremental.outflows, rebuilt.outflows);
    assert_eq!(incremental.inflows, rebuilt.inflows);
    assert_eq!(incremental.totals, rebuilt.totals);

    assert_eq!(rebuilt.outflows.len(), 1);
    assert_eq!(rebuilt.outflows[0].status, PeriodStatus::Paid);
    assert_eq!(rebuilt.outflows[0].occurrences_paid, 1);
    assert_eq!(rebuilt.totals.outflows_paid, Money::new(150_000));
    let groceries = rebuilt
        .budgets
        .iter()
        .find(|e| e.resource_id == budget.id)
        .unwrap();
    assert_eq!(groceries.spent, Money::new(7_500));
    assert_eq!(groceries.remaining, Money::new(92_500));
    assert_eq!(groceries.progress_pct, 7.5);
}

#[tokio::test]
async fn summary_holds_one_entry_per_period() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let at = utc(2025, 3, 10);

    for amount in [100, 200, 300] {
        engine
            .create_transaction(
                &alice(),
                NewTransactionCmd::new(at, Money::new(amount))
                    .split(Split::new(Money::new(amount)).budget(&budget.id)),
            )
            .await
            .unwrap();
    }

    let week = period_at(&engine, &budget.id, PeriodType::Weekly, at).await;
    let summary = engine
        .get_period_summary(&alice(), PeriodType::Weekly, &week.source_period_id, true)
        .await
        .unwrap();
    let mut ids: Vec<_> = summary
        .entries()
        .map(|e| e.resource_period_id.clone())
        .collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
    let entry = summary
        .budgets
        .iter()
        .find(|e| e.resource_id == budget.id)
        .unwrap();
    assert_eq!(entry.spent, Money::new(600));
}

#[tokio::test]
async fn summary_reads_can_skip_entries() {
    let (engine, _db) = engine_with_db().await;
    groceries(&engine).await;

    let summary = engine
        .get_period_summary(&alice(), PeriodType::Monthly, "2025M03", false)
        .await
        .unwrap();
    assert_eq!(summary.entries().count(), 0);
    assert_eq!(summary.totals.budgets_allocated, Money::new(100_000));

    // First access builds the summary lazily.
    let empty = engine
        .get_period_summary(&bob(), PeriodType::Monthly, "2024M01", true)
        .await
        .unwrap();
    assert_eq!(empty.entries().count(), 0);
    assert_eq!(empty.id, "user_bob_monthly_2024M01");
}

#[tokio::test]
async fn rebuild_rejects_a_mismatched_period_type() {
    let (engine, _db) = engine_with_db().await;
    let err = engine
        .recalculate_period_summary(
            SummaryScope::User("alice".to_string()),
            PeriodType::Weekly,
            "2025M03",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPeriod(_)));
}

#[tokio::test]
async fn shared_budgets_roll_up_into_group_summaries() {
    let (engine, _db) = engine_with_db().await;
    let shared = engine
        .create_recurring_resource(
            &alice(),
            NewResourceCmd::new("Household", Money::new(60_000), Frequency::Monthly, budget_details())
                .group("home")
                .start_date(utc(2025, 1, 1)),
            utc(2025, 1, 1),
        )
        .await
        .unwrap();
    let private = engine
        .create_recurring_resource(
            &alice(),
            NewResourceCmd::new("Gifts", Money::new(10_000), Frequency::Monthly, budget_details())
                .group("home")
                .private(true)
                .start_date(utc(2025, 1, 1)),
            utc(2025, 1, 1),
        )
        .await
        .unwrap();

    let id = summary_id(
        &SummaryScope::Group("home".to_string()),
        PeriodType::Monthly,
        "2025M03",
    );
    let group = engine.stored_summary(&id).await.unwrap().unwrap();
    assert!(group.budgets.iter().any(|e| e.resource_id == shared.id));
    assert!(group.budgets.iter().all(|e| e.resource_id != private.id));
    assert_eq!(group.totals.budgets_allocated, Money::new(60_000));

    let user = engine
        .get_period_summary(&alice(), PeriodType::Monthly, "2025M03", true)
        .await
        .unwrap();
    assert!(user.budgets.iter().any(|e| e.resource_id == private.id));
}

#[tokio::test]
async fn backfill_rebuilds_every_key() {
    let (engine, _db) = engine_with_db().await;
    groceries(&engine).await;

    let err = engine
        .backfill_summaries(&alice(), true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let dry = engine
        .backfill_summaries(&admin(), true, None)
        .await
        .unwrap();
    assert!(dry.dry_run);
    assert!(dry.keys > 0);
    assert_eq!(dry.rebuilt, 0);

    let report = engine
        .backfill_summaries(&admin(), false, None)
        .await
        .unwrap();
    assert_eq!(report.keys, dry.keys);
    assert_eq!(report.rebuilt, report.keys);
    assert_eq!(report.failed, 0);

    let bob_only = engine
        .backfill_summaries(&admin(), true, Some("bob"))
        .await
        .unwrap();
    assert_eq!(bob_only.keys, 12 + 24 + 53);
}

#[tokio::test]
async fn statuses_move_with_the_clock() {
    let (engine, _db) = engine_with_db().await;
    let rent = rent(&engine).await;
    let march = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 1)).await;
    assert_eq!(march.status, PeriodStatus::NotDue);

    let moved = engine.refresh_period_statuses(utc(2025, 2, 27)).await.unwrap();
    assert!(moved > 0);
    let march = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 1)).await;
    assert_eq!(march.status, PeriodStatus::DueSoon);

    engine.refresh_period_statuses(utc(2025, 3, 5)).await.unwrap();
    let march = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 1)).await;
    assert_eq!(march.status, PeriodStatus::Overdue);
}

#[tokio::test]
async fn checklist_belongs_to_the_budget_owner() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let rent = rent(&engine).await;
    let march = period_at(&engine, &budget.id, PeriodType::Monthly, utc(2025, 3, 10)).await;

    let item = engine
        .add_checklist_item(&alice(), &march.id, "Milk", Money::new(350))
        .await
        .unwrap();
    assert!(!item.is_checked);

    for stranger in [bob(), admin()] {
        let err = engine
            .add_checklist_item(&stranger, &march.id, "Eggs", Money::new(400))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    let updated = engine
        .update_checklist_item(
            &alice(),
            &march.id,
            &item.id,
            ChecklistPatch::default().actual_amount(Money::new(300)),
        )
        .await
        .unwrap();
    assert_eq!(updated.actual_amount, Money::new(300));
    assert_eq!(updated.name, "Milk");

    let toggled = engine
        .toggle_checklist_item(&alice(), &march.id, &item.id)
        .await
        .unwrap();
    assert!(toggled.is_checked);

    let err = engine
        .add_checklist_item(&alice(), &march.id, "Bread", Money::new(-1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    engine
        .delete_checklist_item(&alice(), &march.id, &item.id)
        .await
        .unwrap();
    let err = engine
        .delete_checklist_item(&alice(), &march.id, &item.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    let march = engine.resource_period(&alice(), &march.id).await.unwrap();
    assert!(march.checklist.is_empty());

    let bill = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 10)).await;
    let err = engine
        .add_checklist_item(&alice(), &bill.id, "Receipt", Money::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidField(_)));
}

#[tokio::test]
async fn rename_reaches_stored_summary_entries() {
    let (engine, _db) = engine_with_db().await;
    let rent = rent(&engine).await;

    engine
        .update_recurring_resource(
            &alice(),
            &rent.id,
            engine::UpdateResourceCmd::default()
                .name("Apartment")
                .merchant("New Landlord"),
        )
        .await
        .unwrap();

    for source_period_id in ["2025M03", "2025M07"] {
        let summary = engine
            .get_period_summary(&alice(), PeriodType::Monthly, source_period_id, true)
            .await
            .unwrap();
        let entry = summary
            .entries()
            .find(|e| e.resource_id == rent.id)
            .unwrap();
        assert_eq!(entry.name, "Apartment");
        assert_eq!(entry.merchant.as_deref(), Some("New Landlord"));
    }
}
