mod common;

use sea_orm::{EntityTrait, PaginatorTrait};

use engine::{
    EngineError, Frequency, Money, NewResourceCmd, NewTransactionCmd, PeriodType,
    ResourceDetails, Split, source_periods,
};

use common::*;

#[tokio::test]
async fn current_period_lookup() {
    let (engine, _db) = engine_with_db().await;
    let at = utc(2025, 3, 10);

    let month = engine
        .current_source_period(PeriodType::Monthly, at)
        .await
        .unwrap();
    assert_eq!(month.id, "2025M03");
    assert!(month.is_current(at));

    let half = engine
        .current_source_period(PeriodType::BiMonthly, at)
        .await
        .unwrap();
    assert_eq!(half.id, "2025BM03A");

    let err = engine
        .current_source_period(PeriodType::Monthly, utc(2030, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingCalendar(_)));
}

#[tokio::test]
async fn overlap_is_inclusive_on_both_ends() {
    let (engine, _db) = engine_with_db().await;

    let periods = engine
        .source_periods_overlapping(utc(2025, 3, 1), utc(2025, 4, 1), &[PeriodType::Monthly])
        .await
        .unwrap();
    let ids: Vec<_> = periods.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["2025M03", "2025M04"]);
}

#[tokio::test]
async fn calendar_generation_is_idempotent_and_admin_only() {
    let (engine, db) = engine_with_db().await;
    let before = source_periods::Entity::find().count(&db).await.unwrap();

    engine
        .generate_calendar(&admin(), 2024, 2026, false)
        .await
        .unwrap();
    assert_eq!(source_periods::Entity::find().count(&db).await.unwrap(), before);

    let rebuilt = engine
        .generate_calendar(&admin(), 2024, 2026, true)
        .await
        .unwrap();
    assert_eq!(rebuilt as u64, before);

    let err = engine
        .generate_calendar(&alice(), 2024, 2026, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn occurrence_refresh_skips_unchanged_periods() {
    let (engine, _db) = engine_with_db().await;
    let budget = groceries(&engine).await;
    let rent = engine
        .create_recurring_resource(
            &alice(),
            NewResourceCmd::new(
                "Rent",
                Money::new(150_000),
                Frequency::Monthly,
                ResourceDetails::Outflow {
                    merchant: None,
                    due_day: Some(1),
                    is_essential: true,
                },
            )
            .start_date(utc(2025, 1, 1)),
            utc(2025, 1, 1),
        )
        .await
        .unwrap();
    engine
        .create_transaction(
            &alice(),
            NewTransactionCmd::new(utc(2025, 3, 2), Money::new(150_000))
                .split(Split::new(Money::new(150_000)).outflow(&rent.id)),
        )
        .await
        .unwrap();

    let march = period_at(&engine, &rent.id, PeriodType::Monthly, utc(2025, 3, 2)).await;
    assert_eq!(march.occurrences.paid_flags, vec![true]);
    assert!(!engine.refresh_occurrences(&march.id).await.unwrap());

    let groceries_march = period_at(&engine, &budget.id, PeriodType::Monthly, utc(2025, 3, 2)).await;
    assert!(!engine.refresh_occurrences(&groceries_march.id).await.unwrap());
}
