#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};

use engine::{
    Engine, EngineSettings, Frequency, Money, NewResourceCmd, PeriodType, Principal,
    RecurringResource, ResourceDetails, ResourcePeriod,
};
use migration::MigratorTrait;

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn alice() -> Principal {
    Principal::user("alice")
}

pub fn bob() -> Principal {
    Principal::user("bob")
}

pub fn admin() -> Principal {
    Principal::admin("ops")
}

/// Migrated in-memory store with a 2024..=2026 calendar and two registered
/// users, both bootstrapped on 2025-01-01.
pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .settings(EngineSettings {
            backfill_throttle_ms: 0,
            ..EngineSettings::default()
        })
        .build()
        .await
        .unwrap();
    engine
        .generate_calendar(&admin(), 2024, 2026, false)
        .await
        .unwrap();
    engine.register_user("alice", utc(2025, 1, 1)).await.unwrap();
    engine.register_user("bob", utc(2025, 1, 1)).await.unwrap();
    (engine, db)
}

pub fn budget_details() -> ResourceDetails {
    ResourceDetails::Budget {
        category_ids: vec!["groceries".to_string()],
        is_system_everything_else: false,
    }
}

/// A $1000 monthly budget starting on 2025-01-01.
pub async fn groceries(engine: &Engine) -> RecurringResource {
    engine
        .create_recurring_resource(
            &alice(),
            NewResourceCmd::new(
                "Groceries",
                Money::new(100_000),
                Frequency::Monthly,
                budget_details(),
            )
            .start_date(utc(2025, 1, 1)),
            utc(2025, 1, 1),
        )
        .await
        .unwrap()
}

pub async fn periods_of(engine: &Engine, resource_id: &str) -> Vec<ResourcePeriod> {
    engine.resource_periods(&alice(), resource_id).await.unwrap()
}

/// The period of `resource_id` of type `period_type` containing `at`.
pub async fn period_at(
    engine: &Engine,
    resource_id: &str,
    period_type: PeriodType,
    at: DateTime<Utc>,
) -> ResourcePeriod {
    periods_of(engine, resource_id)
        .await
        .into_iter()
        .find(|p| p.period_type == period_type && p.contains(at))
        .unwrap_or_else(|| panic!("no {period_type} period of {resource_id} at {at}"))
}

pub fn count_of(periods: &[ResourcePeriod], period_type: PeriodType) -> usize {
    periods
        .iter()
        .filter(|p| p.period_type == period_type)
        .count()
}
