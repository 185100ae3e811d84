use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{Datelike, Utc};
use http_body_util::BodyExt;
use sea_orm::Database;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower::ServiceExt;

use api_types::{
    admin::{BackfillView, TotalsView},
    period::{ChecklistItemView, PeriodList, PeriodView},
    resource::ResourceView,
    summary::SummaryView,
    transaction::TransactionView,
    user::UserRegistered,
};
use engine::{Engine, EngineSettings, Principal};
use migration::MigratorTrait;
use server::{ServerState, router};

async fn app() -> Router {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .settings(EngineSettings {
            backfill_throttle_ms: 0,
            ..EngineSettings::default()
        })
        .build()
        .await
        .unwrap();
    engine
        .generate_calendar(&Principal::admin("ops"), 2024, Utc::now().year() + 2, false)
        .await
        .unwrap();
    router(ServerState {
        engine: Arc::new(engine),
    })
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some((uid, role)) = user {
        request = request
            .header("x-principal-id", uid)
            .header("x-principal-role", role);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

const ALICE: Option<(&str, &str)> = Some(("alice", "user"));
const BOB: Option<(&str, &str)> = Some(("bob", "user"));
const OPS: Option<(&str, &str)> = Some(("ops", "admin"));

async fn create_groceries(app: &Router) -> ResourceView {
    let (status, body) = call(
        app,
        Method::POST,
        "/resources",
        ALICE,
        Some(json!({
            "kind": "budget",
            "name": "Groceries",
            "amount_minor": 100_000,
            "frequency": "monthly",
            "start_date": "2025-01-01T00:00:00+00:00",
            "category_ids": ["groceries"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    parse(&body)
}

#[tokio::test]
async fn requests_without_a_principal_are_rejected() {
    let app = app().await;
    let (status, _) = call(&app, Method::GET, "/resources", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_is_idempotent() {
    let app = app().await;
    let (status, body) = call(&app, Method::POST, "/users/register", ALICE, None).await;
    assert_eq!(status, StatusCode::OK);
    let first: UserRegistered = parse(&body);
    let (_, body) = call(&app, Method::POST, "/users/register", ALICE, None).await;
    let second: UserRegistered = parse(&body);
    assert_eq!(first.everything_else_id, second.everything_else_id);
    assert_eq!(first.user_id, "alice");
}

#[tokio::test]
async fn budget_lifecycle_over_http() {
    let app = app().await;
    let budget = create_groceries(&app).await;
    assert!(!budget.is_everything_else);
    assert!(budget.periods_generated_until.is_some());

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/resources/{}/periods", budget.id),
        ALICE,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let periods: PeriodList = parse(&body);
    assert_eq!(periods.periods.len(), 12 + 24 + 53);

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/resources/{}", budget.id),
        BOB,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/resources/{}", budget.id),
        ALICE,
        Some(json!({ "name": "Food" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let renamed: ResourceView = parse(&body);
    assert_eq!(renamed.name, "Food");

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/resources/{}", budget.id),
        ALICE,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/resources/{}", budget.id),
        ALICE,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_resources_are_unprocessable() {
    let app = app().await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/resources",
        ALICE,
        Some(json!({
            "kind": "budget",
            "name": "  ",
            "amount_minor": 100,
            "frequency": "monthly",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn transactions_feed_periods_and_summaries() {
    let app = app().await;
    let budget = create_groceries(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/transactions",
        ALICE,
        Some(json!({
            "amount_minor": 2_500,
            "merchant": "Market",
            "occurred_at": "2025-03-10T12:00:00+01:00",
            "splits": [{ "amount_minor": 2_500, "budget_id": budget.id }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tx: TransactionView = parse(&body);
    assert_eq!(tx.splits.len(), 1);
    assert!(!tx.deleted);

    let period_id = format!("{}_2025M03", budget.id);
    let (_, body) = call(&app, Method::GET, &format!("/periods/{period_id}"), ALICE, None).await;
    let march: PeriodView = parse(&body);
    assert_eq!(march.spent_minor, 2_500);
    assert_eq!(march.status, "PENDING");

    let (status, body) = call(
        &app,
        Method::GET,
        "/summaries/monthly/2025M03",
        ALICE,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let summary: SummaryView = parse(&body);
    assert_eq!(summary.id, "user_alice_monthly_2025M03");
    assert_eq!(summary.totals.budgets_spent_minor, 2_500);

    let (_, body) = call(
        &app,
        Method::GET,
        "/summaries/monthly/2025M03?include_entries=false",
        ALICE,
        None,
    )
    .await;
    let bare: SummaryView = parse(&body);
    assert!(bare.budgets.is_empty());
    assert_eq!(bare.totals.budgets_spent_minor, 2_500);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/transactions/{}", tx.id),
        ALICE,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = call(&app, Method::GET, &format!("/periods/{period_id}"), ALICE, None).await;
    let march: PeriodView = parse(&body);
    assert_eq!(march.spent_minor, 0);
}

#[tokio::test]
async fn unknown_period_type_is_a_bad_request() {
    let app = app().await;
    let (status, _) = call(&app, Method::GET, "/summaries/daily/2025M03", ALICE, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn allocation_override_marks_the_period() {
    let app = app().await;
    let budget = create_groceries(&app).await;
    let period_id = format!("{}_2025M03", budget.id);

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/periods/{period_id}/allocation"),
        ALICE,
        Some(json!({ "allocated_minor": 80_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let period: PeriodView = parse(&body);
    assert_eq!(period.allocated_minor, 80_000);
    assert!(period.is_modified);
}

#[tokio::test]
async fn checklist_round_trip() {
    let app = app().await;
    let budget = create_groceries(&app).await;
    let period_id = format!("{}_2025M03", budget.id);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/periods/{period_id}/checklist"),
        ALICE,
        Some(json!({ "name": "Milk", "expected_amount_minor": 350 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let item: ChecklistItemView = parse(&body);

    let (_, body) = call(
        &app,
        Method::POST,
        &format!("/periods/{period_id}/checklist/{}/toggle", item.id),
        ALICE,
        None,
    )
    .await;
    let toggled: ChecklistItemView = parse(&body);
    assert!(toggled.is_checked);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/periods/{period_id}/checklist/{}", item.id),
        BOB,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_endpoints_require_the_admin_role() {
    let app = app().await;
    create_groceries(&app).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/admin/backfill",
        ALICE,
        Some(json!({ "dry_run": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::POST, "/admin/extend", ALICE, Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::POST,
        "/admin/backfill",
        OPS,
        Some(json!({ "dry_run": true, "user_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let report: BackfillView = parse(&body);
    assert!(report.dry_run);
    assert_eq!(report.rebuilt, 0);
    assert!(report.keys >= 12 + 24 + 53);
}

#[tokio::test]
async fn totals_recalculation_over_http() {
    let app = app().await;
    let budget = create_groceries(&app).await;
    let body = json!({ "resource_id": budget.id });

    let (status, _) = call(&app, Method::POST, "/admin/totals", ALICE, Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::POST, "/admin/totals", OPS, Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(&app, Method::POST, "/admin/totals", OPS, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let report: TotalsView = parse(&body);
    assert!(report.periods > 0);
    assert_eq!(report.corrected, 0);

    let (status, _) = call(
        &app,
        Method::POST,
        "/admin/totals",
        OPS,
        Some(json!({ "period_id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
