use std::sync::Arc;

use engine::Principal;
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod scheduler;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "cadence={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let Some(server) = settings.server else {
        tracing::warn!("no server settings found, nothing to do");
        return Ok(());
    };
    tracing::info!("Found server settings...");

    let db = parse_database(&server.database).await?;
    let engine = engine::Engine::builder()
        .database(db)
        .settings(settings.engine)
        .build()
        .await?;

    let first_year = engine.settings().calendar_first_year;
    let last_year = engine.settings().calendar_last_year;
    let generated = engine
        .generate_calendar(&Principal::admin("system"), first_year, last_year, false)
        .await?;
    tracing::info!(generated, first_year, last_year, "calendar ready");

    let engine = Arc::new(engine);
    let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
    let addr = format!("{}:{}", bind, server.port);

    let server_engine = Arc::clone(&engine);
    tasks.spawn(async move {
        if let Err(err) = server::run(server_engine, &addr).await {
            tracing::error!("server failed: {err}");
        }
    });

    if settings.scheduler.enabled {
        tracing::info!("Found scheduler settings...");
        tasks.spawn(scheduler::run(Arc::clone(&engine), settings.scheduler));
    }

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
