use std::{
    error::Error,
    time::{Duration, Instant},
};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use engine::{Engine, Principal, TotalsTarget};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

#[derive(Parser, Debug)]
#[command(name = "cadence_admin")]
#[command(about = "Admin utilities for Cadence (calendar, extension, backfill, totals, users)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./cadence.db?mode=rwc"
    )]
    database_url: String,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Calendar(Calendar),
    /// Materialize resource periods up to the rolling horizon.
    Extend(ExtendArgs),
    /// Rebuild period summaries from the stored resource periods.
    Backfill(BackfillArgs),
    /// Rebuild period running totals from the live transactions.
    Totals(TotalsArgs),
    User(User),
}

#[derive(Args, Debug)]
struct Calendar {
    #[command(subcommand)]
    command: CalendarCommand,
}

#[derive(Subcommand, Debug)]
enum CalendarCommand {
    Generate(CalendarGenerateArgs),
}

#[derive(Args, Debug)]
struct CalendarGenerateArgs {
    /// Defaults to the engine's `calendar_first_year`.
    #[arg(long)]
    year_start: Option<i32>,
    /// Defaults to the engine's `calendar_last_year`.
    #[arg(long)]
    year_end: Option<i32>,
    /// Delete every stored source period first.
    #[arg(long)]
    reset: bool,
}

#[derive(Args, Debug)]
struct ExtendArgs {
    #[arg(long, default_value_t = 9)]
    max_run_minutes: u64,
}

#[derive(Args, Debug)]
struct BackfillArgs {
    #[arg(long)]
    dry_run: bool,
    /// Only rebuild this owner's summaries.
    #[arg(long)]
    user: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct TotalsArgs {
    /// Every period of this resource.
    #[arg(long)]
    resource: Option<String>,
    #[arg(long)]
    period: Option<String>,
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Register(UserRegisterArgs),
}

#[derive(Args, Debug)]
struct UserRegisterArgs {
    #[arg(long)]
    uid: String,
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "cadence_admin={level},engine={level}",
            level = cli.log_level
        ))
        .init();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;
    let operator = Principal::admin("cadence_admin");

    match cli.command {
        Command::Calendar(Calendar {
            command: CalendarCommand::Generate(args),
        }) => {
            let year_start = args
                .year_start
                .unwrap_or(engine.settings().calendar_first_year);
            let year_end = args
                .year_end
                .unwrap_or(engine.settings().calendar_last_year);
            let periods = engine
                .generate_calendar(&operator, year_start, year_end, args.reset)
                .await?;
            println!("generated {periods} source periods for {year_start}..={year_end}");
        }
        Command::Extend(args) => {
            let deadline = Instant::now() + Duration::from_secs(args.max_run_minutes * 60);
            let report = engine
                .extend_recurring_periods(Utc::now(), deadline)
                .await?;
            println!(
                "examined {}, extended {}, skipped {}, periods created {}, failed {}{}",
                report.examined,
                report.extended,
                report.skipped,
                report.periods_created,
                report.failed,
                if report.timed_out { " (timed out)" } else { "" }
            );
        }
        Command::Backfill(args) => {
            let report = engine
                .backfill_summaries(&operator, args.dry_run, args.user.as_deref())
                .await?;
            if report.dry_run {
                println!("dry run: {} summaries would be rebuilt", report.keys);
            } else {
                println!(
                    "rebuilt {} of {} summaries, {} failed",
                    report.rebuilt, report.keys, report.failed
                );
            }
            if report.failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Totals(args) => {
            let target = match (args.resource, args.period) {
                (Some(resource_id), _) => TotalsTarget::Resource(resource_id),
                (None, Some(period_id)) => TotalsTarget::Period(period_id),
                (None, None) => return Err("one of --resource or --period is required".into()),
            };
            let report = engine.recalculate_period_totals(&operator, target).await?;
            println!(
                "recalculated {} periods, {} corrected",
                report.periods, report.corrected
            );
        }
        Command::User(User {
            command: UserCommand::Register(args),
        }) => {
            let budget = engine.register_user(&args.uid, Utc::now()).await?;
            println!(
                "registered user: {} (everything-else budget {})",
                args.uid, budget.id
            );
        }
    }

    Ok(())
}
