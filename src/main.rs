use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use passbook::{config::Config, db::init_db, LedgerService, Repository};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("configuration error")?;

    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));
    let service = LedgerService::new(repo.clone(), config.policy());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(|s| s.as_str()) {
        Some("recalculate") => {
            let count = service.recalculate().await?;
            println!("Recalculated {} ledger records from the transaction log", count);
        }
        Some("drift") => {
            let drift = service.check_replay_drift(None).await?;
            if drift.is_empty() {
                println!("No drift: live records match replay");
            } else {
                for entry in &drift {
                    println!(
                        "{} {}: live {} vs replayed {}",
                        entry.participant,
                        entry.field.as_str(),
                        entry.live,
                        entry.replayed
                    );
                }
                bail!("{} drifted fields", drift.len());
            }
        }
        Some("snapshot") => {
            let month = parse_month(args.get(1))?;
            let snapshot = service.monthly_snapshot(month).await?;
            repo.save_snapshot(&snapshot).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Some("trend") => {
            let from = parse_month(args.get(1))?;
            let months: u32 = args
                .get(2)
                .context("usage: trend YYYY-MM <months>")?
                .parse()
                .context("months must be a positive integer")?;
            let series = service.snapshot_series(from, months).await?;
            for snapshot in &series {
                repo.save_snapshot(snapshot).await?;
                println!(
                    "{}  deposits {}  net {}  portfolio {}",
                    snapshot.month_start,
                    snapshot.total_deposits,
                    snapshot.net_club_value,
                    snapshot.total_portfolio_value
                );
            }
        }
        _ => {
            eprintln!("Usage: passbook <recalculate|drift|snapshot YYYY-MM|trend YYYY-MM N>");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn parse_month(arg: Option<&String>) -> anyhow::Result<NaiveDate> {
    let raw = arg.context("expected a month argument (YYYY-MM)")?;
    NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d")
        .with_context(|| format!("invalid month '{}', expected YYYY-MM", raw))
}
