//! Bulk sync: scrape the whole scholar profile and replace the publication table.
//!
//! A full run takes 60-90 minutes because of the per-publication throttle.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use scholar_publications::config::{highlight, AppConfig};
use scholar_publications::scholar::retry::{DynSleeper, TokioSleeper};
use scholar_publications::storage::{Store, StoreSummary, YearAudit};
use scholar_publications::sync::{SyncOrchestrator, SyncReport};
use scholar_publications::{build_fetcher, live_source, logging};

/// Command-line arguments for bulk-sync
#[derive(Parser, Debug)]
#[command(name = "bulk-sync")]
#[command(about = "Fetch every publication from Google Scholar and replace the local store")]
#[command(version)]
struct Args {
    /// Skip the interactive confirmation
    #[arg(short, long)]
    yes: bool,

    /// Print a store summary after a successful sync
    #[arg(long)]
    verify: bool,

    /// Only report publications with missing or implausible years, then exit
    #[arg(long)]
    audit_years: bool,

    /// Scholar profile id (overrides SCHOLAR_ID)
    #[arg(long, env = "SCHOLAR_ID")]
    scholar_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "bulk sync failed");
            eprintln!("bulk sync failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::from_env()?;
    logging::init_tracing(config.debug);
    if let Some(id) = args.scholar_id.filter(|s| !s.trim().is_empty()) {
        config.scholar_id = id.trim().to_string();
    }

    let url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;
    let store = Store::connect(&url).await?;
    tracing::info!("database connection established");

    if args.audit_years {
        print_audit(&store.year_audit().await?);
        return Ok(());
    }

    if !args.yes && !confirm(&config)? {
        println!("Aborted.");
        return Ok(());
    }

    let aliases = highlight::load_aliases(&config.owner_name).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "highlight aliases not loaded");
        Vec::new()
    });
    let sleeper: DynSleeper = Arc::new(TokioSleeper);
    let source = live_source(&config, sleeper.clone())?;
    let fetcher = build_fetcher(&config, source, sleeper, &aliases);
    let orchestrator = SyncOrchestrator::new(fetcher, store.clone(), config.scholar_id.clone());

    let report = orchestrator.sync_now().await?;
    print_report(&report, config.port);

    if args.verify {
        print_summary(&store.summary(10).await?);
    }
    store.close().await;
    Ok(())
}

fn confirm(config: &AppConfig) -> Result<bool> {
    println!("{}", "=".repeat(60));
    println!("{} - complete publications sync", config.owner_name);
    println!("{}", "=".repeat(60));
    println!("Scholar id: {}", config.scholar_id);
    println!("Every publication is fetched one by one; expect 60-90 minutes.");
    println!("Progress is logged every {} publications.", config.fetch.progress_every);
    print!("Replace all stored publications? [y/N] ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_report(r: &SyncReport, port: u16) {
    println!("{}", "=".repeat(60));
    println!("Sync completed");
    println!("{}", "=".repeat(60));
    println!("Total publications:   {}", r.total_publications);
    println!("Skipped (failed):     {}", r.skipped);
    println!("Total citations:      {}", r.total_citations);
    println!("h-index:              {}", r.h_index);
    println!("i10-index:            {}", r.i10_index);
    println!("Fetch time:           {:.0} min", r.fetch_secs / 60.0);
    println!("Database insert time: {:.1} s", r.insert_secs);
    println!("Visit: http://localhost:{port}");
}

fn print_summary(s: &StoreSummary) {
    println!("\nStored publications: {}", s.total_publications);
    println!("Most recent years:");
    for (year, n) in &s.top_years {
        println!("  {year}: {n}");
    }
    match &s.profile {
        Some(p) => println!(
            "Profile: {} | citations {} | h-index {} | updated {}",
            p.name,
            p.total_citations,
            p.h_index,
            p.last_updated.map(|t| t.to_rfc3339()).unwrap_or_default()
        ),
        None => println!("Profile: none stored"),
    }
}

fn print_audit(a: &YearAudit) {
    println!("Publications:            {}", a.total_publications);
    println!("Missing year:            {}", a.unknown_years);
    println!("Implausible year:        {}", a.out_of_range);
    if !a.sample_unknown_titles.is_empty() {
        println!("Examples with no year:");
        for t in &a.sample_unknown_titles {
            let short: String = t.chars().take(50).collect();
            println!("  - {short}");
        }
    }
}
