//! dnsbl-monitor - DNSBL reconciliation job entry point.

use anyhow::Result;
use tracing::{Instrument, error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use dnsbl_monitor::config::Config;
use dnsbl_monitor::db::Database;
use dnsbl_monitor::dns::checker::DnsblChecker;
use dnsbl_monitor::error::RunError;
use dnsbl_monitor::job::Job;
use dnsbl_monitor::tracker::TrackerClient;

#[tokio::main]
async fn main() -> Result<()> {
    // One JSON record per line on stdout; the scheduler ships them as-is.
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Every record of one execution correlates through this id.
    let job_run_id = Uuid::new_v4();
    let span = tracing::info_span!("job", job_run_id = %job_run_id);

    if let Err(err) = run().instrument(span).await {
        error!(error_code = err.error_code(), error = %err, "run failed");
        return Err(err.into());
    }
    Ok(())
}

async fn run() -> Result<(), RunError> {
    let config = Config::from_env()?;
    info!(
        zones = config.dnsbl_zones.len(),
        dns_concurrency = config.dns_concurrency,
        dry_run = config.dry_run,
        "starting DNSBL monitor"
    );

    let store = Database::connect(&config.db_dsn).await?;
    let tracker = TrackerClient::new(&config)?;
    let checker = DnsblChecker::new(config.dns_timeout, config.dns_concurrency);

    let job = Job::new(config, store, tracker, checker);
    let outcome = job.run().await?;
    info!(
        total_ips = outcome.stats.total_ips,
        "DNSBL monitor finished cleanly"
    );
    Ok(())
}
