//! EventGate maintenance tool
//!
//! Connects to the registration database, applies pending migrations and
//! audits every upcoming event. Exits non-zero when any event violates a
//! registration invariant.

use anyhow::{bail, Context};
use tracing::{info, warn};

use eventgate::{
    config::Settings,
    database::{connection::{create_pool, health_check, run_migrations, DatabaseConfig}, PgStore},
    utils::{helpers::format_timestamp, logging},
    RegistrationEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;
    settings.validate()?;

    // Initialize logging, the guard flushes the log file on exit
    let _guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", eventgate::info());

    // Initialize database connection
    info!("Connecting to database...");
    let pool = create_pool(&DatabaseConfig::from(&settings.database)).await?;
    health_check(&pool).await?;

    info!("Running database migrations...");
    run_migrations(&pool).await?;

    let engine = RegistrationEngine::new(PgStore::new(pool), settings.registration.clone())?;

    info!("Auditing upcoming events...");
    let reports = engine.audit_upcoming().await?;

    let mut violations = 0;
    for report in &reports {
        if report.is_clean() {
            info!(
                event_id = %report.event_id,
                occupancy = report.occupancy,
                capacity = ?report.capacity,
                "Event is consistent"
            );
        } else {
            warn!(
                event_id = %report.event_id,
                violations = report.violations.len(),
                "Event has invariant violations"
            );
            violations += report.violations.len();
        }
    }

    info!(
        events = reports.len(),
        violations = violations,
        finished_at = %format_timestamp(chrono::Utc::now()),
        "Audit finished"
    );

    if violations > 0 {
        bail!("{} invariant violations found across {} events", violations, reports.len());
    }

    Ok(())
}
