use std::sync::Arc;
use std::time::Instant;

use crate::commands::CommandResult;
use pricewise_core::catalog::{CachedCatalog, CatalogLoader};
use pricewise_core::config::{AppConfig, LoadOptions};
use pricewise_core::domain::quote::{QuoteStatus, UserId};
use pricewise_core::domain::step::Step;
use pricewise_core::wizard::{RecoveryApplied, WizardController, WizardPorts, WizardSettings};
use pricewise_db::{
    connect_in_memory, migrations, seed_default_catalog, DbPool, SqlCatalogLoader,
    SqlPersistenceGateway,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

/// Every check in run order; anything not reached is reported as skipped.
const CHECKS: [&str; 7] = [
    "config_validation",
    "db_connectivity",
    "migration_visibility",
    "catalog_seed",
    "wizard_session",
    "draft_recovery",
    "quote_submission",
];

const SMOKE_VISITOR: &str = "smoke-visitor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Runs a complete configurator session against a private in-memory
/// database; the configured database is not opened.
pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(pass(
                "config_validation",
                elapsed_ms,
                "configuration loaded and validated",
            ));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("config_validation", elapsed_ms, error.to_string()));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(fail(
                "db_connectivity",
                0,
                format!("failed to initialize async runtime: {error}"),
            ));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    runtime.block_on(run_session(&mut checks, config.wizard_settings(), &config.wizard.currency));
    finalize_report(checks, elapsed_since(started))
}

async fn run_session(checks: &mut Vec<SmokeCheck>, settings: WizardSettings, currency: &str) {
    let db_started = Instant::now();
    let pool = match connect_in_memory().await {
        Ok(pool) => pool,
        Err(error) => {
            checks.push(fail(
                "db_connectivity",
                elapsed_since(db_started),
                format!("failed to connect: {error}"),
            ));
            return;
        }
    };
    checks.push(pass("db_connectivity", elapsed_since(db_started), "opened scratch database"));

    let migration_started = Instant::now();
    if let Err(error) = migrations::run_pending(&pool).await {
        checks.push(fail(
            "migration_visibility",
            elapsed_since(migration_started),
            format!("migration execution failed: {error}"),
        ));
        pool.close().await;
        return;
    }
    checks.push(pass(
        "migration_visibility",
        elapsed_since(migration_started),
        "migrations are visible and executable",
    ));

    let seed_started = Instant::now();
    match seed_default_catalog(&pool).await {
        Ok(seeded) => checks.push(pass(
            "catalog_seed",
            elapsed_since(seed_started),
            format!("{} tiers and {} services available", seeded.tiers, seeded.services),
        )),
        Err(error) => {
            checks.push(fail("catalog_seed", elapsed_since(seed_started), error.to_string()));
            pool.close().await;
            return;
        }
    }

    let outcome = drive_wizard(checks, &pool, settings, currency).await;
    if let Err((name, started, message)) = outcome {
        checks.push(fail(name, elapsed_since(started), message));
    }
    pool.close().await;
}

type StageFailure = (&'static str, Instant, String);

/// Configures a Pro quote, recovers it in a fresh session and submits it.
async fn drive_wizard(
    checks: &mut Vec<SmokeCheck>,
    pool: &DbPool,
    settings: WizardSettings,
    currency: &str,
) -> Result<(), StageFailure> {
    let stage = "wizard_session";
    let started = Instant::now();
    let fail_with = |message: String| (stage, started, message);

    let (mut wizard, _, catalog) = session(pool, settings);
    let tiers = catalog.list_tiers().await.map_err(|error| fail_with(error.to_string()))?;
    let tier = tiers
        .into_iter()
        .find(|tier| tier.id.0 == "pro")
        .ok_or_else(|| fail_with("seeded catalog has no `pro` tier".to_string()))?;
    let level = tier
        .levels
        .iter()
        .find(|level| level.id.0 == "pro-standard")
        .cloned()
        .ok_or_else(|| fail_with("seeded catalog has no `pro-standard` level".to_string()))?;
    let offered = catalog
        .list_services(Some(&tier.id), Some(&level.id))
        .await
        .map_err(|error| fail_with(error.to_string()))?;

    wizard.select_tier(tier);
    wizard.select_level(level).map_err(|error| fail_with(error.to_string()))?;
    for service in offered.into_iter().take(2) {
        wizard.toggle_service(service);
    }
    wizard.settle_autosave().await;
    let draft_id = wizard
        .draft_id()
        .ok_or_else(|| fail_with("auto-save did not produce a draft".to_string()))?;
    let expected_total = wizard.configuration().total_price();
    wizard.close();
    checks.push(pass(
        stage,
        elapsed_since(started),
        format!("draft {} saved at {}", draft_id.0, Step::Optional),
    ));

    let stage = "draft_recovery";
    let started = Instant::now();
    let fail_with = |message: String| (stage, started, message);

    let (mut resumed, gateway, _) = session(pool, settings);
    match resumed.initialize().await.map_err(|error| fail_with(error.to_string()))? {
        RecoveryApplied::Draft { step: Step::Optional, .. } => {}
        other => return Err(fail_with(format!("unexpected recovery outcome {other:?}"))),
    }
    if resumed.configuration().total_price() != expected_total {
        return Err(fail_with(format!(
            "recovered total {} differs from saved {}",
            price(resumed.configuration().total_price(), currency),
            price(expected_total, currency)
        )));
    }
    checks.push(pass(
        stage,
        elapsed_since(started),
        format!(
            "draft restored at {} with total {}",
            resumed.current_step(),
            price(expected_total, currency)
        ),
    ));

    let stage = "quote_submission";
    let started = Instant::now();
    let fail_with = |message: String| (stage, started, message);

    resumed.advance();
    let quote = resumed.submit_quote().await.map_err(|error| fail_with(error.to_string()))?;
    let records = gateway.records().await.map_err(|error| fail_with(error.to_string()))?;
    let stored = records
        .iter()
        .any(|record| record.status == QuoteStatus::Submitted && record.id == quote.id.0);
    if !stored || resumed.current_step() != Step::Success {
        return Err(fail_with(format!("quote {} was not stored as submitted", quote.id.0)));
    }
    info!(
        event_name = "cli.smoke.quote_submitted",
        quote_id = %quote.id.0,
        total_price = %quote.total_price,
        currency,
    );
    checks.push(pass(
        stage,
        elapsed_since(started),
        format!(
            "quote {} submitted with total {}",
            quote.id.0,
            price(quote.total_price, currency)
        ),
    ));

    Ok(())
}

fn session(
    pool: &DbPool,
    settings: WizardSettings,
) -> (WizardController, Arc<SqlPersistenceGateway>, Arc<CachedCatalog<SqlCatalogLoader>>) {
    let gateway =
        Arc::new(SqlPersistenceGateway::new(pool.clone(), UserId(SMOKE_VISITOR.to_string())));
    let catalog = Arc::new(CachedCatalog::new(SqlCatalogLoader::new(pool.clone())));
    let ports = WizardPorts::new(gateway.clone(), catalog.clone());
    (WizardController::new(ports, settings), gateway, catalog)
}

fn price(amount: Decimal, currency: &str) -> String {
    format!("{amount} {currency}")
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn elapsed_since(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn pass(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn fail(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(mut checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    for name in CHECKS {
        if !checks.iter().any(|check| check.name == name) {
            checks.push(skipped(name));
        }
    }

    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
