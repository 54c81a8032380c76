use pricewise_db::{connect_with_settings, migrations, seed_default_catalog, CatalogSeedResult};
use tracing::info;

use crate::commands::{prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = seed_default_catalog(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8));

        pool.close().await;
        seeded
    });

    match result {
        Ok(seeded) => {
            info!(
                event_name = "cli.seed.completed",
                tiers = seeded.tiers,
                levels = seeded.levels,
                services = seeded.services,
            );
            CommandResult::success("seed", describe(&seeded))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn describe(seeded: &CatalogSeedResult) -> String {
    format!(
        "default catalog loaded: {} tiers, {} levels, {} services, {} availability rules",
        seeded.tiers, seeded.levels, seeded.services, seeded.availability_rules
    )
}
