use ledgerbot_core::config::LoadOptions;
use ledgerbot_db::{connect_with_settings, migrations, DemoSeed, SeedProductInfo};

use crate::commands::{async_runtime, load_config, CommandResult, EXIT_DATABASE, EXIT_MIGRATION};

const EXIT_SEED_VERIFICATION: u8 = 6;

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seed_result = DemoSeed::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoSeed::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;

        let run_result: Result<Vec<SeedProductInfo>, (&'static str, String, u8)> =
            if verification.all_present {
                Ok(seed_result.products_seeded)
            } else {
                Err((
                    "seed_verification",
                    verification_failure(&verification.checks),
                    EXIT_SEED_VERIFICATION,
                ))
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(products) => CommandResult::success("seed", seed_message(&products)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_message(products: &[SeedProductInfo]) -> String {
    let lines: Vec<String> = products
        .iter()
        .map(|product| {
            format!("  - {}: {} (opening stock {})", product.sku, product.name, product.opening_stock)
        })
        .collect();
    format!("demo catalog loaded with {} products:\n{}", products.len(), lines.join("\n"))
}

fn verification_failure(checks: &[(&'static str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use ledgerbot_db::SeedProductInfo;

    use super::{seed_message, verification_failure};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [
            ("BC-BRACELET-GOLD", true),
            ("stock-bracelet-gold", false),
            ("stock-keychain", false),
        ];

        assert_eq!(
            verification_failure(&checks),
            "Seed verification failed for checks: stock-bracelet-gold, stock-keychain"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("BC-KEYCHAIN", true), ("stock-keychain", true)];
        assert_eq!(verification_failure(&checks), "Some seed data failed to load");
    }

    #[test]
    fn seed_message_lists_opening_stock() {
        let products = [SeedProductInfo {
            sku: "BC-BRACELET-BLACK",
            name: "Pulsera de Granos de Café - Negra",
            opening_stock: 0,
        }];
        assert_eq!(
            seed_message(&products),
            "demo catalog loaded with 1 products:\n  - BC-BRACELET-BLACK: Pulsera de Granos de Café - Negra (opening stock 0)"
        );
    }
}
