use claimdesk_core::config::LoadOptions;
use claimdesk_db::{DemoSeedDataset, VerificationResult};
use serde::Serialize;

use crate::commands::stores::open_pool;
use crate::commands::{
    load_config, runtime, CommandResult, Failure, EXIT_MIGRATION, EXIT_SEED_VERIFICATION,
};

#[derive(Debug, Serialize)]
struct SeedSummary {
    roles: Vec<String>,
    actors: Vec<String>,
    claims: Vec<String>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result("seed"),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return failure.into_result("seed"),
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        let outcome = async {
            let seeded = DemoSeedDataset::load(&pool)
                .await
                .map_err(|error| Failure::new("seed_execution", error.to_string(), EXIT_MIGRATION))?;
            let verification = DemoSeedDataset::verify(&pool).await.map_err(|error| {
                Failure::new("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION)
            })?;
            if !verification.all_present {
                return Err(Failure::new(
                    "seed_verification",
                    verification_message(&verification),
                    EXIT_SEED_VERIFICATION,
                ));
            }
            Ok::<_, Failure>(SeedSummary {
                roles: seeded.roles_seeded,
                actors: seeded.actors_seeded,
                claims: seeded.claims_seeded,
            })
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(summary) => {
            let message = format!(
                "demo dataset loaded: {} roles, {} actors, {} claims",
                summary.roles.len(),
                summary.actors.len(),
                summary.claims.len()
            );
            CommandResult::success_with_data("seed", message, &summary)
        }
        Err(failure) => failure.into_result("seed"),
    }
}

fn verification_message(verification: &VerificationResult) -> String {
    let failed = verification.failed_checks();
    if failed.is_empty() {
        "some demo records failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use claimdesk_db::{VerificationCheck, VerificationResult};

    use super::verification_message;

    fn result(checks: &[(&str, bool)]) -> VerificationResult {
        VerificationResult {
            all_present: checks.iter().all(|(_, passed)| *passed),
            checks: checks
                .iter()
                .map(|(name, passed)| VerificationCheck { name: name.to_string(), passed: *passed })
                .collect(),
        }
    }

    #[test]
    fn verification_message_names_failed_checks() {
        let verification =
            result(&[("role:employee", true), ("claim:GST-DEMO-001", false), ("actor:sup-1", false)]);
        assert_eq!(
            verification_message(&verification),
            "seed verification failed for checks: claim:GST-DEMO-001, actor:sup-1"
        );
    }

    #[test]
    fn verification_message_falls_back_without_labels() {
        let verification = result(&[]);
        assert_eq!(verification_message(&verification), "some demo records failed to load");
    }
}
