use claimdesk_core::config::LoadOptions;

use crate::commands::stores::open_pool;
use crate::commands::{load_config, runtime, CommandResult, Failure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result("migrate"),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return failure.into_result("migrate"),
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        pool.close().await;
        Ok::<(), Failure>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure.into_result("migrate"),
    }
}
