pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use claimdesk_core::config::{ConfigOverrides, LoadOptions, StoreBackend};

use crate::commands::claims::ClaimsArgs;
use crate::commands::roles::RolesAction;

#[derive(Debug, Parser)]
#[command(
    name = "claimdesk",
    about = "Claimdesk operator CLI",
    long_about = "Run expense-claim lifecycle operations, manage roles and permissions, and operate the local claim store.",
    after_help = "Examples:\n  claimdesk migrate\n  claimdesk claims --as emp-1 submit --category fuel --description \"Site visit\" --project north --distance 120 --rate 0.502\n  claimdesk claims --as sup-1 approve GST-DEMO-001\n  claimdesk roles toggle-category regional-lead claims"
)]
pub struct Cli {
    /// Config file; defaults to claimdesk.toml or config/claimdesk.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[arg(long, global = true, value_name = "sqlite|remote")]
    backend: Option<StoreBackend>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the idempotent demo team, roles and claims")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Expense-claim lifecycle operations performed as a given actor")]
    Claims(ClaimsArgs),
    #[command(about = "Role and permission registry administration")]
    Roles {
        #[command(subcommand)]
        action: RolesAction,
    },
}

impl Cli {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                store_backend: self.backend,
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn execute(cli: Cli) -> ExitCode {
    let result = dispatch(cli);
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Runs the parsed command and returns its JSON payload without printing it.
pub fn dispatch(cli: Cli) -> commands::CommandResult {
    let options = cli.load_options();

    match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Claims(args) => commands::claims::run(&options, args),
        Command::Roles { action } => commands::roles::run(&options, action),
    }
}
