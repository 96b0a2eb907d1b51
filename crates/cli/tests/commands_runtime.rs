use std::env;
use std::sync::{Mutex, OnceLock};

use clap::Parser;
use claimdesk_cli::commands::CommandResult;
use claimdesk_cli::{dispatch, Cli};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_file_database() {
    with_env(&[], |db| {
        let result = run_cli(&["migrate", "--database-url", db]);
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn remote_backend_without_token_is_a_config_failure() {
    with_env(&[("CLAIMDESK_STORE_BACKEND", "remote")], |db| {
        let result = run_cli(&["migrate", "--database-url", db]);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("api.token"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[], |db| {
        let first = run_cli(&["seed", "--database-url", db]);
        assert_eq!(first.exit_code, 0, "first seed failed: {}", first.output);
        let second = run_cli(&["seed", "--database-url", db]);
        assert_eq!(second.exit_code, 0, "second seed failed: {}", second.output);

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["data"], second_payload["data"]);
        assert_eq!(first_payload["data"]["claims"].as_array().map(Vec::len), Some(4));
    });
}

#[test]
fn seeded_claims_move_through_the_lifecycle() {
    with_env(&[], |db| {
        assert_eq!(run_cli(&["seed", "--database-url", db]).exit_code, 0);

        let listed = parse_payload(
            &run_cli(&["claims", "--as", "sup-1", "list", "--database-url", db]).output,
        );
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(4));

        let forbidden = run_cli(&["claims", "--as", "emp-1", "approve", "GST-DEMO-001", "--database-url", db]);
        assert_eq!(forbidden.exit_code, 11, "{}", forbidden.output);
        let payload = parse_payload(&forbidden.output);
        assert_eq!(payload["error_class"], "forbidden");
        assert!(payload["correlation_id"].as_str().is_some());

        let approved = run_cli(&[
            "claims",
            "--as",
            "sup-1",
            "--correlation-id",
            "req-cli-1",
            "approve",
            "GST-DEMO-001",
            "--database-url",
            db,
        ]);
        assert_eq!(approved.exit_code, 0, "{}", approved.output);
        let payload = parse_payload(&approved.output);
        assert_eq!(payload["data"]["state"], "approved");
        assert_eq!(payload["data"]["amount"], "60.24");

        let again = run_cli(&["claims", "--as", "sup-1", "approve", "GST-DEMO-001", "--database-url", db]);
        assert_eq!(again.exit_code, 12, "{}", again.output);
        assert_eq!(parse_payload(&again.output)["error_class"], "invalid_transition");

        let paid = run_cli(&["claims", "--as", "acct-1", "pay", "GST-DEMO-001", "--database-url", db]);
        assert_eq!(paid.exit_code, 0, "{}", paid.output);
        assert_eq!(parse_payload(&paid.output)["data"]["state"], "paid");
    });
}

#[test]
fn fuel_submission_computes_the_amount() {
    with_env(&[], |db| {
        assert_eq!(run_cli(&["seed", "--database-url", db]).exit_code, 0);

        let result = run_cli(&[
            "claims",
            "--as",
            "emp-1",
            "submit",
            "--category",
            "combustible",
            "--description",
            "Visita planta",
            "--project",
            "norte",
            "--date",
            "2026-01-15",
            "--distance",
            "120",
            "--rate",
            "0.502",
            "--database-url",
            db,
        ]);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["category"], "fuel");
        assert_eq!(payload["data"]["state"], "pending");
        assert_eq!(payload["data"]["amount"], "60.24");
    });
}

#[test]
fn meal_without_receipt_is_a_validation_failure() {
    with_env(&[], |db| {
        assert_eq!(run_cli(&["seed", "--database-url", db]).exit_code, 0);

        let result = run_cli(&[
            "claims",
            "--as",
            "emp-2",
            "submit",
            "--category",
            "meal",
            "--description",
            "Almuerzo cliente",
            "--project",
            "sur",
            "--date",
            "2026-01-15",
            "--amount",
            "18,50",
            "--database-url",
            db,
        ]);
        assert_eq!(result.exit_code, 10, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["error_class"], "validation");
    });
}

#[test]
fn unknown_actor_is_not_found() {
    with_env(&[], |db| {
        assert_eq!(run_cli(&["migrate", "--database-url", db]).exit_code, 0);

        let result = run_cli(&["claims", "--as", "ghost", "list", "--database-url", db]);
        assert_eq!(result.exit_code, 13, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");
    });
}

#[test]
fn custom_roles_can_be_managed_but_system_roles_cannot() {
    with_env(&[], |db| {
        assert_eq!(run_cli(&["seed", "--database-url", db]).exit_code, 0);

        let created = run_cli(&[
            "roles",
            "create",
            "--name",
            "Regional Lead",
            "--level",
            "6",
            "--permission",
            "claims.view_team",
            "--database-url",
            db,
        ]);
        assert_eq!(created.exit_code, 0, "{}", created.output);
        let role_id = parse_payload(&created.output)["data"]["id"]
            .as_str()
            .map(str::to_string)
            .expect("role id");

        let toggled =
            run_cli(&["roles", "toggle-category", &role_id, "claims", "--database-url", db]);
        assert_eq!(toggled.exit_code, 0, "{}", toggled.output);
        let granted = parse_payload(&toggled.output)["data"]["permissions"]
            .as_array()
            .map(Vec::len)
            .unwrap_or_default();
        assert_eq!(granted, 9, "the whole claims category should be granted");

        let deleted = run_cli(&["roles", "delete", &role_id, "--database-url", db]);
        assert_eq!(deleted.exit_code, 0, "{}", deleted.output);

        let system = run_cli(&["roles", "delete", "employee", "--database-url", db]);
        assert_eq!(system.exit_code, 10, "{}", system.output);
        assert_eq!(parse_payload(&system.output)["error_class"], "validation");
    });
}

#[test]
fn catalog_needs_no_database() {
    with_env(&[], |_| {
        let result = run_cli(&["roles", "catalog"]);
        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"].as_array().map(Vec::len), Some(5));
    });
}

fn run_cli(args: &[&str]) -> CommandResult {
    let argv = std::iter::once("claimdesk").chain(args.iter().copied());
    let cli = Cli::try_parse_from(argv).expect("arguments should parse");
    dispatch(cli)
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce(&str)) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CLAIMDESK_DATABASE_URL",
        "CLAIMDESK_DATABASE_MAX_CONNECTIONS",
        "CLAIMDESK_DATABASE_TIMEOUT_SECS",
        "CLAIMDESK_API_BASE_URL",
        "CLAIMDESK_API_TOKEN",
        "CLAIMDESK_API_REQUEST_TIMEOUT_SECS",
        "CLAIMDESK_STORE_BACKEND",
        "CLAIMDESK_LOGGING_LEVEL",
        "CLAIMDESK_LOGGING_FORMAT",
        "CLAIMDESK_LOG_LEVEL",
        "CLAIMDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let dir = TempDir::new().expect("temp dir");
    let database_url = format!("sqlite://{}", dir.path().join("claimdesk.db").display());
    test_fn(&database_url);

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
