use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use showings_cli::commands::{config, doctor, resolve, simulate};
use showings_core::config::LoadOptions;
use tempfile::TempDir;

#[test]
fn doctor_passes_with_readable_credentials() {
    with_env(&[], || {
        let workspace = Workspace::new(true);

        let result = doctor::run(workspace.options(), true);
        assert_eq!(result.exit_code, 0, "expected all doctor checks to pass: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<&str> =
            payload["checks"].as_array().into_iter().flatten().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(
            names,
            ["config_validation", "tenant_registry", "credential_files", "tenant_timezones", "default_tenant_routing"]
        );
    });
}

#[test]
fn doctor_fails_when_credentials_are_not_a_service_account() {
    with_env(&[], || {
        let workspace = Workspace::new(false);

        let result = doctor::run(workspace.options(), true);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][2]["name"], "credential_files");
        assert_eq!(payload["checks"][2]["status"], "fail");
    });
}

#[test]
fn doctor_skips_dependent_checks_on_invalid_config() {
    with_env(&[("SHOWINGS_SERVER_PORT", "not-a-port")], || {
        let workspace = Workspace::new(true);

        let result = doctor::run(workspace.options(), false);
        assert_eq!(result.exit_code, 4);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] credential_files"));
    });
}

#[test]
fn config_reports_sources_and_redacts_tokens() {
    with_env(&[("SHOWINGS_WHATSAPP_TOKEN", "EAAG-secret-value"), ("SHOWINGS_SERVER_PORT", "9090")], || {
        let workspace = Workspace::new(true);

        let output = config::run(workspace.options());

        assert!(output.contains("- server.port = 9090 (source: env (SHOWINGS_SERVER_PORT))"));
        assert!(output.contains("- routing.default_tenant = agent_demo (source: file ("));
        assert!(output.contains("- logging.level = info (source: default)"));
        assert!(output.contains("- whatsapp.token = EAAG***"));
        assert!(!output.contains("secret-value"));
        assert!(output.contains("- tenants[agent_demo]"));
    });
}

#[test]
fn resolve_prints_inferred_envelope() {
    with_env(&[], || {
        let workspace = Workspace::new(true);
        let payload = workspace.payload(r#"{"fecha": "2025-03-01"}"#);

        let result = resolve::run(workspace.options(), &payload);
        assert_eq!(result.exit_code, 0);

        let report = parse_payload(&result.output);
        assert_eq!(report["status"], "resolved");
        assert_eq!(report["envelope"]["tenant_id"], "agent_demo");
        assert_eq!(report["envelope"]["operation"], "check_availability");
        assert_eq!(report["envelope"]["resolution"]["mode"], "inferred");
    });
}

#[test]
fn resolve_fails_on_missing_payload_file() {
    with_env(&[], || {
        let workspace = Workspace::new(true);

        let result = resolve::run(workspace.options(), Path::new("/nonexistent/call.json"));
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "resolve");
        assert_eq!(payload["error_class"], "payload_unreadable");
    });
}

#[test]
fn simulate_answers_availability_from_empty_calendar() {
    with_env(&[], || {
        let workspace = Workspace::new(true);
        let payload = workspace.payload(
            r#"{"agent_id": "agent_demo", "name": "check_calendar_availability", "args": {"fecha": "2025-03-01"}}"#,
        );

        let result = simulate::run(workspace.options(), &payload);
        assert_eq!(result.exit_code, 0);

        let report = parse_payload(&result.output);
        assert_eq!(report["outcome"], "answered");
        assert_eq!(report["result"], "Tengo disponibilidad a las 9:00 AM, 10:00 AM y 11:00 AM.");
        assert_eq!(report["calendar_calls"][0], "FreeBusy agenda@inmo.co");
    });
}

#[test]
fn simulate_reports_config_failure() {
    with_env(&[("SHOWINGS_ROUTING_DEFAULT_TENANT", "agent_missing")], || {
        let workspace = Workspace::new(true);
        let payload = workspace.payload("{}");

        let result = simulate::run(workspace.options(), &payload);
        assert_eq!(result.exit_code, 2);

        let outcome = parse_payload(&result.output);
        assert_eq!(outcome["status"], "error");
        assert_eq!(outcome["error_class"], "config_validation");
    });
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(valid_credentials: bool) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let credentials = dir.path().join("demo-sa.json");
        let key = if valid_credentials {
            r#"{"client_email": "bot@demo.iam.gserviceaccount.com", "private_key": "unused"}"#
        } else {
            r#"{"type": "authorized_user"}"#
        };
        fs::write(&credentials, key).expect("write credentials");

        let config = format!(
            r#"
[routing]
default_tenant = "agent_demo"

[[tenants]]
agent_id = "agent_demo"
display_name = "Inmobiliaria Demo"
credentials_file = "{}"
calendar_id = "agenda@inmo.co"
timezone = "America/Bogota"
owner_phone = "+573001112233"
"#,
            credentials.display()
        );
        fs::write(dir.path().join("showings.toml"), config).expect("write config");

        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("showings.toml")
    }

    fn options(&self) -> LoadOptions {
        LoadOptions { config_path: Some(self.config_path()), ..LoadOptions::default() }
    }

    fn payload(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("call.json");
        fs::write(&path, body).expect("write payload");
        path
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SHOWINGS_SERVER_BIND_ADDRESS",
        "SHOWINGS_SERVER_PORT",
        "SHOWINGS_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SHOWINGS_CALENDAR_REQUEST_TIMEOUT_SECS",
        "SHOWINGS_ROUTING_DEFAULT_TENANT",
        "SHOWINGS_WHATSAPP_ENABLED",
        "SHOWINGS_WHATSAPP_TOKEN",
        "SHOWINGS_WHATSAPP_PHONE_NUMBER_ID",
        "SHOWINGS_INVENTORY_CACHE_TTL_SECS",
        "SHOWINGS_LOGGING_LEVEL",
        "SHOWINGS_LOGGING_FORMAT",
        "SHOWINGS_LOG_LEVEL",
        "SHOWINGS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
