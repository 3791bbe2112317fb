use std::fs;

use chrono::{Offset, Utc};
use serde::Serialize;
use serde_json::Value;
use showings_core::config::{AppConfig, LoadOptions};

use super::{CommandResult, EXIT_RUNTIME};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 4] =
    ["tenant_registry", "credential_files", "tenant_timezones", "default_tenant_routing"];

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_RUNTIME };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_tenant_registry(&config));
            checks.push(check_credential_files(&config));
            checks.push(check_timezones(&config));
            checks.push(check_default_tenant(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_tenant_registry(config: &AppConfig) -> DoctorCheck {
    if config.tenants.is_empty() {
        return DoctorCheck::fail("tenant_registry", "no tenants configured; every call will be rejected");
    }
    let ids: Vec<&str> = config.tenants.iter().map(|tenant| tenant.tenant_id.as_str()).collect();
    DoctorCheck::pass("tenant_registry", format!("{} tenant(s): {}", ids.len(), ids.join(", ")))
}

/// Each key file must be readable JSON carrying a service-account identity.
fn check_credential_files(config: &AppConfig) -> DoctorCheck {
    if config.tenants.is_empty() {
        return DoctorCheck::skipped("credential_files", "no tenants configured");
    }

    let mut problems = Vec::new();
    for tenant in &config.tenants {
        let path = &tenant.credentials_ref.0;
        let parsed = fs::read_to_string(path)
            .map_err(|error| error.to_string())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|error| error.to_string()));
        match parsed {
            Ok(key) if key.get("client_email").and_then(Value::as_str).is_some() => {}
            Ok(_) => problems.push(format!(
                "{}: `{}` has no client_email",
                tenant.tenant_id,
                path.display()
            )),
            Err(error) => {
                problems.push(format!("{}: `{}` ({error})", tenant.tenant_id, path.display()))
            }
        }
    }

    if problems.is_empty() {
        DoctorCheck::pass("credential_files", "all service-account key files readable")
    } else {
        DoctorCheck::fail("credential_files", problems.join("; "))
    }
}

fn check_timezones(config: &AppConfig) -> DoctorCheck {
    if config.tenants.is_empty() {
        return DoctorCheck::skipped("tenant_timezones", "no tenants configured");
    }

    let now = Utc::now();
    let zones: Vec<String> = config
        .tenants
        .iter()
        .map(|tenant| {
            let offset = now.with_timezone(&tenant.timezone).offset().fix();
            format!("{}={} ({offset})", tenant.tenant_id, tenant.timezone.name())
        })
        .collect();
    DoctorCheck::pass("tenant_timezones", zones.join(", "))
}

fn check_default_tenant(config: &AppConfig) -> DoctorCheck {
    match &config.routing.default_tenant {
        Some(tenant_id) => DoctorCheck::pass(
            "default_tenant_routing",
            format!("calls without an agent id route to `{tenant_id}`"),
        ),
        None => DoctorCheck::skipped(
            "default_tenant_routing",
            "no default tenant; calls without an agent id will be rejected",
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
