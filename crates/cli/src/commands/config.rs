use std::env;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use showings_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

/// A rendered setting: dotted key in the file, its environment override, and
/// the effective value.
struct Field {
    key: &'static str,
    env_key: Option<&'static str>,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: Option<&'static str>, value: impl ToString) -> Self {
        Self { key, env_key, value: value.to_string() }
    }
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |field: &Field| {
        field_source(field.key, field.env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        lines.push(render_line(field.key, &field.value, source(&field)));
    }

    if config.tenants.is_empty() {
        lines.push("- tenants = <none>".to_string());
    }
    for tenant in &config.tenants {
        lines.push(format!(
            "- tenants[{}] display_name = {}, calendar_id = {}, timezone = {}, appointment_minutes = {}, credentials_file = {}, owner_phone = {}, inventory_sheet = {}, leads_sheet = {}, whatsapp_token = {}",
            tenant.tenant_id,
            tenant.display_name,
            tenant.calendar_id,
            tenant.timezone.name(),
            tenant.appointment_duration.num_minutes(),
            tenant.credentials_ref.0.display(),
            tenant.owner_contact.phone.as_deref().unwrap_or("<unset>"),
            tenant.inventory_sheet.as_ref().map(|sheet| sheet.spreadsheet_id.as_str()).unwrap_or("<unset>"),
            tenant.leads_sheet.as_ref().map(|sheet| sheet.spreadsheet_id.as_str()).unwrap_or("<unset>"),
            redact_secret(tenant.whatsapp.token.as_ref()),
        ));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("server.bind_address", Some("SHOWINGS_SERVER_BIND_ADDRESS"), &config.server.bind_address),
        Field::new("server.port", Some("SHOWINGS_SERVER_PORT"), config.server.port),
        Field::new(
            "server.graceful_shutdown_secs",
            Some("SHOWINGS_SERVER_GRACEFUL_SHUTDOWN_SECS"),
            config.server.graceful_shutdown_secs,
        ),
        Field::new("calendar.api_base_url", None, &config.calendar.api_base_url),
        Field::new(
            "calendar.request_timeout_secs",
            Some("SHOWINGS_CALENDAR_REQUEST_TIMEOUT_SECS"),
            config.calendar.request_timeout_secs,
        ),
        Field::new("calendar.business_open_hour", None, config.calendar.business_open_hour),
        Field::new("calendar.business_close_hour", None, config.calendar.business_close_hour),
        Field::new("calendar.max_suggestions", None, config.calendar.max_suggestions),
        Field::new("google.token_url", None, &config.google.token_url),
        Field::new("google.sheets_api_base_url", None, &config.google.sheets_api_base_url),
        Field::new("whatsapp.enabled", Some("SHOWINGS_WHATSAPP_ENABLED"), config.whatsapp.enabled),
        Field::new("whatsapp.api_base_url", None, &config.whatsapp.api_base_url),
        Field::new("whatsapp.api_version", None, &config.whatsapp.api_version),
        Field::new(
            "whatsapp.token",
            Some("SHOWINGS_WHATSAPP_TOKEN"),
            redact_secret(config.whatsapp.token.as_ref()),
        ),
        Field::new(
            "whatsapp.phone_number_id",
            Some("SHOWINGS_WHATSAPP_PHONE_NUMBER_ID"),
            config.whatsapp.phone_number_id.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("whatsapp.language_code", None, &config.whatsapp.language_code),
        Field::new(
            "inventory.cache_ttl_secs",
            Some("SHOWINGS_INVENTORY_CACHE_TTL_SECS"),
            config.inventory.cache_ttl_secs,
        ),
        Field::new("inventory.result_limit", None, config.inventory.result_limit),
        Field::new(
            "routing.default_tenant",
            Some("SHOWINGS_ROUTING_DEFAULT_TENANT"),
            config.routing.default_tenant.as_ref().map(|id| id.as_str()).unwrap_or("<unset>"),
        ),
        Field::new("logging.level", Some("SHOWINGS_LOGGING_LEVEL"), &config.logging.level),
        Field::new(
            "logging.format",
            Some("SHOWINGS_LOGGING_FORMAT"),
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most a four-character prefix of a secret so operators can tell
/// tokens apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.len() <= 8 {
        return "<redacted>".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
