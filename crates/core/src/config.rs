use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::tenant::{
    CredentialsRef, OwnerContact, SheetRef, TenantConfig, TenantId, WhatsAppOverride,
};

pub const DEFAULT_INVENTORY_RANGE: &str = "inventario!A:ZZ";
pub const DEFAULT_LEADS_RANGE: &str = "Leads!A:E";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub calendar: CalendarConfig,
    pub google: GoogleConfig,
    pub whatsapp: WhatsAppConfig,
    pub inventory: InventoryConfig,
    pub routing: RoutingConfig,
    pub logging: LoggingConfig,
    pub tenants: Vec<TenantConfig>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub business_open_hour: u32,
    pub business_close_hour: u32,
    pub max_suggestions: usize,
}

#[derive(Clone, Debug)]
pub struct GoogleConfig {
    pub token_url: String,
    pub sheets_api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub api_version: String,
    pub token: Option<SecretString>,
    pub phone_number_id: Option<String>,
    pub language_code: String,
}

#[derive(Clone, Debug)]
pub struct InventoryConfig {
    pub cache_ttl_secs: u64,
    pub result_limit: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RoutingConfig {
    /// Tenant used when a call arrives without an agent identifier.
    pub default_tenant: Option<TenantId>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub default_tenant: Option<String>,
    pub whatsapp_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            calendar: CalendarConfig {
                api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
                request_timeout_secs: 10,
                business_open_hour: 9,
                business_close_hour: 17,
                max_suggestions: 3,
            },
            google: GoogleConfig {
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                sheets_api_base_url: "https://sheets.googleapis.com/v4".to_string(),
            },
            whatsapp: WhatsAppConfig {
                enabled: false,
                api_base_url: "https://graph.facebook.com".to_string(),
                api_version: "v17.0".to_string(),
                token: None,
                phone_number_id: None,
                language_code: "es".to_string(),
            },
            inventory: InventoryConfig { cache_ttl_secs: 300, result_limit: 3 },
            routing: RoutingConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            tenants: Vec::new(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("showings.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(api_base_url) = calendar.api_base_url {
                self.calendar.api_base_url = api_base_url;
            }
            if let Some(request_timeout_secs) = calendar.request_timeout_secs {
                self.calendar.request_timeout_secs = request_timeout_secs;
            }
            if let Some(business_open_hour) = calendar.business_open_hour {
                self.calendar.business_open_hour = business_open_hour;
            }
            if let Some(business_close_hour) = calendar.business_close_hour {
                self.calendar.business_close_hour = business_close_hour;
            }
            if let Some(max_suggestions) = calendar.max_suggestions {
                self.calendar.max_suggestions = max_suggestions;
            }
        }

        if let Some(google) = patch.google {
            if let Some(token_url) = google.token_url {
                self.google.token_url = token_url;
            }
            if let Some(sheets_api_base_url) = google.sheets_api_base_url {
                self.google.sheets_api_base_url = sheets_api_base_url;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(enabled) = whatsapp.enabled {
                self.whatsapp.enabled = enabled;
            }
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
            if let Some(api_version) = whatsapp.api_version {
                self.whatsapp.api_version = api_version;
            }
            if let Some(whatsapp_token_value) = whatsapp.token {
                self.whatsapp.token = Some(secret_value(whatsapp_token_value));
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = Some(phone_number_id);
            }
            if let Some(language_code) = whatsapp.language_code {
                self.whatsapp.language_code = language_code;
            }
        }

        if let Some(inventory) = patch.inventory {
            if let Some(cache_ttl_secs) = inventory.cache_ttl_secs {
                self.inventory.cache_ttl_secs = cache_ttl_secs;
            }
            if let Some(result_limit) = inventory.result_limit {
                self.inventory.result_limit = result_limit;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(default_tenant) = routing.default_tenant {
                self.routing.default_tenant = Some(TenantId::new(default_tenant));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        self.tenants =
            patch.tenants.into_iter().map(TenantPatch::into_tenant).collect::<Result<_, _>>()?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SHOWINGS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SHOWINGS_SERVER_PORT") {
            self.server.port = parse_u16("SHOWINGS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SHOWINGS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SHOWINGS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOWINGS_CALENDAR_REQUEST_TIMEOUT_SECS") {
            self.calendar.request_timeout_secs =
                parse_u64("SHOWINGS_CALENDAR_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOWINGS_ROUTING_DEFAULT_TENANT") {
            self.routing.default_tenant = Some(TenantId::new(value));
        }

        if let Some(value) = read_env("SHOWINGS_WHATSAPP_ENABLED") {
            self.whatsapp.enabled = parse_bool("SHOWINGS_WHATSAPP_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SHOWINGS_WHATSAPP_TOKEN") {
            self.whatsapp.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SHOWINGS_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(value);
        }

        if let Some(value) = read_env("SHOWINGS_INVENTORY_CACHE_TTL_SECS") {
            self.inventory.cache_ttl_secs = parse_u64("SHOWINGS_INVENTORY_CACHE_TTL_SECS", &value)?;
        }

        let log_level =
            read_env("SHOWINGS_LOGGING_LEVEL").or_else(|| read_env("SHOWINGS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SHOWINGS_LOGGING_FORMAT").or_else(|| read_env("SHOWINGS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(default_tenant) = overrides.default_tenant {
            self.routing.default_tenant = Some(TenantId::new(default_tenant));
        }
        if let Some(enabled) = overrides.whatsapp_enabled {
            self.whatsapp.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_calendar(&self.calendar)?;
        validate_tenants(&self.tenants)?;
        validate_routing(&self.routing, &self.tenants)?;
        validate_whatsapp(&self.whatsapp, &self.tenants)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("showings.toml"), PathBuf::from("config/showings.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if calendar.request_timeout_secs == 0 || calendar.request_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "calendar.request_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if calendar.business_close_hour > 24 {
        return Err(ConfigError::Validation(
            "calendar.business_close_hour must be in range 0..=24".to_string(),
        ));
    }

    if calendar.business_open_hour >= calendar.business_close_hour {
        return Err(ConfigError::Validation(
            "calendar.business_open_hour must be earlier than calendar.business_close_hour"
                .to_string(),
        ));
    }

    if calendar.max_suggestions == 0 {
        return Err(ConfigError::Validation(
            "calendar.max_suggestions must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_tenants(tenants: &[TenantConfig]) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    for tenant in tenants {
        if tenant.tenant_id.as_str().trim().is_empty() {
            return Err(ConfigError::Validation("tenants[].agent_id must not be empty".to_string()));
        }
        if !seen.insert(tenant.tenant_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "tenants[].agent_id `{}` is registered more than once",
                tenant.tenant_id
            )));
        }
        if tenant.calendar_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "tenants[{}].calendar_id must not be empty",
                tenant.tenant_id
            )));
        }
        let minutes = tenant.appointment_duration.num_minutes();
        if !(15..=240).contains(&minutes) {
            return Err(ConfigError::Validation(format!(
                "tenants[{}].appointment_duration_minutes must be in range 15..=240",
                tenant.tenant_id
            )));
        }
    }

    Ok(())
}

fn validate_routing(routing: &RoutingConfig, tenants: &[TenantConfig]) -> Result<(), ConfigError> {
    if let Some(default_tenant) = &routing.default_tenant {
        if !tenants.iter().any(|tenant| &tenant.tenant_id == default_tenant) {
            return Err(ConfigError::Validation(format!(
                "routing.default_tenant `{default_tenant}` is not a registered tenant agent_id"
            )));
        }
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig, tenants: &[TenantConfig]) -> Result<(), ConfigError> {
    if !whatsapp.enabled {
        return Ok(());
    }

    let global_token = whatsapp
        .token
        .as_ref()
        .map(|token| !token.expose_secret().trim().is_empty())
        .unwrap_or(false);
    let tenant_token = tenants.iter().any(|tenant| tenant.whatsapp.token.is_some());
    if !global_token && !tenant_token {
        return Err(ConfigError::Validation(
            "whatsapp.enabled is true but neither whatsapp.token nor any tenant whatsapp_token is configured"
                .to_string(),
        ));
    }

    if !whatsapp.api_base_url.starts_with("http://") && !whatsapp.api_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "whatsapp.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    calendar: Option<CalendarPatch>,
    google: Option<GooglePatch>,
    whatsapp: Option<WhatsAppPatch>,
    inventory: Option<InventoryPatch>,
    routing: Option<RoutingPatch>,
    logging: Option<LoggingPatch>,
    #[serde(default)]
    tenants: Vec<TenantPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    business_open_hour: Option<u32>,
    business_close_hour: Option<u32>,
    max_suggestions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct GooglePatch {
    token_url: Option<String>,
    sheets_api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    enabled: Option<bool>,
    api_base_url: Option<String>,
    api_version: Option<String>,
    token: Option<String>,
    phone_number_id: Option<String>,
    language_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InventoryPatch {
    cache_ttl_secs: Option<u64>,
    result_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    default_tenant: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Deserialize)]
struct TenantPatch {
    agent_id: String,
    display_name: Option<String>,
    credentials_file: PathBuf,
    calendar_id: String,
    timezone: String,
    appointment_duration_minutes: Option<i64>,
    owner_phone: Option<String>,
    owner_email: Option<String>,
    inventory_sheet_id: Option<String>,
    inventory_range: Option<String>,
    leads_sheet_id: Option<String>,
    leads_range: Option<String>,
    whatsapp_token: Option<String>,
    whatsapp_phone_id: Option<String>,
}

impl TenantPatch {
    fn into_tenant(self) -> Result<TenantConfig, ConfigError> {
        let timezone = self.timezone.trim().parse::<Tz>().map_err(|_| {
            ConfigError::Validation(format!(
                "tenants[{}].timezone `{}` is not a known IANA timezone",
                self.agent_id, self.timezone
            ))
        })?;

        let inventory_sheet = self.inventory_sheet_id.map(|spreadsheet_id| SheetRef {
            spreadsheet_id,
            range: self.inventory_range.unwrap_or_else(|| DEFAULT_INVENTORY_RANGE.to_string()),
        });
        let leads_sheet = self.leads_sheet_id.map(|spreadsheet_id| SheetRef {
            spreadsheet_id,
            range: self.leads_range.unwrap_or_else(|| DEFAULT_LEADS_RANGE.to_string()),
        });

        let minutes = self.appointment_duration_minutes.unwrap_or(60);
        if !(15..=240).contains(&minutes) {
            return Err(ConfigError::Validation(format!(
                "tenants[{}].appointment_duration_minutes must be in range 15..=240",
                self.agent_id
            )));
        }

        Ok(TenantConfig {
            display_name: self.display_name.unwrap_or_else(|| self.agent_id.clone()),
            tenant_id: TenantId::new(self.agent_id.trim()),
            credentials_ref: CredentialsRef(self.credentials_file),
            calendar_id: self.calendar_id.trim().to_string(),
            timezone,
            appointment_duration: Duration::minutes(minutes),
            owner_contact: OwnerContact {
                phone: self.owner_phone.filter(|value| !value.trim().is_empty()),
                email: self.owner_email.filter(|value| !value.trim().is_empty()),
            },
            inventory_sheet,
            leads_sheet,
            whatsapp: WhatsAppOverride {
                token: self.whatsapp_token.filter(|value| !value.trim().is_empty()).map(secret_value),
                phone_number_id: self.whatsapp_phone_id.filter(|value| !value.trim().is_empty()),
            },
        })
    }
}
