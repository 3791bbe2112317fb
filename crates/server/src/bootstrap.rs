use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use showings_core::calendar::{CalendarProvider, TimeoutCalendar};
use showings_core::collaborators::{Disabled, NotificationDispatcher};
use showings_core::config::AppConfig;
use showings_core::dispatch::FunctionCallHandler;
use showings_core::domain::tenant::TenantId;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::google::auth::ServiceAccountAuth;
use crate::google::calendar::GoogleCalendar;
use crate::google::sheets::{SheetsClient, SheetsInventory, SheetsLeadLogger};
use crate::whatsapp::WhatsAppNotifier;
use crate::{health, webhook};

pub struct Application {
    pub config: AppConfig,
    pub handler: Arc<FunctionCallHandler>,
}

impl Application {
    pub fn router(&self) -> Router {
        Router::new()
            .merge(webhook::router(self.handler.clone()))
            .merge(health::router(health::HealthState::from_registry(self.handler.registry())))
            .layer(TraceLayer::new_for_http())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("credentials file for tenant `{tenant_id}` is not readable: `{path}`")]
    Credentials { tenant_id: TenantId, path: String },
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        tenants = config.tenants.len(),
        "starting application bootstrap"
    );

    for tenant in &config.tenants {
        if !tenant.credentials_ref.0.is_file() {
            return Err(BootstrapError::Credentials {
                tenant_id: tenant.tenant_id.clone(),
                path: tenant.credentials_ref.0.display().to_string(),
            });
        }
    }

    let timeout = Duration::from_secs(config.calendar.request_timeout_secs);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let tokens = Arc::new(ServiceAccountAuth::new(client.clone(), config.google.token_url.clone()));
    let google_calendar = Arc::new(GoogleCalendar::new(
        client.clone(),
        config.calendar.api_base_url.clone(),
        tokens.clone(),
    ));
    let calendar: Arc<dyn CalendarProvider> = Arc::new(TimeoutCalendar::new(google_calendar, timeout));

    let sheets = Arc::new(SheetsClient::new(client.clone(), config.google.sheets_api_base_url.clone(), tokens));
    let inventory = Arc::new(SheetsInventory::new(
        sheets.clone(),
        Duration::from_secs(config.inventory.cache_ttl_secs),
    ));
    let leads = Arc::new(SheetsLeadLogger::new(sheets));

    let notifier: Arc<dyn NotificationDispatcher> = if config.whatsapp.enabled {
        Arc::new(WhatsAppNotifier::new(client, config.whatsapp.clone()))
    } else {
        Arc::new(Disabled)
    };

    let handler = FunctionCallHandler::from_config(&config, calendar, inventory, notifier, leads);
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        whatsapp_enabled = config.whatsapp.enabled,
        default_tenant = config
            .routing
            .default_tenant
            .as_ref()
            .map(TenantId::as_str)
            .unwrap_or("none"),
        "function-call handler wired"
    );

    Ok(Application { config, handler: Arc::new(handler) })
}
