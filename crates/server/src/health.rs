use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use showings_core::tenancy::TenantRegistry;

#[derive(Clone)]
pub struct HealthState {
    tenants: usize,
    default_tenant: Option<String>,
}

impl HealthState {
    pub fn from_registry(registry: &TenantRegistry) -> Self {
        Self {
            tenants: registry.len(),
            default_tenant: registry.default_tenant().map(|tenant_id| tenant_id.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub tenants: HealthCheck,
    pub default_tenant: Option<String>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let tenants = if state.tenants > 0 {
        HealthCheck { status: "ready", detail: format!("{} tenant(s) registered", state.tenants) }
    } else {
        HealthCheck { status: "degraded", detail: "no tenants registered".to_string() }
    };
    let ready = tenants.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "showings-server runtime initialized".to_string(),
        },
        tenants,
        default_tenant: state.default_tenant,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
