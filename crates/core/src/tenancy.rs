//! Read-only registry of configured tenants.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::tenant::{TenantConfig, TenantId};
use crate::errors::CallError;

/// Lookup table built once at startup and shared across requests without
/// synchronization.
#[derive(Clone, Debug, Default)]
pub struct TenantRegistry {
    tenants: HashMap<TenantId, Arc<TenantConfig>>,
    default_tenant: Option<TenantId>,
}

impl TenantRegistry {
    pub fn new(tenants: Vec<TenantConfig>, default_tenant: Option<TenantId>) -> Self {
        let tenants = tenants
            .into_iter()
            .map(|tenant| (tenant.tenant_id.clone(), Arc::new(tenant)))
            .collect();
        Self { tenants, default_tenant }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.tenants.clone(), config.routing.default_tenant.clone())
    }

    pub fn resolve(&self, tenant_id: &TenantId) -> Result<Arc<TenantConfig>, CallError> {
        self.tenants
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| CallError::Configuration { tenant_id: Some(tenant_id.clone()) })
    }

    /// Tenant for calls that do not name one. Only the explicitly configured
    /// default qualifies; registration order is never consulted.
    pub fn resolve_default(&self) -> Result<Arc<TenantConfig>, CallError> {
        match &self.default_tenant {
            Some(tenant_id) => self.resolve(tenant_id),
            None => Err(CallError::Configuration { tenant_id: None }),
        }
    }

    pub fn default_tenant(&self) -> Option<&TenantId> {
        self.default_tenant.as_ref()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
