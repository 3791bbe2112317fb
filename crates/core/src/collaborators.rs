//! Post-booking follow-ups. Both run after the appointment exists and their
//! failures never touch it.

#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::schedule::ConfirmedBooking;
use crate::domain::tenant::TenantConfig;
use crate::errors::ProviderError;

/// Confirmation to the customer and alert to the tenant owner.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_all(&self, tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError>;
}

/// Appends a lead row to the tenant's CRM sheet.
#[async_trait]
pub trait LeadLogger: Send + Sync {
    async fn log_lead(&self, tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError>;
}

/// Used when no messaging or CRM backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct Disabled;

#[async_trait]
impl NotificationDispatcher for Disabled {
    async fn notify_all(&self, tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError> {
        debug!(
            event_name = "notify.disabled",
            tenant_id = %tenant.tenant_id,
            event_id = %booking.event_id,
            "notifications disabled"
        );
        Ok(())
    }
}

#[async_trait]
impl LeadLogger for Disabled {
    async fn log_lead(&self, tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError> {
        debug!(
            event_name = "lead.disabled",
            tenant_id = %tenant.tenant_id,
            event_id = %booking.event_id,
            "lead logging disabled"
        );
        Ok(())
    }
}

/// Keeps every booking it is handed. Can be told to fail after recording.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Recorder {
    received: Mutex<Vec<ConfirmedBooking>>,
    failure: Option<ProviderError>,
}

#[cfg(test)]
impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failure: ProviderError) -> Self {
        Self { failure: Some(failure), ..Self::default() }
    }

    pub fn received(&self) -> Vec<ConfirmedBooking> {
        self.received.lock().map(|received| received.clone()).unwrap_or_default()
    }

    fn record(&self, booking: &ConfirmedBooking) -> Result<(), ProviderError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(booking.clone());
        }
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl NotificationDispatcher for Recorder {
    async fn notify_all(&self, _tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError> {
        self.record(booking)
    }
}

#[cfg(test)]
#[async_trait]
impl LeadLogger for Recorder {
    async fn log_lead(&self, _tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError> {
        self.record(booking)
    }
}
