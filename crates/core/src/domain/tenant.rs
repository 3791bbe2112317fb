use std::fmt;
use std::path::PathBuf;

use chrono::Duration;
use chrono_tz::Tz;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// External agent identifier assigned by the voice platform.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to the service-account key file used for Google APIs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CredentialsRef(pub PathBuf);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnerContact {
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetRef {
    pub spreadsheet_id: String,
    pub range: String,
}

#[derive(Clone, Debug, Default)]
pub struct WhatsAppOverride {
    pub token: Option<SecretString>,
    pub phone_number_id: Option<String>,
}

/// Operating parameters of one brokerage account. Loaded once at startup and
/// never mutated afterwards.
#[derive(Clone, Debug)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    pub display_name: String,
    pub credentials_ref: CredentialsRef,
    pub calendar_id: String,
    pub timezone: Tz,
    pub appointment_duration: Duration,
    pub owner_contact: OwnerContact,
    pub inventory_sheet: Option<SheetRef>,
    pub leads_sheet: Option<SheetRef>,
    pub whatsapp: WhatsAppOverride,
}

impl TenantConfig {
    /// Minimal tenant with a one-hour appointment length; used by tests and the
    /// offline CLI simulation.
    pub fn new(
        tenant_id: impl Into<String>,
        display_name: impl Into<String>,
        calendar_id: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        Self {
            tenant_id: TenantId::new(tenant_id),
            display_name: display_name.into(),
            credentials_ref: CredentialsRef(PathBuf::new()),
            calendar_id: calendar_id.into(),
            timezone,
            appointment_duration: Duration::hours(1),
            owner_contact: OwnerContact::default(),
            inventory_sheet: None,
            leads_sheet: None,
            whatsapp: WhatsAppOverride::default(),
        }
    }
}
