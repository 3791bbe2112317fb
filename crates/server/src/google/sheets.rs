//! Google Sheets v4: inventory source and CRM lead log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use showings_core::collaborators::LeadLogger;
use showings_core::domain::schedule::ConfirmedBooking;
use showings_core::domain::tenant::{CredentialsRef, SheetRef, TenantConfig, TenantId};
use showings_core::errors::ProviderError;
use showings_core::inventory::{InventoryStore, InventoryTable};
use tracing::{debug, info};

use super::auth::{authorization, AccessTokens};
use super::{endpoint, ensure_success, transport_error};

pub const LEAD_TEMPERATURE: &str = "Caliente";
pub const LEAD_STATUS: &str = "Agendado";

pub struct SheetsClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokens>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetsClient {
    pub fn new(client: Client, base_url: impl Into<String>, tokens: Arc<dyn AccessTokens>) -> Self {
        Self { client, base_url: base_url.into(), tokens }
    }

    pub async fn values(
        &self,
        credentials: &CredentialsRef,
        sheet: &SheetRef,
    ) -> Result<Vec<Vec<String>>, ProviderError> {
        let token = self.tokens.bearer(credentials).await?;
        let url =
            endpoint(&self.base_url, &["spreadsheets", &sheet.spreadsheet_id, "values", &sheet.range])?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .send()
            .await
            .map_err(transport_error)?;
        let range: ValueRange = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| ProviderError::Decode(format!("values.get: {error}")))?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    /// `values:append` with `USER_ENTERED` input, so dates and numbers are
    /// parsed by the sheet.
    pub async fn append_row(
        &self,
        credentials: &CredentialsRef,
        sheet: &SheetRef,
        row: Vec<String>,
    ) -> Result<(), ProviderError> {
        let token = self.tokens.bearer(credentials).await?;
        let append_target = format!("{}:append", sheet.range);
        let url =
            endpoint(&self.base_url, &["spreadsheets", &sheet.spreadsheet_id, "values", &append_target])?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

/// Inventory read from each tenant's sheet and kept per tenant for a fixed
/// time-to-live.
pub struct SheetsInventory {
    sheets: Arc<SheetsClient>,
    cache: Cache<TenantId, Arc<InventoryTable>>,
}

impl SheetsInventory {
    pub fn new(sheets: Arc<SheetsClient>, ttl: Duration) -> Self {
        Self { sheets, cache: Cache::builder().max_capacity(1_000).time_to_live(ttl).build() }
    }
}

#[async_trait]
impl InventoryStore for SheetsInventory {
    async fn load(&self, tenant: &TenantConfig) -> Result<Arc<InventoryTable>, ProviderError> {
        if let Some(table) = self.cache.get(&tenant.tenant_id).await {
            return Ok(table);
        }
        let Some(sheet) = &tenant.inventory_sheet else {
            return Ok(Arc::new(InventoryTable::default()));
        };

        let values = self.sheets.values(&tenant.credentials_ref, sheet).await?;
        let table = Arc::new(InventoryTable::from_sheet_values(values));
        debug!(
            event_name = "inventory.sheet_fetched",
            tenant_id = %tenant.tenant_id,
            rows = table.rows().len(),
            "inventory sheet fetched and cached"
        );
        self.cache.insert(tenant.tenant_id.clone(), table.clone()).await;
        Ok(table)
    }
}

/// Lead row for a confirmed booking, timestamped in the tenant zone.
pub fn lead_row(tenant: &TenantConfig, booking: &ConfirmedBooking) -> Vec<String> {
    vec![
        Utc::now().with_timezone(&tenant.timezone).format("%Y-%m-%d %H:%M:%S").to_string(),
        booking.customer_name.clone(),
        booking.customer_phone.clone(),
        LEAD_TEMPERATURE.to_string(),
        LEAD_STATUS.to_string(),
    ]
}

pub struct SheetsLeadLogger {
    sheets: Arc<SheetsClient>,
}

impl SheetsLeadLogger {
    pub fn new(sheets: Arc<SheetsClient>) -> Self {
        Self { sheets }
    }
}

#[async_trait]
impl LeadLogger for SheetsLeadLogger {
    async fn log_lead(&self, tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError> {
        let Some(sheet) = &tenant.leads_sheet else {
            debug!(
                event_name = "lead.skipped",
                tenant_id = %tenant.tenant_id,
                "tenant has no leads sheet"
            );
            return Ok(());
        };
        self.sheets.append_row(&tenant.credentials_ref, sheet, lead_row(tenant, booking)).await?;
        info!(
            event_name = "lead.logged",
            tenant_id = %tenant.tenant_id,
            event_id = %booking.event_id,
            "lead appended to CRM sheet"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Path, Query, State};
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use chrono_tz::America::Bogota;
    use serde_json::{json, Value};
    use showings_core::collaborators::LeadLogger;
    use showings_core::domain::schedule::ConfirmedBooking;
    use showings_core::domain::tenant::{SheetRef, TenantConfig, TenantId};
    use showings_core::inventory::InventoryStore;

    use super::{lead_row, SheetsClient, SheetsInventory, SheetsLeadLogger};
    use crate::google::auth::StaticToken;

    #[derive(Clone, Default)]
    struct FakeSheets {
        reads: Arc<AtomicUsize>,
        appended: Arc<Mutex<Vec<(String, String, Value)>>>,
    }

    async fn serve(fake: FakeSheets) -> String {
        let app = Router::new()
            .route(
                "/spreadsheets/{sheet_id}/values/{range}",
                get(|State(fake): State<FakeSheets>| async move {
                    fake.reads.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "range": "inventario!A1:C3",
                        "values": [
                            ["Codigo", "Ciudad", "Precio_Total_COP"],
                            ["A-1", "Medellín", "$450.000.000"],
                            ["A-2", "Bogotá", 380000000]
                        ]
                    }))
                })
                .post(
                    |State(fake): State<FakeSheets>,
                     Path((_, range)): Path<(String, String)>,
                     Query(query): Query<std::collections::HashMap<String, String>>,
                     Json(body): Json<Value>| async move {
                        let option = query.get("valueInputOption").cloned().unwrap_or_default();
                        if let Ok(mut appended) = fake.appended.lock() {
                            appended.push((range, option, body));
                        }
                        Json(json!({"updates": {"updatedRows": 1}}))
                    },
                ),
            )
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}")
    }

    fn client(base_url: &str) -> Arc<SheetsClient> {
        Arc::new(SheetsClient::new(
            reqwest::Client::new(),
            base_url,
            Arc::new(StaticToken("test-token".to_string().into())),
        ))
    }

    fn tenant() -> TenantConfig {
        let mut tenant = TenantConfig::new("agent_demo", "Demo", "agenda@inmo.co", Bogota);
        tenant.inventory_sheet =
            Some(SheetRef { spreadsheet_id: "inv-1".to_string(), range: "inventario!A:ZZ".to_string() });
        tenant.leads_sheet =
            Some(SheetRef { spreadsheet_id: "crm-1".to_string(), range: "Leads!A:E".to_string() });
        tenant
    }

    fn booking() -> ConfirmedBooking {
        let start = Bogota.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("start");
        ConfirmedBooking {
            tenant_id: TenantId::new("agent_demo"),
            event_id: "evt-1".to_string(),
            calendar_id: "agenda@inmo.co".to_string(),
            customer_name: "Ana".to_string(),
            customer_phone: "573001112233".to_string(),
            property_of_interest: None,
            advisor_name: None,
            start,
            end: start + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn inventory_is_fetched_once_within_ttl() {
        let fake = FakeSheets::default();
        let base_url = serve(fake.clone()).await;
        let store = SheetsInventory::new(client(&base_url), Duration::from_secs(300));

        let first = store.load(&tenant()).await.expect("table");
        let second = store.load(&tenant()).await.expect("table");

        assert_eq!(first.rows().len(), 2);
        assert_eq!(first.rows()[1]["precio_total_cop"], json!(380_000_000u64));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fake.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tenant_without_inventory_sheet_has_empty_table() {
        let store = SheetsInventory::new(client("http://127.0.0.1:9"), Duration::from_secs(300));
        let mut tenant = tenant();
        tenant.inventory_sheet = None;

        assert!(store.load(&tenant).await.expect("table").is_empty());
    }

    #[tokio::test]
    async fn lead_row_is_appended_user_entered() {
        let fake = FakeSheets::default();
        let base_url = serve(fake.clone()).await;
        let logger = SheetsLeadLogger::new(client(&base_url));

        logger.log_lead(&tenant(), &booking()).await.expect("appended");

        let appended = fake.appended.lock().map(|rows| rows.clone()).unwrap_or_default();
        assert_eq!(appended.len(), 1);
        let (range, option, body) = &appended[0];
        assert_eq!(range, "Leads!A:E:append");
        assert_eq!(option, "USER_ENTERED");
        assert_eq!(body["values"][0][1], "Ana");
        assert_eq!(body["values"][0][3], "Caliente");
        assert_eq!(body["values"][0][4], "Agendado");
    }

    #[test]
    fn lead_row_has_five_columns() {
        let row = lead_row(&tenant(), &booking());
        assert_eq!(row.len(), 5);
        assert_eq!(&row[1..], ["Ana", "573001112233", "Caliente", "Agendado"]);
    }
}
