//! Property inventory search.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::call::parse_amount;
use crate::domain::tenant::TenantConfig;
use crate::errors::ProviderError;

pub const PRICE_COLUMN: &str = "precio_total_cop";
pub const PRICE_FALLBACK_COLUMN: &str = "precio";
pub const CITY_COLUMN: &str = "ciudad";
pub const OPERATION_TYPE_COLUMN: &str = "tipo_operacion";

pub const EMPTY_INVENTORY_MESSAGE: &str = "El inventario está vacío.";
pub const NO_MATCHES_MESSAGE: &str = "No encontré propiedades con esos criterios exactos.";
pub const INVENTORY_FAILURE_MESSAGE: &str = "Error técnico consultando inventario.";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryFilters {
    pub city: Option<String>,
    pub operation_type: Option<String>,
    pub max_budget: Option<u64>,
}

/// Listing rows keyed by header. Price columns hold a number or null.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InventoryTable {
    headers: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl InventoryTable {
    /// Builds the table from raw sheet values; the first row is the header.
    /// Short rows are padded with empty cells.
    pub fn from_sheet_values(values: Vec<Vec<String>>) -> Self {
        let mut values = values.into_iter();
        let Some(header_row) = values.next() else {
            return Self::default();
        };
        let headers = header_row.iter().map(|header| normalize_header(header)).collect::<Vec<_>>();

        let rows = values
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|row| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(index, header)| {
                        let cell = row.get(index).map(String::as_str).unwrap_or_default();
                        (header.clone(), cell_value(header, cell))
                    })
                    .collect::<Map<String, Value>>()
            })
            .collect();

        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows matching every filter, sheet order preserved, at most `limit`.
    pub fn search(&self, filters: &InventoryFilters, limit: usize) -> Vec<&Map<String, Value>> {
        self.rows.iter().filter(|row| matches(row, filters)).take(limit).collect()
    }
}

fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

fn cell_value(header: &str, cell: &str) -> Value {
    if header == PRICE_COLUMN || header == PRICE_FALLBACK_COLUMN {
        return parse_amount(cell).map(Value::from).unwrap_or(Value::Null);
    }
    Value::String(cell.trim().to_string())
}

fn contains_ignoring_case(row: &Map<String, Value>, column: &str, needle: &str) -> bool {
    row.get(column)
        .and_then(Value::as_str)
        .map(|cell| cell.to_lowercase().contains(&needle.trim().to_lowercase()))
        .unwrap_or(false)
}

fn matches(row: &Map<String, Value>, filters: &InventoryFilters) -> bool {
    if let Some(city) = &filters.city {
        if !contains_ignoring_case(row, CITY_COLUMN, city) {
            return false;
        }
    }
    if let Some(operation_type) = &filters.operation_type {
        if !contains_ignoring_case(row, OPERATION_TYPE_COLUMN, operation_type) {
            return false;
        }
    }
    if let Some(max_budget) = filters.max_budget {
        let price = [PRICE_COLUMN, PRICE_FALLBACK_COLUMN]
            .iter()
            .find_map(|column| row.get(*column).and_then(Value::as_u64));
        if !price.is_some_and(|price| price <= max_budget) {
            return false;
        }
    }
    true
}

/// Spoken answer for a search over `table`.
pub fn describe(table: &InventoryTable, filters: &InventoryFilters, limit: usize) -> String {
    if table.is_empty() {
        return EMPTY_INVENTORY_MESSAGE.to_string();
    }
    let found = table.search(filters, limit);
    if found.is_empty() {
        return NO_MATCHES_MESSAGE.to_string();
    }
    let listing = serde_json::to_string(&found).unwrap_or_default();
    format!("Encontré estas opciones: {listing}")
}

/// Source of a tenant's listing table.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn load(&self, tenant: &TenantConfig) -> Result<Arc<InventoryTable>, ProviderError>;
}

pub struct InventorySearch {
    store: Arc<dyn InventoryStore>,
    limit: usize,
}

impl InventorySearch {
    pub fn new(store: Arc<dyn InventoryStore>, limit: usize) -> Self {
        Self { store, limit: limit.max(1) }
    }

    pub async fn search(&self, tenant: &TenantConfig, filters: &InventoryFilters) -> String {
        match self.store.load(tenant).await {
            Ok(table) => {
                debug!(
                    event_name = "inventory.loaded",
                    tenant_id = %tenant.tenant_id,
                    rows = table.rows().len(),
                    "inventory table available"
                );
                describe(&table, filters, self.limit)
            }
            Err(error) => {
                warn!(
                    event_name = "inventory.load_failed",
                    tenant_id = %tenant.tenant_id,
                    error = %error,
                    "inventory lookup degraded"
                );
                INVENTORY_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

pub mod memory {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{InventoryStore, InventoryTable};
    use crate::domain::tenant::{TenantConfig, TenantId};
    use crate::errors::ProviderError;

    /// Fixed tables per tenant. Tenants without one get an empty table.
    #[derive(Default)]
    pub struct StaticInventory {
        tables: HashMap<TenantId, Arc<InventoryTable>>,
    }

    impl StaticInventory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_table(mut self, tenant_id: TenantId, table: InventoryTable) -> Self {
            self.tables.insert(tenant_id, Arc::new(table));
            self
        }
    }

    #[async_trait]
    impl InventoryStore for StaticInventory {
        async fn load(&self, tenant: &TenantConfig) -> Result<Arc<InventoryTable>, ProviderError> {
            Ok(self.tables.get(&tenant.tenant_id).cloned().unwrap_or_default())
        }
    }
}
