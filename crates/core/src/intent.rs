//! Request interpretation: turns a decoded inbound call into a tenant plus a
//! concrete operation, inferring the operation from argument keys when the
//! caller did not name it.
//!
//! Inference follows [`INTENT_PRIORITY`], a fixed table evaluated top to bottom.
//! Booking outranks everything so a caller who already gave a phone number is
//! never bounced back into an inventory search loop. When nothing matches,
//! the call becomes an availability check; it never defaults to booking.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::call::{keys, Arguments, InboundCall, Operation, RequestEnvelope, Resolution};
use crate::domain::schedule::BookingRequest;
use crate::domain::tenant::{TenantConfig, TenantId};
use crate::errors::{CallError, MissingField};
use crate::inventory::InventoryFilters;
use crate::tenancy::TenantRegistry;

/// One row of the inference table.
#[derive(Clone, Copy, Debug)]
pub struct IntentRule {
    pub priority: u8,
    pub operation: Operation,
    pub label: &'static str,
    pub matches: fn(&Arguments) -> bool,
}

pub const INTENT_PRIORITY: &[IntentRule] = &[
    IntentRule {
        priority: 1,
        operation: Operation::BookAppointment,
        label: "booking_fields",
        matches: booking_fields_present,
    },
    IntentRule {
        priority: 2,
        operation: Operation::SearchInventory,
        label: "inventory_filters",
        matches: inventory_filters_present,
    },
    IntentRule {
        priority: 3,
        operation: Operation::CheckAvailability,
        label: "availability_fields",
        matches: availability_fields_present,
    },
];

pub const FALLBACK_OPERATION: Operation = Operation::CheckAvailability;
pub const FALLBACK_LABEL: &str = "fallback_availability";

fn booking_fields_present(args: &Arguments) -> bool {
    args.any_present(keys::CUSTOMER_PHONE)
        || (args.any_present(keys::CUSTOMER_NAME) && args.any_present(keys::START_TIME))
}

fn inventory_filters_present(args: &Arguments) -> bool {
    args.any_present(keys::CITY)
        || args.any_present(keys::OPERATION_TYPE)
        || args.any_present(keys::MAX_BUDGET)
}

fn availability_fields_present(args: &Arguments) -> bool {
    args.any_present(keys::DATE) || args.any_present(keys::ADVISOR_CALENDAR)
}

/// Picks the operation for an argument map. Returns the matching rule label.
pub fn infer_operation(args: &Arguments) -> (Operation, &'static str) {
    INTENT_PRIORITY
        .iter()
        .find(|rule| (rule.matches)(args))
        .map(|rule| (rule.operation, rule.label))
        .unwrap_or((FALLBACK_OPERATION, FALLBACK_LABEL))
}

#[derive(Clone, Debug)]
pub struct IntentResolver {
    registry: Arc<TenantRegistry>,
}

impl IntentResolver {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    pub fn resolve(
        &self,
        call: InboundCall,
        correlation_id: &str,
    ) -> Result<(Arc<TenantConfig>, RequestEnvelope), CallError> {
        match call {
            InboundCall::Standard { agent_id, name, args } => {
                let tenant = self.registry.resolve(&TenantId::new(agent_id))?;
                let operation = Operation::from_function_name(&name).ok_or_else(|| {
                    warn!(
                        event_name = "intent.unrecognized_function",
                        correlation_id,
                        tenant_id = %tenant.tenant_id,
                        function_name = %name,
                        "explicit function name is not supported"
                    );
                    CallError::InferenceAmbiguous { detail: format!("unknown function `{name}`") }
                })?;

                debug!(
                    event_name = "intent.standard",
                    correlation_id,
                    tenant_id = %tenant.tenant_id,
                    operation = %operation,
                    "standard call resolved"
                );

                let envelope = RequestEnvelope {
                    tenant_id: tenant.tenant_id.clone(),
                    operation,
                    arguments: args,
                    resolution: Resolution::Standard,
                };
                Ok((tenant, envelope))
            }
            InboundCall::Flat { agent_hint, name_hint, args } => {
                let tenant = match agent_hint {
                    Some(agent_id) => self.registry.resolve(&TenantId::new(agent_id))?,
                    None => self.registry.resolve_default()?,
                };
                let named = name_hint.as_deref().and_then(Operation::from_function_name);
                let (operation, resolution) = match named {
                    Some(operation) => {
                        debug!(
                            event_name = "intent.named_flat",
                            correlation_id,
                            tenant_id = %tenant.tenant_id,
                            operation = %operation,
                            "flat call names its function"
                        );
                        (operation, Resolution::Named)
                    }
                    None => {
                        let (operation, rule) = infer_operation(&args);
                        info!(
                            event_name = "intent.inferred",
                            correlation_id,
                            tenant_id = %tenant.tenant_id,
                            operation = %operation,
                            rule,
                            named_function = name_hint.as_deref().unwrap_or("none"),
                            argument_keys = ?args.present_keys(),
                            "operation inferred from argument keys"
                        );
                        (operation, Resolution::Inferred { rule })
                    }
                };

                let envelope = RequestEnvelope {
                    tenant_id: tenant.tenant_id.clone(),
                    operation,
                    arguments: args,
                    resolution,
                };
                Ok((tenant, envelope))
            }
        }
    }
}

/// Validated, typed arguments for one operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationRequest {
    SearchInventory(InventoryFilters),
    CheckAvailability { date: NaiveDate, advisor_calendar_id: Option<String> },
    BookAppointment(BookingRequest),
}

impl OperationRequest {
    /// Extracts the arguments an operation needs. A missing required field
    /// becomes a clarification for exactly that field.
    pub fn from_envelope(envelope: &RequestEnvelope) -> Result<Self, CallError> {
        let args = &envelope.arguments;
        match envelope.operation {
            Operation::SearchInventory => Ok(Self::SearchInventory(InventoryFilters {
                city: args.text(keys::CITY),
                operation_type: args.text(keys::OPERATION_TYPE),
                max_budget: args.amount(keys::MAX_BUDGET),
            })),
            Operation::CheckAvailability => {
                let raw = args
                    .text(keys::DATE)
                    .or_else(|| args.text(keys::START_TIME))
                    .ok_or(CallError::Validation { field: MissingField::Date })?;
                let date = parse_date(&raw)
                    .ok_or(CallError::InvalidArgument { field: "fecha", value: raw })?;
                Ok(Self::CheckAvailability {
                    date,
                    advisor_calendar_id: args.text(keys::ADVISOR_CALENDAR),
                })
            }
            Operation::BookAppointment => {
                let customer_phone = args
                    .text(keys::CUSTOMER_PHONE)
                    .ok_or(CallError::Validation { field: MissingField::CustomerPhone })?;
                let customer_name = args
                    .text(keys::CUSTOMER_NAME)
                    .ok_or(CallError::Validation { field: MissingField::CustomerName })?;
                let requested_start = args
                    .text(keys::START_TIME)
                    .ok_or(CallError::Validation { field: MissingField::StartTime })?;
                Ok(Self::BookAppointment(BookingRequest {
                    customer_name,
                    customer_phone,
                    requested_start,
                    property_of_interest: args.text(keys::PROPERTY),
                    advisor_name: args.text(keys::ADVISOR_NAME),
                    advisor_calendar_id: args.text(keys::ADVISOR_CALENDAR),
                }))
            }
        }
    }
}

/// Calendar date of `YYYY-MM-DD`, `DD/MM/YYYY`, or the date part of an ISO
/// date-time.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .ok()
}
