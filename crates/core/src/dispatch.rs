//! Function-call handling from raw body to spoken reply.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::availability::{summarize, AvailabilityEngine};
use crate::booking::{BookingOutcome, BookingTransactor};
use crate::calendar::CalendarProvider;
use crate::collaborators::{LeadLogger, NotificationDispatcher};
use crate::config::AppConfig;
use crate::domain::call::{InboundCall, Operation};
use crate::domain::schedule::{BookingAttempt, ConfirmedBooking};
use crate::domain::tenant::{TenantConfig, TenantId};
use crate::errors::CallError;
use crate::intent::{IntentResolver, OperationRequest};
use crate::inventory::{InventorySearch, InventoryStore};
use crate::tenancy::TenantRegistry;

pub const BOOKED_MESSAGE: &str =
    "Listo, cita agendada correctamente. Ya te envié la confirmación por WhatsApp.";

/// Spoken reply plus what happened, for logging and the operator CLI.
#[derive(Debug)]
pub struct CallReply {
    pub text: String,
    pub outcome: &'static str,
    pub tenant_id: Option<TenantId>,
    pub operation: Option<Operation>,
    /// Notification and lead logging for a confirmed booking. Dropping the
    /// handle detaches the task.
    pub follow_up: Option<JoinHandle<()>>,
}

impl CallReply {
    fn failed(error: &CallError) -> Self {
        Self {
            text: error.spoken_message(),
            outcome: error.kind(),
            tenant_id: None,
            operation: None,
            follow_up: None,
        }
    }
}

pub struct FunctionCallHandler {
    resolver: IntentResolver,
    availability: AvailabilityEngine,
    booking: BookingTransactor,
    inventory: InventorySearch,
    notifier: Arc<dyn NotificationDispatcher>,
    leads: Arc<dyn LeadLogger>,
}

impl FunctionCallHandler {
    pub fn new(
        registry: Arc<TenantRegistry>,
        availability: AvailabilityEngine,
        booking: BookingTransactor,
        inventory: InventorySearch,
        notifier: Arc<dyn NotificationDispatcher>,
        leads: Arc<dyn LeadLogger>,
    ) -> Self {
        Self {
            resolver: IntentResolver::new(registry),
            availability,
            booking,
            inventory,
            notifier,
            leads,
        }
    }

    /// Wires the engines from configuration around the given providers.
    pub fn from_config(
        config: &AppConfig,
        calendar: Arc<dyn CalendarProvider>,
        inventory: Arc<dyn InventoryStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        leads: Arc<dyn LeadLogger>,
    ) -> Self {
        Self::new(
            Arc::new(TenantRegistry::from_config(config)),
            AvailabilityEngine::from_config(calendar.clone(), &config.calendar),
            BookingTransactor::new(calendar),
            InventorySearch::new(inventory, config.inventory.result_limit),
            notifier,
            leads,
        )
    }

    pub fn registry(&self) -> &TenantRegistry {
        self.resolver.registry()
    }

    /// Never fails: every error becomes a spoken reply.
    pub async fn handle(&self, body: Value, correlation_id: &str) -> CallReply {
        debug!(event_name = "call.received", correlation_id, payload = %body, "function call received");

        let reply = self.handle_inner(body, correlation_id).await;

        info!(
            event_name = "call.completed",
            correlation_id,
            tenant_id = reply.tenant_id.as_ref().map(TenantId::as_str).unwrap_or("unresolved"),
            operation = reply.operation.as_ref().map(Operation::as_str).unwrap_or("unresolved"),
            outcome = reply.outcome,
            "function call answered"
        );
        reply
    }

    async fn handle_inner(&self, body: Value, correlation_id: &str) -> CallReply {
        let call = match InboundCall::decode(body) {
            Ok(call) => call,
            Err(error) => {
                let error = CallError::InferenceAmbiguous { detail: error.to_string() };
                log_call_error(correlation_id, None, &error);
                return CallReply::failed(&error);
            }
        };

        let (tenant, envelope) = match self.resolver.resolve(call, correlation_id) {
            Ok(resolved) => resolved,
            Err(error) => {
                log_call_error(correlation_id, None, &error);
                return CallReply::failed(&error);
            }
        };

        let mut reply = match OperationRequest::from_envelope(&envelope) {
            Ok(request) => self.execute(tenant, request, correlation_id).await,
            Err(error) => {
                log_call_error(correlation_id, Some(tenant.as_ref()), &error);
                CallReply::failed(&error)
            }
        };
        reply.tenant_id = Some(envelope.tenant_id);
        reply.operation = Some(envelope.operation);
        reply
    }

    async fn execute(
        &self,
        tenant: Arc<TenantConfig>,
        request: OperationRequest,
        correlation_id: &str,
    ) -> CallReply {
        match request {
            OperationRequest::SearchInventory(filters) => {
                answered(self.inventory.search(&tenant, &filters).await)
            }
            OperationRequest::CheckAvailability { date, advisor_calendar_id } => answered(
                self.availability
                    .check_availability(&tenant, date, advisor_calendar_id.as_deref())
                    .await,
            ),
            OperationRequest::BookAppointment(booking) => {
                match self.booking.attempt_booking(&tenant, &booking).await {
                    BookingOutcome::Confirmed(confirmed) => CallReply {
                        text: BOOKED_MESSAGE.to_string(),
                        outcome: "booked",
                        tenant_id: None,
                        operation: None,
                        follow_up: Some(self.spawn_follow_up(tenant, confirmed, correlation_id)),
                    },
                    BookingOutcome::Conflict { attempt, .. } => CallReply {
                        text: self.alternatives(&tenant, &attempt, correlation_id).await,
                        outcome: "conflict",
                        tenant_id: None,
                        operation: None,
                        follow_up: None,
                    },
                    BookingOutcome::Invalid { requested_start } => {
                        let error = CallError::InvalidArgument {
                            field: "fecha_hora_inicio",
                            value: requested_start,
                        };
                        log_call_error(correlation_id, Some(tenant.as_ref()), &error);
                        CallReply::failed(&error)
                    }
                }
            }
        }
    }

    /// Open slots on the same day and calendar as the failed attempt. Falls
    /// back to a generic prompt when the lookup itself fails.
    async fn alternatives(
        &self,
        tenant: &TenantConfig,
        attempt: &BookingAttempt,
        correlation_id: &str,
    ) -> String {
        let date = attempt.requested_start.date_naive();
        match self
            .availability
            .open_slots(tenant, date, Some(attempt.target_calendar_id.as_str()))
            .await
        {
            Ok(open) if open.is_empty() => {
                format!("Justo ese horario ya está ocupado. {}", summarize(&open))
            }
            Ok(open) => format!(
                "Justo ese horario ya está ocupado. {} ¿Te sirve alguna de estas?",
                summarize(&open)
            ),
            Err(error) => {
                warn!(
                    event_name = "booking.alternatives_failed",
                    correlation_id,
                    tenant_id = %tenant.tenant_id,
                    error = %error,
                    "could not compute alternative slots"
                );
                CallError::Conflict.spoken_message()
            }
        }
    }

    fn spawn_follow_up(
        &self,
        tenant: Arc<TenantConfig>,
        booking: ConfirmedBooking,
        correlation_id: &str,
    ) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        let leads = self.leads.clone();
        let correlation_id = correlation_id.to_string();

        tokio::spawn(async move {
            let (notified, logged) =
                tokio::join!(notifier.notify_all(&tenant, &booking), leads.log_lead(&tenant, &booking));

            for (step, result) in [("notify", notified), ("lead_log", logged)] {
                if let Err(error) = result {
                    warn!(
                        event_name = "booking.follow_up_failed",
                        correlation_id = %correlation_id,
                        tenant_id = %tenant.tenant_id,
                        event_id = %booking.event_id,
                        step,
                        error = %error,
                        "post-booking step failed; appointment stands"
                    );
                }
            }
        })
    }
}

fn answered(text: String) -> CallReply {
    CallReply { text, outcome: "answered", tenant_id: None, operation: None, follow_up: None }
}

fn log_call_error(correlation_id: &str, tenant: Option<&TenantConfig>, error: &CallError) {
    warn!(
        event_name = "call.error",
        correlation_id,
        tenant_id = tenant.map(|tenant| tenant.tenant_id.as_str()).unwrap_or("unresolved"),
        error_kind = error.kind(),
        error = %error,
        "function call answered with clarification"
    );
}
