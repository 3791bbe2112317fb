use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use showings_core::config::LoadOptions;
use showings_core::domain::call::{InboundCall, RequestEnvelope};
use showings_core::errors::CallError;
use showings_core::intent::{IntentResolver, OperationRequest};
use showings_core::tenancy::TenantRegistry;

use super::{load_config, read_payload, CommandResult};

const COMMAND: &str = "resolve";

#[derive(Debug, Serialize)]
struct ResolveReport {
    command: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    envelope: Option<RequestEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clarification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ResolveReport {
    fn resolved(envelope: RequestEnvelope) -> Self {
        Self {
            command: COMMAND,
            status: "resolved",
            envelope: Some(envelope),
            error_class: None,
            clarification: None,
            detail: None,
        }
    }

    /// The envelope is kept when tenant and operation were found but the
    /// arguments were not enough to run it.
    fn clarify(envelope: Option<RequestEnvelope>, error: &CallError) -> Self {
        Self {
            command: COMMAND,
            status: "clarification",
            envelope,
            error_class: Some(error.kind()),
            clarification: Some(error.spoken_message()),
            detail: Some(error.to_string()),
        }
    }
}

/// Runs decoding and intent resolution only; no provider is contacted.
pub fn run(options: LoadOptions, payload: &Path) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let body = match read_payload(COMMAND, payload) {
        Ok(body) => body,
        Err(result) => return result,
    };

    let resolver = IntentResolver::new(Arc::new(TenantRegistry::from_config(&config)));
    CommandResult::report(&resolve(&resolver, body))
}

fn resolve(resolver: &IntentResolver, body: serde_json::Value) -> ResolveReport {
    let call = match InboundCall::decode(body) {
        Ok(call) => call,
        Err(error) => {
            let error = CallError::InferenceAmbiguous { detail: error.to_string() };
            return ResolveReport::clarify(None, &error);
        }
    };

    let envelope = match resolver.resolve(call, "cli-resolve") {
        Ok((_, envelope)) => envelope,
        Err(error) => return ResolveReport::clarify(None, &error),
    };

    match OperationRequest::from_envelope(&envelope) {
        Ok(_) => ResolveReport::resolved(envelope),
        Err(error) => ResolveReport::clarify(Some(envelope), &error),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono_tz::America::Bogota;
    use serde_json::json;
    use showings_core::domain::call::Operation;
    use showings_core::domain::tenant::{TenantConfig, TenantId};
    use showings_core::intent::IntentResolver;
    use showings_core::tenancy::TenantRegistry;

    use super::resolve;

    fn resolver() -> IntentResolver {
        IntentResolver::new(Arc::new(TenantRegistry::new(
            vec![TenantConfig::new("agent_demo", "Demo", "agenda@inmo.co", Bogota)],
            Some(TenantId::new("agent_demo")),
        )))
    }

    #[test]
    fn flat_booking_payload_resolves_to_default_tenant() {
        let report = resolve(
            &resolver(),
            json!({
                "cliente_nombre": "Ana",
                "cliente_telefono": "3001234567",
                "fecha_hora_inicio": "2025-03-01T10:00:00"
            }),
        );

        assert_eq!(report.status, "resolved");
        let envelope = report.envelope.expect("envelope");
        assert_eq!(envelope.tenant_id.as_str(), "agent_demo");
        assert_eq!(envelope.operation, Operation::BookAppointment);
    }

    #[test]
    fn missing_field_reports_the_clarification_with_the_envelope() {
        let report = resolve(
            &resolver(),
            json!({"agent_id": "agent_demo", "name": "book_appointment_and_notify", "args": {"cliente_telefono": "300"}}),
        );

        assert_eq!(report.status, "clarification");
        assert_eq!(report.error_class, Some("validation"));
        assert!(report.envelope.is_some());
    }

    #[test]
    fn unknown_agent_is_a_configuration_error() {
        let report = resolve(&resolver(), json!({"agent_id": "agent_other", "fecha": "2025-03-01"}));

        assert_eq!(report.error_class, Some("configuration"));
        assert!(report.envelope.is_none());
    }
}
