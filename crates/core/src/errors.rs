use std::time::Duration;

use thiserror::Error;

use crate::domain::tenant::TenantId;

/// Failure of a call to an external provider (calendar, sheets, messaging).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: &'static str, after: Duration },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

/// Field a clarification asks the caller for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingField {
    Date,
    CustomerPhone,
    CustomerName,
    StartTime,
}

impl MissingField {
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Date => "¿Para qué fecha te gustaría revisar la disponibilidad?",
            Self::CustomerPhone => "Necesito confirmar tu número de WhatsApp para poder agendar.",
            Self::CustomerName => "¿A nombre de quién agendo la cita?",
            Self::StartTime => "¿Para qué día y a qué hora te gustaría la cita?",
        }
    }
}

/// Every way a function call can fail to produce its normal answer. None of
/// these ever reaches the voice platform as a transport error; each one has a
/// spoken rendering.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("tenant `{}` is not configured", tenant_label(.tenant_id))]
    Configuration { tenant_id: Option<TenantId> },
    #[error("missing required argument: {field:?}")]
    Validation { field: MissingField },
    #[error("unparseable argument `{field}`: `{value}`")]
    InvalidArgument { field: &'static str, value: String },
    #[error("could not determine operation: {detail}")]
    InferenceAmbiguous { detail: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("requested slot is not available")]
    Conflict,
}

fn tenant_label(tenant_id: &Option<TenantId>) -> &str {
    tenant_id.as_ref().map(TenantId::as_str).unwrap_or("default")
}

impl CallError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Validation { .. } | Self::InvalidArgument { .. } => "validation",
            Self::InferenceAmbiguous { .. } => "inference_ambiguous",
            Self::Provider(_) => "provider",
            Self::Conflict => "conflict",
        }
    }

    pub fn spoken_message(&self) -> String {
        match self {
            Self::Configuration { .. } => {
                "Lo siento, el sistema no está configurado para esta línea. Por favor intenta más tarde."
                    .to_string()
            }
            Self::Validation { field } => field.prompt().to_string(),
            Self::InvalidArgument { field: "fecha", .. } => {
                "No entendí la fecha. ¿Me la puedes repetir, por ejemplo, el 5 de diciembre?"
                    .to_string()
            }
            Self::InvalidArgument { .. } => {
                "No entendí bien la fecha y hora. ¿Me las puedes repetir?".to_string()
            }
            Self::InferenceAmbiguous { .. } => {
                "Función no reconocida por el sistema. ¿Quieres buscar inmuebles, revisar disponibilidad o agendar una cita?"
                    .to_string()
            }
            Self::Provider(_) => {
                "Tuve un problema técnico en este momento. ¿Lo intentamos de nuevo en un momento?"
                    .to_string()
            }
            Self::Conflict => "Ese horario ya está ocupado. ¿Te queda bien otra hora?".to_string(),
        }
    }
}
