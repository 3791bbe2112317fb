//! Inbound function-call shapes and the normalized request envelope.
//!
//! The voice platform sends either the standard wrapper
//! `{ "agent_id", "name" | "tool_name", "args": {...} }` or a flat object whose
//! keys are the arguments themselves. [`InboundCall::decode`] tries the strict
//! wrapper first and falls back to the generic map.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::tenant::TenantId;

/// Argument keys understood by the resolver, most specific spelling first.
pub mod keys {
    pub const CUSTOMER_PHONE: &[&str] = &["cliente_telefono", "telefono", "customer_phone"];
    pub const CUSTOMER_NAME: &[&str] = &["cliente_nombre", "nombre", "customer_name"];
    pub const START_TIME: &[&str] = &["fecha_hora_inicio", "start_time"];
    pub const DATE: &[&str] = &["fecha", "date"];
    pub const PROPERTY: &[&str] = &["propiedad_interes", "property_of_interest"];
    pub const ADVISOR_NAME: &[&str] = &["asesor_nombre", "advisor_name"];
    pub const ADVISOR_CALENDAR: &[&str] =
        &["calendario_asesor", "asesor_calendar_id", "advisor_calendar_id"];
    pub const CITY: &[&str] = &["ciudad", "city"];
    pub const OPERATION_TYPE: &[&str] = &["tipo_operacion", "operation_type"];
    pub const MAX_BUDGET: &[&str] = &["presupuesto_max", "max_budget"];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SearchInventory,
    CheckAvailability,
    BookAppointment,
}

impl Operation {
    /// Maps a function name sent by the voice platform. Historical aliases are
    /// accepted; anything else is unrecognized.
    pub fn from_function_name(name: &str) -> Option<Self> {
        match name.trim() {
            "search_inventory" => Some(Self::SearchInventory),
            "check_calendar_availability" | "check_availability" => Some(Self::CheckAvailability),
            "book_appointment_and_notify" | "book_appointment" => Some(Self::BookAppointment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchInventory => "search_inventory",
            Self::CheckAvailability => "check_calendar_availability",
            Self::BookAppointment => "book_appointment_and_notify",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argument mapping of one call. Values stay as JSON scalars; accessors take a
/// list of accepted key spellings and return the first present one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// A key counts as present when its value is non-null and, for strings,
    /// not blank.
    pub fn is_present(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(value_is_present)
    }

    pub fn any_present(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.is_present(key))
    }

    pub fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().filter_map(|key| self.0.get(*key)).find_map(scalar_text)
    }

    /// Integer value of the first present key. Strings are accepted with
    /// currency and thousands separators (`"$300.000.000"`).
    pub fn amount(&self, keys: &[&str]) -> Option<u64> {
        keys.iter().filter_map(|key| self.0.get(*key)).find_map(|value| match value {
            Value::Number(number) => {
                number.as_u64().or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            }
            Value::String(raw) => parse_amount(raw),
            _ => None,
        })
    }

    /// Keys with present values, sorted; used in log lines.
    pub fn present_keys(&self) -> Vec<&str> {
        let mut keys = self
            .0
            .iter()
            .filter(|(_, value)| value_is_present(value))
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }
}

/// Parses amounts such as `"$1,250,000"` or `"300.000.000"` by dropping
/// currency symbols and separators.
pub fn parse_amount(raw: &str) -> Option<u64> {
    let digits = raw
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '$' | ',' | '.' | ' ' | '\u{a0}'))
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok()
}

fn value_is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[derive(Debug, Deserialize)]
struct StandardCall {
    agent_id: String,
    #[serde(alias = "tool_name")]
    name: String,
    args: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("request body is not a JSON object")]
    NotAnObject,
}

/// Decoded inbound body.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundCall {
    /// Self-describing call: tenant, function name and nested arguments.
    Standard { agent_id: String, name: String, args: Arguments },
    /// Anything else. `args` holds every top-level key with a nested `args`
    /// object merged over it; the hints are whatever identifiers were found.
    Flat { agent_hint: Option<String>, name_hint: Option<String>, args: Arguments },
}

impl InboundCall {
    pub fn decode(body: Value) -> Result<Self, DecodeError> {
        if !body.is_object() {
            return Err(DecodeError::NotAnObject);
        }

        if let Ok(call) = serde_json::from_value::<StandardCall>(body.clone()) {
            let agent_id = call.agent_id.trim().to_string();
            let name = call.name.trim().to_string();
            if !agent_id.is_empty() && !name.is_empty() {
                return Ok(Self::Standard { agent_id, name, args: Arguments::new(call.args) });
            }
        }

        let Value::Object(mut fields) = body else {
            return Err(DecodeError::NotAnObject);
        };

        let agent_hint = fields
            .get("agent_id")
            .and_then(scalar_text)
            .or_else(|| fields.get("call").and_then(|call| call.get("agent_id")).and_then(scalar_text));
        let name_hint = ["name", "tool_name"]
            .iter()
            .filter_map(|key| fields.get(*key))
            .find_map(scalar_text);

        if matches!(fields.get("args"), Some(Value::Object(_))) {
            if let Some(Value::Object(nested)) = fields.remove("args") {
                fields.extend(nested);
            }
        }

        Ok(Self::Flat { agent_hint, name_hint, args: Arguments::new(fields) })
    }
}

/// How the operation of an envelope was determined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Resolution {
    Standard,
    /// Flat body whose `name`/`tool_name` is a known function.
    Named,
    Inferred { rule: &'static str },
}

/// Normalized, executable request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestEnvelope {
    pub tenant_id: TenantId,
    pub operation: Operation,
    pub arguments: Arguments,
    pub resolution: Resolution,
}
