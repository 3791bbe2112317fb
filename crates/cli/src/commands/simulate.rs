use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use showings_core::calendar::memory::InMemoryCalendar;
use showings_core::collaborators::Disabled;
use showings_core::config::{AppConfig, LoadOptions};
use showings_core::dispatch::FunctionCallHandler;
use showings_core::inventory::memory::StaticInventory;

use super::{load_config, read_payload, CommandResult, EXIT_RUNTIME};

const COMMAND: &str = "simulate";

#[derive(Debug, Serialize)]
struct SimulationReport {
    command: &'static str,
    status: &'static str,
    outcome: &'static str,
    tenant_id: Option<String>,
    operation: Option<String>,
    result: String,
    calendar_calls: Vec<String>,
}

/// Full dispatch with the configured tenants, an empty in-memory calendar,
/// an empty inventory and no-op notification and lead logging.
pub fn run(options: LoadOptions, payload: &Path) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let body = match read_payload(COMMAND, payload) {
        Ok(body) => body,
        Err(result) => return result,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    CommandResult::report(&runtime.block_on(simulate(&config, body)))
}

async fn simulate(config: &AppConfig, body: Value) -> SimulationReport {
    let calendar = Arc::new(InMemoryCalendar::new());
    let handler = FunctionCallHandler::from_config(
        config,
        calendar.clone(),
        Arc::new(StaticInventory::new()),
        Arc::new(Disabled),
        Arc::new(Disabled),
    );

    let mut reply = handler.handle(body, "cli-simulate").await;
    if let Some(follow_up) = reply.follow_up.take() {
        let _ = follow_up.await;
    }

    SimulationReport {
        command: COMMAND,
        status: "ok",
        outcome: reply.outcome,
        tenant_id: reply.tenant_id.map(|tenant_id| tenant_id.to_string()),
        operation: reply.operation.map(|operation| operation.to_string()),
        result: reply.text,
        calendar_calls: calendar
            .calls()
            .into_iter()
            .map(|(call, calendar_id)| format!("{call:?} {calendar_id}"))
            .collect(),
    }
}
