//! Open-slot computation over a tenant calendar.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::calendar::{resolve_target_calendar, CalendarProvider};
use crate::config::CalendarConfig;
use crate::domain::schedule::{BusyInterval, Slot, TimeWindow};
use crate::domain::tenant::TenantConfig;
use crate::errors::{CallError, ProviderError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusinessHours {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self { open_hour: 9, close_hour: 17 }
    }
}

impl BusinessHours {
    /// `[open, close)` of `date` in `timezone`.
    pub fn window(&self, date: NaiveDate, timezone: Tz) -> Result<(DateTime<Tz>, DateTime<Tz>), CallError> {
        let open = local_instant(date, self.open_hour, timezone)?;
        let close = if self.close_hour >= 24 {
            let next_day = date.succ_opt().ok_or_else(|| invalid_date(date))?;
            local_instant(next_day, 0, timezone)?
        } else {
            local_instant(date, self.close_hour, timezone)?
        };
        Ok((open, close))
    }
}

fn local_instant(date: NaiveDate, hour: u32, timezone: Tz) -> Result<DateTime<Tz>, CallError> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).ok_or_else(|| invalid_date(date))?;
    timezone
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or_else(|| invalid_date(date))
}

fn invalid_date(date: NaiveDate) -> CallError {
    CallError::InvalidArgument { field: "fecha", value: date.to_string() }
}

/// One-hour candidates from `open`, stepping while the slot *starts* before
/// `close`. A slot may end after `close`.
pub fn generate_slots(open: DateTime<Tz>, close: DateTime<Tz>, busy: &[BusyInterval]) -> Vec<Slot> {
    let step = Duration::hours(1);
    let mut slots = Vec::new();
    let mut start = open;
    while start < close {
        let end = start + step;
        let window = TimeWindow::new(start.with_timezone(&Utc), end.with_timezone(&Utc));
        let busy = busy.iter().any(|interval| window.overlaps(interval));
        slots.push(Slot { start, end, busy });
        start = end;
    }
    slots
}

/// Spoken clock time, e.g. `9:00 AM`.
pub fn clock_label(instant: &DateTime<Tz>) -> String {
    instant.format("%-I:%M %p").to_string()
}

pub fn join_spoken(labels: &[String]) -> String {
    match labels {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} y {last}", init.join(", ")),
    }
}

pub fn summarize(open_slots: &[Slot]) -> String {
    if open_slots.is_empty() {
        return FULLY_BOOKED_MESSAGE.to_string();
    }
    let labels = open_slots.iter().map(|slot| clock_label(&slot.start)).collect::<Vec<_>>();
    format!("Tengo disponibilidad a las {}.", join_spoken(&labels))
}

pub const FULLY_BOOKED_MESSAGE: &str =
    "Ese día ya no tengo espacios disponibles. ¿Te gustaría revisar otro día?";

pub const SOFT_FAILURE_MESSAGE: &str =
    "No pude consultar la agenda en este momento. ¿Intentamos con otra fecha o en un momento?";

pub struct AvailabilityEngine {
    calendar: Arc<dyn CalendarProvider>,
    hours: BusinessHours,
    max_suggestions: usize,
}

impl AvailabilityEngine {
    pub fn new(calendar: Arc<dyn CalendarProvider>, hours: BusinessHours, max_suggestions: usize) -> Self {
        Self { calendar, hours, max_suggestions: max_suggestions.max(1) }
    }

    pub fn from_config(calendar: Arc<dyn CalendarProvider>, config: &CalendarConfig) -> Self {
        Self::new(
            calendar,
            BusinessHours { open_hour: config.business_open_hour, close_hour: config.business_close_hour },
            config.max_suggestions,
        )
    }

    /// Every generated slot for `date`, busy ones included, chronological.
    pub async fn slots(
        &self,
        tenant: &TenantConfig,
        date: NaiveDate,
        target_calendar_id: Option<&str>,
    ) -> Result<Vec<Slot>, CallError> {
        let calendar_id = resolve_target_calendar(tenant, target_calendar_id);
        let (open, close) = self.hours.window(date, tenant.timezone)?;
        let window = TimeWindow::new(open.with_timezone(&Utc), close.with_timezone(&Utc));

        let busy = self
            .calendar
            .free_busy(tenant, &calendar_id, window)
            .await
            .map_err(CallError::Provider)?;

        debug!(
            event_name = "availability.free_busy",
            tenant_id = %tenant.tenant_id,
            calendar_id = %calendar_id,
            date = %date,
            busy_intervals = busy.len(),
            "free/busy fetched"
        );

        Ok(generate_slots(open, close, &busy))
    }

    /// First open slots for `date`, at most `max_suggestions`.
    pub async fn open_slots(
        &self,
        tenant: &TenantConfig,
        date: NaiveDate,
        target_calendar_id: Option<&str>,
    ) -> Result<Vec<Slot>, CallError> {
        let slots = self.slots(tenant, date, target_calendar_id).await?;
        Ok(slots.into_iter().filter(|slot| !slot.busy).take(self.max_suggestions).collect())
    }

    /// Spoken availability for `date`. Provider failures degrade to a soft
    /// message instead of an error.
    pub async fn check_availability(
        &self,
        tenant: &TenantConfig,
        date: NaiveDate,
        target_calendar_id: Option<&str>,
    ) -> String {
        match self.open_slots(tenant, date, target_calendar_id).await {
            Ok(open) => summarize(&open),
            Err(error) => {
                log_soft_failure(tenant, date, &error);
                SOFT_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

fn log_soft_failure(tenant: &TenantConfig, date: NaiveDate, error: &CallError) {
    let provider_detail = match error {
        CallError::Provider(ProviderError::Timeout { .. }) => "timeout",
        CallError::Provider(_) => "provider",
        _ => "input",
    };
    warn!(
        event_name = "availability.soft_failure",
        tenant_id = %tenant.tenant_id,
        date = %date,
        failure = provider_detail,
        error = %error,
        "availability degraded to soft failure"
    );
}
