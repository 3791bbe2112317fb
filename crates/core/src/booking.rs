//! Conflict-checked appointment creation.
//!
//! The check and the write are two separate provider calls. Two concurrent
//! attempts for overlapping slots can both pass the check before either
//! writes; nothing here serializes them.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::calendar::{resolve_target_calendar, CalendarProvider};
use crate::domain::schedule::{BookingAttempt, BookingRequest, ConfirmedBooking, NewAppointment};
use crate::domain::tenant::TenantConfig;
use crate::errors::ProviderError;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Start instant in the tenant zone. An explicit offset is honored and
/// converted; a bare local time is tenant wall-clock time. Local times
/// skipped by a DST transition yield `None`; repeated ones take the earliest.
pub fn parse_requested_start(raw: &str, timezone: Tz) -> Option<DateTime<Tz>> {
    let trimmed = raw.trim();
    if let Ok(absolute) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(absolute.with_timezone(&timezone));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .and_then(|naive| timezone.from_local_datetime(&naive).earliest())
}

/// Calendar record for a confirmed attempt.
pub fn appointment_for(tenant: &TenantConfig, attempt: &BookingAttempt) -> NewAppointment {
    let summary = match &attempt.property_of_interest {
        Some(property) => format!("CITA: {} - {property}", attempt.customer_name),
        None => format!("CITA: {}", attempt.customer_name),
    };

    let mut description = vec![
        format!("Tel: {}", attempt.customer_phone),
        format!(
            "Interés: {}",
            attempt.property_of_interest.as_deref().unwrap_or("No especificado")
        ),
    ];
    if let Some(advisor) = &attempt.advisor_name {
        description.push(format!("Asesor: {advisor}"));
    }

    NewAppointment {
        summary,
        description: description.join("\n"),
        start: attempt.requested_start,
        end: attempt.computed_end,
        attendees: tenant.owner_contact.email.iter().cloned().collect(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictCause {
    SlotTaken { existing_events: usize },
    CheckFailed(ProviderError),
    WriteFailed(ProviderError),
}

impl ConflictCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlotTaken { .. } => "slot_taken",
            Self::CheckFailed(_) => "check_failed",
            Self::WriteFailed(_) => "write_failed",
        }
    }
}

/// Result of one attempt. Every non-confirmed outcome means no appointment
/// was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    Confirmed(ConfirmedBooking),
    Conflict { attempt: BookingAttempt, cause: ConflictCause },
    Invalid { requested_start: String },
}

pub struct BookingTransactor {
    calendar: Arc<dyn CalendarProvider>,
}

impl BookingTransactor {
    pub fn new(calendar: Arc<dyn CalendarProvider>) -> Self {
        Self { calendar }
    }

    /// Resolves the request against the tenant into a concrete attempt.
    pub fn prepare(&self, tenant: &TenantConfig, request: &BookingRequest) -> Option<BookingAttempt> {
        let requested_start = parse_requested_start(&request.requested_start, tenant.timezone)?;
        Some(BookingAttempt {
            tenant_id: tenant.tenant_id.clone(),
            target_calendar_id: resolve_target_calendar(
                tenant,
                request.advisor_calendar_id.as_deref(),
            ),
            customer_name: request.customer_name.clone(),
            customer_phone: request.customer_phone.clone(),
            property_of_interest: request.property_of_interest.clone(),
            advisor_name: request.advisor_name.clone(),
            requested_start,
            computed_end: requested_start + tenant.appointment_duration,
        })
    }

    pub async fn attempt_booking(&self, tenant: &TenantConfig, request: &BookingRequest) -> BookingOutcome {
        let Some(attempt) = self.prepare(tenant, request) else {
            warn!(
                event_name = "booking.invalid_start",
                tenant_id = %tenant.tenant_id,
                requested_start = %request.requested_start,
                "requested start could not be resolved"
            );
            return BookingOutcome::Invalid { requested_start: request.requested_start.clone() };
        };

        let existing = match self
            .calendar
            .list_events(tenant, &attempt.target_calendar_id, attempt.window())
            .await
        {
            Ok(existing) => existing,
            Err(error) => return conflict(attempt, ConflictCause::CheckFailed(error)),
        };
        if !existing.is_empty() {
            let cause = ConflictCause::SlotTaken { existing_events: existing.len() };
            return conflict(attempt, cause);
        }

        let appointment = appointment_for(tenant, &attempt);
        match self.calendar.insert_event(tenant, &attempt.target_calendar_id, &appointment).await {
            Ok(event_id) => {
                info!(
                    event_name = "booking.confirmed",
                    tenant_id = %attempt.tenant_id,
                    calendar_id = %attempt.target_calendar_id,
                    event_id = %event_id,
                    start = %attempt.requested_start.to_rfc3339(),
                    "appointment written"
                );
                BookingOutcome::Confirmed(ConfirmedBooking {
                    tenant_id: attempt.tenant_id,
                    event_id,
                    calendar_id: attempt.target_calendar_id,
                    customer_name: attempt.customer_name,
                    customer_phone: attempt.customer_phone,
                    property_of_interest: attempt.property_of_interest,
                    advisor_name: attempt.advisor_name,
                    start: attempt.requested_start,
                    end: attempt.computed_end,
                })
            }
            Err(error) => conflict(attempt, ConflictCause::WriteFailed(error)),
        }
    }
}

fn conflict(attempt: BookingAttempt, cause: ConflictCause) -> BookingOutcome {
    let error = match &cause {
        ConflictCause::CheckFailed(error) | ConflictCause::WriteFailed(error) => error.to_string(),
        ConflictCause::SlotTaken { .. } => String::new(),
    };
    warn!(
        event_name = "booking.conflict",
        tenant_id = %attempt.tenant_id,
        calendar_id = %attempt.target_calendar_id,
        start = %attempt.requested_start.to_rfc3339(),
        cause = cause.as_str(),
        error = %error,
        "booking not written"
    );
    BookingOutcome::Conflict { attempt, cause }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use chrono_tz::America::{Bogota, New_York};

    use super::{
        appointment_for, parse_requested_start, BookingOutcome, BookingTransactor, ConflictCause,
    };
    use crate::calendar::memory::{CalendarCall, InMemoryCalendar};
    use crate::domain::schedule::{BookingRequest, TimeWindow};
    use crate::domain::tenant::TenantConfig;

    const DEFAULT_CALENDAR: &str = "agenda@inmodemo.co";

    fn tenant() -> TenantConfig {
        let mut tenant = TenantConfig::new("agent_demo", "Inmobiliaria Demo", DEFAULT_CALENDAR, Bogota);
        tenant.owner_contact.email = Some("dueno@inmodemo.co".to_string());
        tenant
    }

    fn request(start: &str) -> BookingRequest {
        BookingRequest {
            customer_name: "Ana".to_string(),
            customer_phone: "573001112233".to_string(),
            requested_start: start.to_string(),
            property_of_interest: None,
            advisor_name: None,
            advisor_calendar_id: None,
        }
    }

    fn bogota_window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
        let at = |(hour, minute): (u32, u32)| {
            Bogota
                .with_ymd_and_hms(2025, 3, 1, hour, minute, 0)
                .single()
                .map(|instant| instant.with_timezone(&Utc))
                .unwrap_or_default()
        };
        TimeWindow::new(at(start), at(end))
    }

    #[test]
    fn naive_start_is_tenant_wall_clock() {
        let start = parse_requested_start("2024-12-05T10:00:00", Bogota).expect("parses");
        assert_eq!(
            start.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 12, 5, 15, 0, 0).single().expect("utc")
        );
    }

    #[test]
    fn explicit_offset_is_converted_not_relabelled() {
        let start = parse_requested_start("2024-12-05T10:00:00Z", Bogota).expect("parses");
        assert_eq!(start.format("%H:%M").to_string(), "05:00");
    }

    #[test]
    fn skipped_local_time_and_garbage_are_rejected() {
        assert!(parse_requested_start("2025-03-09T02:30:00", New_York).is_none());
        assert!(parse_requested_start("mañana a las diez", Bogota).is_none());
    }

    #[test]
    fn repeated_local_time_takes_earliest_instant() {
        let start = parse_requested_start("2025-11-02T01:30:00", New_York).expect("parses");
        assert_eq!(start.format("%z").to_string(), "-0400");
    }

    #[test]
    fn appointment_record_carries_contact_and_interest() {
        let transactor = BookingTransactor::new(Arc::new(InMemoryCalendar::new()));
        let mut booking = request("2025-03-01T09:00:00");
        booking.property_of_interest = Some("Apto Laureles".to_string());
        booking.advisor_name = Some("Laura".to_string());
        let attempt = transactor.prepare(&tenant(), &booking).expect("valid");

        let appointment = appointment_for(&tenant(), &attempt);

        assert_eq!(appointment.summary, "CITA: Ana - Apto Laureles");
        assert_eq!(appointment.description, "Tel: 573001112233\nInterés: Apto Laureles\nAsesor: Laura");
        assert_eq!(appointment.attendees, vec!["dueno@inmodemo.co".to_string()]);
        assert_eq!(appointment.end - appointment.start, chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn overlapping_request_conflicts_and_adjacent_succeeds() {
        let calendar = Arc::new(InMemoryCalendar::new());
        calendar.add_event(DEFAULT_CALENDAR, "CITA: Pedro", bogota_window((10, 0), (11, 0)));
        let transactor = BookingTransactor::new(calendar.clone());

        let taken = transactor.attempt_booking(&tenant(), &request("2025-03-01T10:30:00")).await;
        assert!(matches!(
            taken,
            BookingOutcome::Conflict { cause: ConflictCause::SlotTaken { existing_events: 1 }, .. }
        ));

        let free = transactor.attempt_booking(&tenant(), &request("2025-03-01T11:00:00")).await;
        let BookingOutcome::Confirmed(confirmed) = free else {
            panic!("expected confirmation, got {free:?}");
        };
        assert_eq!(confirmed.calendar_id, DEFAULT_CALENDAR);
        assert_eq!(calendar.events(DEFAULT_CALENDAR).len(), 2);
    }

    #[tokio::test]
    async fn conflict_check_runs_before_the_write() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let transactor = BookingTransactor::new(calendar.clone());

        let outcome = transactor.attempt_booking(&tenant(), &request("2025-03-01T09:00:00")).await;

        assert!(matches!(outcome, BookingOutcome::Confirmed(_)));
        let kinds = calendar.calls().into_iter().map(|(call, _)| call).collect::<Vec<_>>();
        assert_eq!(kinds, vec![CalendarCall::ListEvents, CalendarCall::InsertEvent]);
    }

    #[tokio::test]
    async fn failed_check_never_writes() {
        let calendar = Arc::new(InMemoryCalendar::new());
        calendar.fail_on(CalendarCall::ListEvents);
        let transactor = BookingTransactor::new(calendar.clone());

        let outcome = transactor.attempt_booking(&tenant(), &request("2025-03-01T09:00:00")).await;

        assert!(matches!(outcome, BookingOutcome::Conflict { cause: ConflictCause::CheckFailed(_), .. }));
        assert!(calendar.calls().iter().all(|(call, _)| *call != CalendarCall::InsertEvent));
    }

    #[tokio::test]
    async fn write_failure_is_a_conflict() {
        let calendar = Arc::new(InMemoryCalendar::new());
        calendar.fail_on(CalendarCall::InsertEvent);
        let transactor = BookingTransactor::new(calendar.clone());

        let outcome = transactor.attempt_booking(&tenant(), &request("2025-03-01T09:00:00")).await;

        assert!(matches!(outcome, BookingOutcome::Conflict { cause: ConflictCause::WriteFailed(_), .. }));
        assert!(calendar.events(DEFAULT_CALENDAR).is_empty());
    }

    #[tokio::test]
    async fn unparseable_start_is_invalid_without_provider_calls() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let transactor = BookingTransactor::new(calendar.clone());

        let outcome = transactor.attempt_booking(&tenant(), &request("el sábado")).await;

        assert_eq!(outcome, BookingOutcome::Invalid { requested_start: "el sábado".to_string() });
        assert!(calendar.calls().is_empty());
    }

    #[tokio::test]
    async fn advisor_calendar_receives_the_booking() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let transactor = BookingTransactor::new(calendar.clone());
        let mut booking = request("2025-03-01T09:00:00");
        booking.advisor_calendar_id = Some("laura@inmodemo.co".to_string());

        let outcome = transactor.attempt_booking(&tenant(), &booking).await;

        assert!(matches!(outcome, BookingOutcome::Confirmed(_)));
        assert_eq!(calendar.events("laura@inmodemo.co").len(), 1);
        assert!(calendar.events(DEFAULT_CALENDAR).is_empty());
    }
}
