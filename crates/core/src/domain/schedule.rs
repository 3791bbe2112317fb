use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

/// Half-open interval `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Interval reported busy by the calendar provider.
pub type BusyInterval = TimeWindow;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub busy: bool,
}

impl Slot {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start.with_timezone(&Utc), self.end.with_timezone(&Utc))
    }
}

/// Event as returned by the provider's event listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub window: TimeWindow,
}

/// Appointment record written on a successful booking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAppointment {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub attendees: Vec<String>,
}

impl NewAppointment {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start.with_timezone(&Utc), self.end.with_timezone(&Utc))
    }
}

/// Booking arguments as extracted from the call, before the start time is
/// parsed against the tenant timezone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookingRequest {
    pub customer_name: String,
    pub customer_phone: String,
    pub requested_start: String,
    pub property_of_interest: Option<String>,
    pub advisor_name: Option<String>,
    pub advisor_calendar_id: Option<String>,
}

/// One appointment-creation attempt with a resolved calendar and a
/// timezone-aware start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingAttempt {
    pub tenant_id: TenantId,
    pub target_calendar_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub property_of_interest: Option<String>,
    pub advisor_name: Option<String>,
    pub requested_start: DateTime<Tz>,
    pub computed_end: DateTime<Tz>,
}

impl BookingAttempt {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(
            self.requested_start.with_timezone(&Utc),
            self.computed_end.with_timezone(&Utc),
        )
    }
}

/// Data handed to the notification and lead-logging follow-ups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedBooking {
    pub tenant_id: TenantId,
    pub event_id: String,
    pub calendar_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub property_of_interest: Option<String>,
    pub advisor_name: Option<String>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}
