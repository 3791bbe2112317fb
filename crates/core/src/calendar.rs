//! Calendar provider boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::schedule::{BusyInterval, CalendarEvent, NewAppointment, TimeWindow};
use crate::domain::tenant::TenantConfig;
use crate::errors::ProviderError;

/// External calendar service. Every method is a suspension point for the
/// calling request only; implementations hold no process-wide lock.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy intervals of `calendar_id` within `window`.
    async fn free_busy(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<BusyInterval>, ProviderError>;

    /// Events overlapping `window`, recurring events expanded.
    async fn list_events(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<CalendarEvent>, ProviderError>;

    /// Writes an appointment and returns the provider's event id.
    async fn insert_event(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        appointment: &NewAppointment,
    ) -> Result<String, ProviderError>;
}

/// Calendar the request should hit: the requested one when it looks like a
/// calendar identifier (mailbox or group calendar address), the tenant
/// default otherwise.
pub fn resolve_target_calendar(tenant: &TenantConfig, requested: Option<&str>) -> String {
    requested
        .map(str::trim)
        .filter(|candidate| is_calendar_identifier(candidate))
        .map(str::to_string)
        .unwrap_or_else(|| tenant.calendar_id.clone())
}

pub fn is_calendar_identifier(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

/// Applies a deadline to every call of the wrapped provider. A call that
/// exceeds it fails with [`ProviderError::Timeout`].
pub struct TimeoutCalendar {
    inner: Arc<dyn CalendarProvider>,
    timeout: Duration,
}

impl TimeoutCalendar {
    pub fn new(inner: Arc<dyn CalendarProvider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ProviderError>
    where
        F: std::future::Future<Output = Result<T, ProviderError>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { operation, after: self.timeout }),
        }
    }
}

#[async_trait]
impl CalendarProvider for TimeoutCalendar {
    async fn free_busy(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<BusyInterval>, ProviderError> {
        self.bounded("calendar.free_busy", self.inner.free_busy(tenant, calendar_id, window)).await
    }

    async fn list_events(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        self.bounded("calendar.list_events", self.inner.list_events(tenant, calendar_id, window))
            .await
    }

    async fn insert_event(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        appointment: &NewAppointment,
    ) -> Result<String, ProviderError> {
        self.bounded(
            "calendar.insert_event",
            self.inner.insert_event(tenant, calendar_id, appointment),
        )
        .await
    }
}

pub mod memory {
    //! In-process calendar used by tests and the offline CLI simulation.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::CalendarProvider;
    use crate::domain::schedule::{BusyInterval, CalendarEvent, NewAppointment, TimeWindow};
    use crate::domain::tenant::TenantConfig;
    use crate::errors::ProviderError;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CalendarCall {
        FreeBusy,
        ListEvents,
        InsertEvent,
    }

    #[derive(Default)]
    struct State {
        events: HashMap<String, Vec<CalendarEvent>>,
        calls: Vec<(CalendarCall, String)>,
        next_id: u64,
    }

    /// Events keyed by calendar id. Failure and latency can be injected per
    /// call kind.
    #[derive(Default)]
    pub struct InMemoryCalendar {
        state: Mutex<State>,
        failing: Mutex<Vec<CalendarCall>>,
        latency: Option<Duration>,
    }

    impl InMemoryCalendar {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_latency(latency: Duration) -> Self {
            Self { latency: Some(latency), ..Self::default() }
        }

        pub fn add_event(&self, calendar_id: &str, summary: &str, window: TimeWindow) {
            if let Ok(mut state) = self.state.lock() {
                state.next_id += 1;
                let id = format!("evt-{}", state.next_id);
                state.events.entry(calendar_id.to_string()).or_default().push(CalendarEvent {
                    id,
                    summary: Some(summary.to_string()),
                    window,
                });
            }
        }

        pub fn fail_on(&self, call: CalendarCall) {
            if let Ok(mut failing) = self.failing.lock() {
                failing.push(call);
            }
        }

        pub fn events(&self, calendar_id: &str) -> Vec<CalendarEvent> {
            self.state
                .lock()
                .map(|state| state.events.get(calendar_id).cloned().unwrap_or_default())
                .unwrap_or_default()
        }

        /// Calls received so far, in order, with the calendar id they targeted.
        pub fn calls(&self) -> Vec<(CalendarCall, String)> {
            self.state.lock().map(|state| state.calls.clone()).unwrap_or_default()
        }

        async fn enter(&self, call: CalendarCall, calendar_id: &str) -> Result<(), ProviderError> {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if let Ok(mut state) = self.state.lock() {
                state.calls.push((call, calendar_id.to_string()));
            }
            let failing = self.failing.lock().map(|failing| failing.contains(&call)).unwrap_or(false);
            if failing {
                return Err(ProviderError::Status {
                    status: 404,
                    body: format!("calendar `{calendar_id}` not found"),
                });
            }
            Ok(())
        }

        fn overlapping(&self, calendar_id: &str, window: &TimeWindow) -> Vec<CalendarEvent> {
            let mut events = self
                .events(calendar_id)
                .into_iter()
                .filter(|event| event.window.overlaps(window))
                .collect::<Vec<_>>();
            events.sort_by_key(|event| event.window.start);
            events
        }
    }

    #[async_trait]
    impl CalendarProvider for InMemoryCalendar {
        async fn free_busy(
            &self,
            _tenant: &TenantConfig,
            calendar_id: &str,
            window: TimeWindow,
        ) -> Result<Vec<BusyInterval>, ProviderError> {
            self.enter(CalendarCall::FreeBusy, calendar_id).await?;
            Ok(self.overlapping(calendar_id, &window).into_iter().map(|event| event.window).collect())
        }

        async fn list_events(
            &self,
            _tenant: &TenantConfig,
            calendar_id: &str,
            window: TimeWindow,
        ) -> Result<Vec<CalendarEvent>, ProviderError> {
            self.enter(CalendarCall::ListEvents, calendar_id).await?;
            Ok(self.overlapping(calendar_id, &window))
        }

        async fn insert_event(
            &self,
            _tenant: &TenantConfig,
            calendar_id: &str,
            appointment: &NewAppointment,
        ) -> Result<String, ProviderError> {
            self.enter(CalendarCall::InsertEvent, calendar_id).await?;
            let mut state = self
                .state
                .lock()
                .map_err(|_| ProviderError::Transport("calendar state poisoned".to_string()))?;
            state.next_id += 1;
            let id = format!("evt-{}", state.next_id);
            state.events.entry(calendar_id.to_string()).or_default().push(CalendarEvent {
                id: id.clone(),
                summary: Some(appointment.summary.clone()),
                window: appointment.window(),
            });
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use chrono_tz::America::Bogota;

    use super::memory::InMemoryCalendar;
    use super::{is_calendar_identifier, resolve_target_calendar, CalendarProvider, TimeoutCalendar};
    use crate::domain::schedule::TimeWindow;
    use crate::domain::tenant::TenantConfig;
    use crate::errors::ProviderError;

    fn tenant() -> TenantConfig {
        TenantConfig::new("agent_demo", "Demo", "agenda@inmodemo.co", Bogota)
    }

    #[test]
    fn calendar_identifier_shapes() {
        assert!(is_calendar_identifier("laura@inmodemo.co"));
        assert!(is_calendar_identifier("c_8f2k1@group.calendar.google.com"));
        assert!(!is_calendar_identifier("Laura"));
        assert!(!is_calendar_identifier("laura@localhost"));
        assert!(!is_calendar_identifier("la ura@inmo.co"));
        assert!(!is_calendar_identifier("a@b@c.co"));
        assert!(!is_calendar_identifier("@inmo.co"));
    }

    #[test]
    fn unrecognized_target_falls_back_to_tenant_default() {
        let tenant = tenant();
        assert_eq!(resolve_target_calendar(&tenant, Some("Laura Gómez")), "agenda@inmodemo.co");
        assert_eq!(resolve_target_calendar(&tenant, None), "agenda@inmodemo.co");
        assert_eq!(
            resolve_target_calendar(&tenant, Some(" laura@inmodemo.co ")),
            "laura@inmodemo.co"
        );
    }

    #[tokio::test]
    async fn slow_provider_call_times_out() {
        let slow = Arc::new(InMemoryCalendar::with_latency(Duration::from_millis(200)));
        let calendar = TimeoutCalendar::new(slow, Duration::from_millis(20));
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 14, 0, 0).single().unwrap_or_default();
        let window = TimeWindow::new(start, start + chrono::Duration::hours(8));

        let result = calendar.free_busy(&tenant(), "agenda@inmodemo.co", window).await;

        assert!(matches!(result, Err(ProviderError::Timeout { operation: "calendar.free_busy", .. })));
    }
}
