//! Google Calendar v3 provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use showings_core::calendar::CalendarProvider;
use showings_core::domain::schedule::{BusyInterval, CalendarEvent, NewAppointment, TimeWindow};
use showings_core::domain::tenant::TenantConfig;
use showings_core::errors::ProviderError;

use super::auth::{authorization, AccessTokens};
use super::{endpoint, ensure_success, transport_error};

pub struct GoogleCalendar {
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokens>,
}

impl GoogleCalendar {
    pub fn new(client: Client, base_url: impl Into<String>, tokens: Arc<dyn AccessTokens>) -> Self {
        Self { client, base_url: base_url.into(), tokens }
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyPeriod>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct BusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<String>,
    start: EventTime,
    end: EventTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default)]
    date_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    date: Option<NaiveDate>,
}

impl EventTime {
    /// All-day events start at local midnight of the tenant zone.
    fn instant(&self, timezone: Tz) -> Option<DateTime<Utc>> {
        if let Some(date_time) = self.date_time {
            return Some(date_time.with_timezone(&Utc));
        }
        let midnight = self.date?.and_hms_opt(0, 0, 0)?;
        timezone.from_local_datetime(&midnight).earliest().map(|local| local.with_timezone(&Utc))
    }
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
}

fn decode_error(context: &str) -> impl Fn(reqwest::Error) -> ProviderError + '_ {
    move |error| ProviderError::Decode(format!("{context}: {error}"))
}

pub(crate) fn free_busy_body(calendar_id: &str, window: &TimeWindow, timezone: Tz) -> Value {
    json!({
        "timeMin": rfc3339(window.start),
        "timeMax": rfc3339(window.end),
        "timeZone": timezone.name(),
        "items": [{ "id": calendar_id }],
    })
}

pub(crate) fn event_body(appointment: &NewAppointment, timezone: Tz) -> Value {
    let attendees =
        appointment.attendees.iter().map(|email| json!({ "email": email })).collect::<Vec<_>>();
    json!({
        "summary": appointment.summary,
        "description": appointment.description,
        "start": { "dateTime": appointment.start.to_rfc3339(), "timeZone": timezone.name() },
        "end": { "dateTime": appointment.end.to_rfc3339(), "timeZone": timezone.name() },
        "attendees": attendees,
    })
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn free_busy(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<BusyInterval>, ProviderError> {
        let token = self.tokens.bearer(&tenant.credentials_ref).await?;
        let url = endpoint(&self.base_url, &["freeBusy"])?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .json(&free_busy_body(calendar_id, &window, tenant.timezone))
            .send()
            .await
            .map_err(transport_error)?;
        let body: FreeBusyResponse =
            ensure_success(response).await?.json().await.map_err(decode_error("freeBusy"))?;

        let calendar = body.calendars.get(calendar_id).ok_or_else(|| {
            ProviderError::Decode(format!("freeBusy response has no entry for `{calendar_id}`"))
        })?;
        if let Some(error) = calendar.errors.first() {
            return Err(ProviderError::Status { status: 404, body: error.reason.clone() });
        }
        Ok(calendar.busy.iter().map(|period| TimeWindow::new(period.start, period.end)).collect())
    }

    async fn list_events(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        let token = self.tokens.bearer(&tenant.credentials_ref).await?;
        let url = endpoint(&self.base_url, &["calendars", calendar_id, "events"])?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .query(&[
                ("timeMin", rfc3339(window.start)),
                ("timeMax", rfc3339(window.end)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let list: EventList =
            ensure_success(response).await?.json().await.map_err(decode_error("events.list"))?;

        Ok(list
            .items
            .into_iter()
            .filter(|item| item.status.as_deref() != Some("cancelled"))
            .filter_map(|item| {
                let start = item.start.instant(tenant.timezone)?;
                let end = item.end.instant(tenant.timezone)?;
                Some(CalendarEvent { id: item.id, summary: item.summary, window: TimeWindow::new(start, end) })
            })
            .collect())
    }

    async fn insert_event(
        &self,
        tenant: &TenantConfig,
        calendar_id: &str,
        appointment: &NewAppointment,
    ) -> Result<String, ProviderError> {
        let token = self.tokens.bearer(&tenant.credentials_ref).await?;
        let url = endpoint(&self.base_url, &["calendars", calendar_id, "events"])?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .json(&event_body(appointment, tenant.timezone))
            .send()
            .await
            .map_err(transport_error)?;
        let inserted: InsertedEvent =
            ensure_success(response).await?.json().await.map_err(decode_error("events.insert"))?;
        Ok(inserted.id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use chrono_tz::America::Bogota;
    use serde_json::{json, Value};
    use showings_core::calendar::CalendarProvider;
    use showings_core::domain::schedule::{NewAppointment, TimeWindow};
    use showings_core::domain::tenant::TenantConfig;
    use showings_core::errors::ProviderError;

    use super::{event_body, free_busy_body, GoogleCalendar};
    use crate::google::auth::StaticToken;

    #[derive(Clone, Default)]
    struct Seen {
        requests: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Seen {
        fn push(&self, label: String, body: Value) {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((label, body));
            }
        }

        fn all(&self) -> Vec<(String, Value)> {
            self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
        }
    }

    fn bearer_ok(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|value| value.to_str().ok()) == Some("Bearer test-token")
    }

    async fn fake_google() -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/freeBusy",
                post(|State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    if !bearer_ok(&headers) {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
                    }
                    seen.push("freeBusy".to_string(), body);
                    (
                        StatusCode::OK,
                        Json(json!({
                            "calendars": {
                                "agenda@inmo.co": {
                                    "busy": [{"start": "2025-03-01T15:00:00Z", "end": "2025-03-01T16:00:00Z"}]
                                },
                                "nadie@inmo.co": {
                                    "busy": [],
                                    "errors": [{"domain": "global", "reason": "notFound"}]
                                }
                            }
                        })),
                    )
                }),
            )
            .route(
                "/calendars/{calendar_id}/events",
                get(
                    |State(seen): State<Seen>,
                     Path(calendar_id): Path<String>,
                     Query(query): Query<HashMap<String, String>>| async move {
                        seen.push(format!("list:{calendar_id}"), json!(query));
                        Json(json!({
                            "items": [
                                {
                                    "id": "evt-1",
                                    "summary": "CITA: Pedro",
                                    "start": {"dateTime": "2025-03-01T10:00:00-05:00"},
                                    "end": {"dateTime": "2025-03-01T11:00:00-05:00"}
                                },
                                {
                                    "id": "evt-2",
                                    "status": "cancelled",
                                    "start": {"dateTime": "2025-03-01T10:00:00-05:00"},
                                    "end": {"dateTime": "2025-03-01T11:00:00-05:00"}
                                },
                                {
                                    "id": "evt-3",
                                    "summary": "Feriado",
                                    "start": {"date": "2025-03-01"},
                                    "end": {"date": "2025-03-02"}
                                }
                            ]
                        }))
                    },
                )
                .post(
                    |State(seen): State<Seen>,
                     Path(calendar_id): Path<String>,
                     Json(body): Json<Value>| async move {
                        seen.push(format!("insert:{calendar_id}"), body);
                        Json(json!({"id": "created-1"}))
                    },
                ),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{address}"), seen)
    }

    fn tenant() -> TenantConfig {
        TenantConfig::new("agent_demo", "Demo", "agenda@inmo.co", Bogota)
    }

    fn calendar(base_url: &str, token: &str) -> GoogleCalendar {
        GoogleCalendar::new(
            reqwest::Client::new(),
            base_url,
            Arc::new(StaticToken(token.to_string().into())),
        )
    }

    fn day() -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 14, 0, 0).single().unwrap_or_default();
        TimeWindow::new(start, start + chrono::Duration::hours(8))
    }

    #[test]
    fn request_bodies_carry_tenant_timezone() {
        let body = free_busy_body("agenda@inmo.co", &day(), Bogota);
        assert_eq!(body["timeZone"], "America/Bogota");
        assert_eq!(body["timeMin"], "2025-03-01T14:00:00Z");
        assert_eq!(body["items"][0]["id"], "agenda@inmo.co");

        let start = Bogota.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("start");
        let appointment = NewAppointment {
            summary: "CITA: Ana".to_string(),
            description: "Tel: 573001112233".to_string(),
            start,
            end: start + chrono::Duration::hours(1),
            attendees: vec!["dueno@inmo.co".to_string()],
        };
        let body = event_body(&appointment, Bogota);
        assert_eq!(body["start"]["dateTime"], "2025-03-01T09:00:00-05:00");
        assert_eq!(body["start"]["timeZone"], "America/Bogota");
        assert_eq!(body["attendees"][0]["email"], "dueno@inmo.co");
    }

    #[tokio::test]
    async fn free_busy_reads_busy_periods_and_calendar_errors() {
        let (base_url, seen) = fake_google().await;
        let calendar = calendar(&base_url, "test-token");

        let busy = calendar.free_busy(&tenant(), "agenda@inmo.co", day()).await.expect("busy");
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].start, Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).single().expect("utc"));
        assert_eq!(seen.all()[0].0, "freeBusy");

        let missing = calendar.free_busy(&tenant(), "nadie@inmo.co", day()).await;
        assert!(matches!(missing, Err(ProviderError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn rejected_token_surfaces_status() {
        let (base_url, _) = fake_google().await;
        let result = calendar(&base_url, "wrong").free_busy(&tenant(), "agenda@inmo.co", day()).await;

        assert!(matches!(result, Err(ProviderError::Status { status: 401, .. })));
    }

    #[tokio::test]
    async fn list_events_expands_singles_and_skips_cancelled() {
        let (base_url, seen) = fake_google().await;
        let events = calendar(&base_url, "test-token")
            .list_events(&tenant(), "agenda@inmo.co", day())
            .await
            .expect("events");

        let ids = events.iter().map(|event| event.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["evt-1", "evt-3"]);
        assert_eq!(events[1].window.start, Utc.with_ymd_and_hms(2025, 3, 1, 5, 0, 0).single().expect("utc"));

        let (label, query) = seen.all().remove(0);
        assert_eq!(label, "list:agenda@inmo.co");
        assert_eq!(query["singleEvents"], "true");
    }

    #[tokio::test]
    async fn insert_returns_provider_event_id() {
        let (base_url, seen) = fake_google().await;
        let start = Bogota.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("start");
        let appointment = NewAppointment {
            summary: "CITA: Ana".to_string(),
            description: "Tel: 573001112233\nInterés: No especificado".to_string(),
            start,
            end: start + chrono::Duration::hours(1),
            attendees: Vec::new(),
        };

        let id = calendar(&base_url, "test-token")
            .insert_event(&tenant(), "agenda@inmo.co", &appointment)
            .await
            .expect("inserted");

        assert_eq!(id, "created-1");
        let (label, body) = seen.all().remove(0);
        assert_eq!(label, "insert:agenda@inmo.co");
        assert_eq!(body["summary"], "CITA: Ana");
    }
}
