//! WhatsApp Cloud API template notifications.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;
use serde_json::{json, Value};
use showings_core::collaborators::NotificationDispatcher;
use showings_core::config::WhatsAppConfig;
use showings_core::domain::schedule::ConfirmedBooking;
use showings_core::domain::tenant::TenantConfig;
use showings_core::errors::ProviderError;
use tracing::{info, warn};

use crate::google::auth::authorization;
use crate::google::{endpoint, ensure_success, transport_error};

pub const CUSTOMER_TEMPLATE: &str = "cita_confirmada_cliente";
pub const OWNER_TEMPLATE: &str = "alerta_nuevo_lead_owner";

pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|ch| *ch != '+' && !ch.is_whitespace()).collect()
}

pub fn template_message(to: &str, template: &str, language_code: &str, params: &[String]) -> Value {
    let parameters = params
        .iter()
        .map(|param| json!({ "type": "text", "text": param }))
        .collect::<Vec<_>>();
    json!({
        "messaging_product": "whatsapp",
        "to": normalize_phone(to),
        "type": "template",
        "template": {
            "name": template,
            "language": { "code": language_code },
            "components": [{ "type": "body", "parameters": parameters }],
        },
    })
}

fn spoken_start(booking: &ConfirmedBooking) -> String {
    booking.start.format("%d/%m/%Y %-I:%M %p").to_string()
}

pub struct WhatsAppNotifier {
    client: Client,
    config: WhatsAppConfig,
}

impl WhatsAppNotifier {
    pub fn new(client: Client, config: WhatsAppConfig) -> Self {
        Self { client, config }
    }

    /// Tenant token and sender id first, then the global ones.
    fn credentials<'a>(&'a self, tenant: &'a TenantConfig) -> Option<(&'a SecretString, &'a str)> {
        let token = tenant.whatsapp.token.as_ref().or(self.config.token.as_ref())?;
        let phone_number_id = tenant
            .whatsapp
            .phone_number_id
            .as_deref()
            .or(self.config.phone_number_id.as_deref())?;
        Some((token, phone_number_id))
    }

    async fn send(
        &self,
        token: &SecretString,
        phone_number_id: &str,
        message: &Value,
    ) -> Result<(), ProviderError> {
        let url = endpoint(
            &self.config.api_base_url,
            &[&self.config.api_version, phone_number_id, "messages"],
        )?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization(token))
            .json(message)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for WhatsAppNotifier {
    async fn notify_all(&self, tenant: &TenantConfig, booking: &ConfirmedBooking) -> Result<(), ProviderError> {
        let Some((token, phone_number_id)) = self.credentials(tenant) else {
            warn!(
                event_name = "notify.skipped",
                tenant_id = %tenant.tenant_id,
                "no WhatsApp token or sender configured; skipping notifications"
            );
            return Ok(());
        };
        let start = spoken_start(booking);
        let language = &self.config.language_code;

        let customer = template_message(
            &booking.customer_phone,
            CUSTOMER_TEMPLATE,
            language,
            &[booking.customer_name.clone(), start.clone()],
        );
        let customer_result = self.send(token, phone_number_id, &customer).await;

        let owner_result = match &tenant.owner_contact.phone {
            Some(owner_phone) => {
                let owner = template_message(
                    owner_phone,
                    OWNER_TEMPLATE,
                    language,
                    &[
                        tenant.display_name.clone(),
                        booking.customer_name.clone(),
                        booking.customer_phone.clone(),
                        start,
                    ],
                );
                self.send(token, phone_number_id, &owner).await
            }
            None => Ok(()),
        };

        info!(
            event_name = "notify.sent",
            tenant_id = %tenant.tenant_id,
            event_id = %booking.event_id,
            customer_ok = customer_result.is_ok(),
            owner_ok = owner_result.is_ok(),
            "booking notifications dispatched"
        );
        customer_result.and(owner_result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use chrono_tz::America::Bogota;
    use serde_json::{json, Value};
    use showings_core::collaborators::NotificationDispatcher;
    use showings_core::config::AppConfig;
    use showings_core::domain::schedule::ConfirmedBooking;
    use showings_core::domain::tenant::{TenantConfig, TenantId};

    use super::{normalize_phone, template_message, WhatsAppNotifier};

    type Sent = Arc<Mutex<Vec<(String, String, Value)>>>;

    async fn fake_graph() -> (String, Sent) {
        let sent: Sent = Arc::default();
        let app = Router::new()
            .route(
                "/v17.0/{phone_id}/messages",
                post(
                    |State(sent): State<Sent>,
                     Path(phone_id): Path<String>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        if let Ok(mut sent) = sent.lock() {
                            sent.push((phone_id, auth, body));
                        }
                        Json(json!({"messages": [{"id": "wamid.1"}]}))
                    },
                ),
            )
            .with_state(sent.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{address}"), sent)
    }

    fn booking() -> ConfirmedBooking {
        let start = Bogota.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).single().expect("start");
        ConfirmedBooking {
            tenant_id: TenantId::new("agent_demo"),
            event_id: "evt-1".to_string(),
            calendar_id: "agenda@inmo.co".to_string(),
            customer_name: "Ana".to_string(),
            customer_phone: "+57 300 111 2233".to_string(),
            property_of_interest: None,
            advisor_name: None,
            start,
            end: start + chrono::Duration::hours(1),
        }
    }

    fn tenant() -> TenantConfig {
        let mut tenant = TenantConfig::new("agent_demo", "Inmobiliaria Demo", "agenda@inmo.co", Bogota);
        tenant.owner_contact.phone = Some("573106666709".to_string());
        tenant
    }

    fn notifier(base_url: &str, global_token: Option<&str>) -> WhatsAppNotifier {
        let mut config = AppConfig::default().whatsapp;
        config.enabled = true;
        config.api_base_url = base_url.to_string();
        config.token = global_token.map(|token| token.to_string().into());
        config.phone_number_id = Some("global-sender".to_string());
        WhatsAppNotifier::new(reqwest::Client::new(), config)
    }

    #[test]
    fn phone_numbers_lose_plus_and_spaces() {
        assert_eq!(normalize_phone("+57 300 111 2233"), "573001112233");
        let message = template_message("+57 300", "t", "es", &["uno".to_string()]);
        assert_eq!(message["to"], "57300");
        assert_eq!(message["template"]["components"][0]["parameters"][0]["text"], "uno");
    }

    #[tokio::test]
    async fn customer_and_owner_templates_are_sent() {
        let (base_url, sent) = fake_graph().await;

        notifier(&base_url, Some("global-token")).notify_all(&tenant(), &booking()).await.expect("sent");

        let sent = sent.lock().map(|sent| sent.clone()).unwrap_or_default();
        assert_eq!(sent.len(), 2);
        let (phone_id, auth, customer) = &sent[0];
        assert_eq!(phone_id, "global-sender");
        assert_eq!(auth, "Bearer global-token");
        assert_eq!(customer["to"], "573001112233");
        assert_eq!(customer["template"]["name"], "cita_confirmada_cliente");
        assert_eq!(customer["template"]["components"][0]["parameters"][1]["text"], "01/03/2025 3:00 PM");

        let (_, _, owner) = &sent[1];
        assert_eq!(owner["to"], "573106666709");
        assert_eq!(owner["template"]["name"], "alerta_nuevo_lead_owner");
        assert_eq!(owner["template"]["components"][0]["parameters"][0]["text"], "Inmobiliaria Demo");
    }

    #[tokio::test]
    async fn tenant_credentials_override_global() {
        let (base_url, sent) = fake_graph().await;
        let mut tenant = tenant();
        tenant.whatsapp.token = Some("tenant-token".to_string().into());
        tenant.whatsapp.phone_number_id = Some("tenant-sender".to_string());

        notifier(&base_url, Some("global-token")).notify_all(&tenant, &booking()).await.expect("sent");

        let sent = sent.lock().map(|sent| sent.clone()).unwrap_or_default();
        assert!(sent.iter().all(|(phone_id, auth, _)| phone_id == "tenant-sender" && auth == "Bearer tenant-token"));
    }

    #[tokio::test]
    async fn missing_token_skips_without_error() {
        let (base_url, sent) = fake_graph().await;

        notifier(&base_url, None).notify_all(&tenant(), &booking()).await.expect("skipped");

        assert!(sent.lock().map(|sent| sent.is_empty()).unwrap_or(false));
    }
}
