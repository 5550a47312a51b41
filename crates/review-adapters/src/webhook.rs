//! Entrega de efectos por webhook (reqwest blocking).

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use review_core::{NotifyError, Notifier, PendingEffect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Endpoint registrado por un workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub url: String,
    /// Tipo de evento que dispara el envío (`new_submission`, `stage_changed`, …).
    pub trigger_type: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl WebhookEndpoint {
    pub fn new(url: impl Into<String>, trigger_type: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(),
               url: url.into(),
               trigger_type: trigger_type.into(),
               api_key: None,
               is_enabled: true }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn matches(&self, event_type: &str) -> bool {
        self.is_enabled && self.trigger_type == event_type
    }
}

/// Cuerpo JSON enviado a cada endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event_type: String,
    pub application_id: Uuid,
    pub form_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl WebhookPayload {
    pub fn from_effect(effect: &PendingEffect) -> Self {
        let mut data = serde_json::to_value(&effect.event).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut data {
            map.remove("event_type");
            if let Some(workflow_id) = effect.workflow_id {
                map.insert("workflow_id".into(), Value::String(workflow_id.to_string()));
            }
        }
        Self { event_type: effect.event.event_type().to_string(),
               application_id: effect.application_id,
               form_id: effect.form_id,
               timestamp: effect.created_at,
               data }
    }
}

pub struct WebhookNotifier {
    client: Client,
    endpoints: Vec<WebhookEndpoint>,
}

impl WebhookNotifier {
    pub fn new(endpoints: Vec<WebhookEndpoint>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT)
                                      .build()
                                      .map_err(|e| NotifyError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &[WebhookEndpoint] {
        &self.endpoints
    }

    fn post(&self, endpoint: &WebhookEndpoint, payload: &WebhookPayload, key: &str) -> Result<(), NotifyError> {
        let mut request = self.client
                              .post(&endpoint.url)
                              .header(IDEMPOTENCY_HEADER, key)
                              .json(payload);
        if let Some(api_key) = &endpoint.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {api_key}"));
        }
        let response = request.send()
                              .map_err(|e| NotifyError::Transport(format!("{}: {e}", endpoint.url)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    /// Envía a todos los endpoints que coinciden; falla si alguno falló, de
    /// modo que el efecto se reintenta (los receptores deduplican por
    /// `Idempotency-Key`).
    fn deliver(&self, effect: &PendingEffect) -> Result<(), NotifyError> {
        let event_type = effect.event.event_type();
        let targets: Vec<&WebhookEndpoint> = self.endpoints.iter().filter(|e| e.matches(event_type)).collect();
        if targets.is_empty() {
            debug!("webhook:skip event={event_type} application_id={} (no endpoints)",
                   effect.application_id);
            return Ok(());
        }
        let payload = WebhookPayload::from_effect(effect);
        let mut first_error = None;
        for endpoint in targets {
            match self.post(endpoint, &payload, &effect.idempotency_key) {
                Ok(()) => debug!("webhook:sent endpoint_id={} event={event_type}", endpoint.id),
                Err(e) => {
                    warn!("webhook:failed endpoint_id={} event={event_type} err={e}", endpoint.id);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_core::NotificationEvent;
    use review_domain::Application;

    fn effect(event: NotificationEvent) -> PendingEffect {
        let app = Application::new_draft(Uuid::new_v4(), Some(Uuid::new_v4()), None);
        PendingEffect::new(&app, event)
    }

    #[test]
    fn payload_uses_camel_case_and_strips_tag() {
        let e = effect(NotificationEvent::StatusChanged { previous_status: "draft".into(),
                                                          new_status: "submitted".into() });
        let payload = WebhookPayload::from_effect(&e);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["eventType"], "status_changed");
        assert_eq!(json["applicationId"], e.application_id.to_string());
        assert_eq!(json["data"]["new_status"], "submitted");
        assert!(json["data"].get("event_type").is_none());
        assert!(json["data"].get("workflow_id").is_some());
    }

    #[test]
    fn endpoints_filter_by_trigger_and_enabled() {
        let mut off = WebhookEndpoint::new("http://localhost:9/off", "stage_changed");
        off.is_enabled = false;
        let on = WebhookEndpoint::new("http://localhost:9/on", "stage_changed");
        assert!(on.matches("stage_changed"));
        assert!(!on.matches("new_submission"));
        assert!(!off.matches("stage_changed"));
    }

    #[test]
    fn unmatched_events_are_delivered_trivially() {
        let notifier = WebhookNotifier::new(vec![WebhookEndpoint::new("http://localhost:9/x", "tag_changed")]).unwrap();
        let e = effect(NotificationEvent::NewSubmission { stage_id: None });
        assert!(notifier.deliver(&e).is_ok());
    }
}
