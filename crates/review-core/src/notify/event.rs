use chrono::{DateTime, Utc};
use review_domain::Application;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ReviewError;
use crate::hashing::{hash::hash_parts, to_canonical_json};

/// Evento de transición que se notifica a colaboradores externos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum NotificationEvent {
    NewSubmission {
        stage_id: Option<Uuid>,
    },
    StageChanged {
        previous_stage_id: Option<Uuid>,
        new_stage_id: Option<Uuid>,
        group_id: Option<Uuid>,
    },
    StatusChanged {
        previous_status: String,
        new_status: String,
    },
    TagChanged {
        added: Vec<String>,
        removed: Vec<String>,
        tags: Vec<String>,
    },
    ReminderEmail {
        status_label: String,
        template_id: Option<String>,
    },
}

impl NotificationEvent {
    /// Nombre estable del tipo, igual al `trigger_type` de los webhooks.
    pub fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::NewSubmission { .. } => "new_submission",
            NotificationEvent::StageChanged { .. } => "stage_changed",
            NotificationEvent::StatusChanged { .. } => "status_changed",
            NotificationEvent::TagChanged { .. } => "tag_changed",
            NotificationEvent::ReminderEmail { .. } => "reminder_email",
        }
    }
}

/// Estado de un efecto en el outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectState {
    Pending,
    Delivered,
    /// Agotó los reintentos; queda para inspección manual.
    Abandoned,
}

impl EffectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectState::Pending => "pending",
            EffectState::Delivered => "delivered",
            EffectState::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for EffectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectState {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EffectState::Pending),
            "delivered" => Ok(EffectState::Delivered),
            "abandoned" => Ok(EffectState::Abandoned),
            other => Err(ReviewError::Internal(format!("unknown effect state {other}"))),
        }
    }
}

/// Registro durable del outbox: un efecto a entregar al menos una vez.
///
/// `idempotency_key` permite a los receptores descartar duplicados cuando
/// una entrega se repite tras un fallo al marcarla como entregada. Depende
/// sólo del evento y del estado de la aplicación que lo produjo (id,
/// `version`, `updated_at`): el mismo evento sobre la misma escritura da la
/// misma clave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEffect {
    pub id: Uuid,
    pub application_id: Uuid,
    pub form_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub event: NotificationEvent,
    pub idempotency_key: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub state: EffectState,
    pub created_at: DateTime<Utc>,
}

impl PendingEffect {
    pub fn new(application: &Application, event: NotificationEvent) -> Self {
        let idempotency_key = effect_key(application, &event);
        Self { id: Uuid::new_v4(),
               application_id: application.id,
               form_id: application.form_id,
               workflow_id: application.workflow_id,
               event,
               idempotency_key,
               attempts: 0,
               last_error: None,
               state: EffectState::Pending,
               created_at: Utc::now() }
    }
}

fn effect_key(application: &Application, event: &NotificationEvent) -> String {
    let payload = serde_json::to_value(event).map(|v| to_canonical_json(&v))
                                             .unwrap_or_default();
    hash_parts(&[&application.id.to_string(),
                 &application.version.to_string(),
                 &application.updated_at.to_rfc3339(),
                 event.event_type(),
                 &payload])
}
