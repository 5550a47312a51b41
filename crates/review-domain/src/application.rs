// application.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Status inicial de una aplicación recién abierta por el postulante.
pub const STATUS_DRAFT: &str = "draft";
/// Status tras el envío definitivo del formulario.
pub const STATUS_SUBMITTED: &str = "submitted";

/// Ubicación de una aplicación dentro del pipeline.
///
/// Estar en un Stage y en un Application Group a la vez no es representable:
/// asignar una ubicación reemplaza la anterior completa. El `stage_group_id`
/// sólo existe dentro de `InStage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Unassigned,
    InStage {
        stage_id: Uuid,
        #[serde(default)]
        stage_group_id: Option<Uuid>,
    },
    InGroup { group_id: Uuid },
}

impl Placement {
    pub fn in_stage(stage_id: Uuid) -> Self {
        Placement::InStage { stage_id,
                             stage_group_id: None }
    }

    pub fn in_group(group_id: Uuid) -> Self {
        Placement::InGroup { group_id }
    }

    pub fn stage_id(&self) -> Option<Uuid> {
        match self {
            Placement::InStage { stage_id, .. } => Some(*stage_id),
            _ => None,
        }
    }

    pub fn stage_group_id(&self) -> Option<Uuid> {
        match self {
            Placement::InStage { stage_group_id, .. } => *stage_group_id,
            _ => None,
        }
    }

    pub fn group_id(&self) -> Option<Uuid> {
        match self {
            Placement::InGroup { group_id } => Some(*group_id),
            _ => None,
        }
    }

    /// Reconstruye la ubicación desde columnas sueltas (filas de base de
    /// datos o documentos heredados).
    ///
    /// # Errores
    /// `ValidationError` si vienen `stage_id` y `group_id` a la vez, o un
    /// `stage_group_id` sin `stage_id`.
    pub fn from_columns(stage_id: Option<Uuid>,
                        stage_group_id: Option<Uuid>,
                        group_id: Option<Uuid>)
                        -> Result<Self, DomainError> {
        match (stage_id, stage_group_id, group_id) {
            (None, None, None) => Ok(Placement::Unassigned),
            (Some(stage_id), stage_group_id, None) => Ok(Placement::InStage { stage_id, stage_group_id }),
            (None, None, Some(group_id)) => Ok(Placement::InGroup { group_id }),
            (Some(_), _, Some(_)) => {
                Err(DomainError::ValidationError("una aplicación no puede estar en un stage y en un grupo a la vez".into()))
            }
            (None, Some(_), _) => Err(DomainError::ValidationError("stage_group_id requiere stage_id".into())),
        }
    }
}

/// Cambios efectivos sobre el conjunto de tags tras aplicar una regla.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TagDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Estado de revisión: todos los campos que muta el motor de transiciones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub placement: Placement,
    pub status: String,
    pub current_status: Option<String>,
    pub tags: BTreeSet<String>,
    pub scores: Map<String, Value>,
    pub decision: Option<String>,
    pub flagged: bool,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self { placement: Placement::Unassigned,
               status: STATUS_DRAFT.to_string(),
               current_status: None,
               tags: BTreeSet::new(),
               scores: Map::new(),
               decision: None,
               flagged: false }
    }
}

impl ReviewState {
    /// Une `add` al conjunto y luego resta `remove`. Tags vacíos o sólo
    /// espacios se ignoran; agregar uno presente o quitar uno ausente no
    /// cambia nada.
    pub fn apply_tags(&mut self, add: &[String], remove: &[String]) -> TagDelta {
        let mut delta = TagDelta::default();
        for tag in add.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if self.tags.insert(tag.to_string()) {
                delta.added.push(tag.to_string());
            }
        }
        for tag in remove.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if self.tags.remove(tag) {
                // Un tag agregado y quitado en la misma regla no cuenta como cambio.
                if let Some(pos) = delta.added.iter().position(|t| t == tag) {
                    delta.added.remove(pos);
                } else {
                    delta.removed.push(tag.to_string());
                }
            }
        }
        delta
    }
}

/// Registro gestionado por el motor: una postulación que avanza por el
/// pipeline de revisión.
///
/// `data` y `version` pertenecen al postulante y sólo los modifica el
/// controlador de concurrencia; `review` pertenece al motor de transiciones.
/// Los historiales no viven aquí sino en el log de auditoría, indexados por
/// `(id, HistoryKind)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub form_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub applicant_id: Option<String>,
    pub data: Map<String, Value>,
    pub version: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_autosave_at: Option<DateTime<Utc>>,
    pub review: ReviewState,
    /// Datos extra específicos del workflow, fuera del control del motor.
    #[serde(default)]
    pub extra: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Abre un borrador vacío en la versión 1.
    pub fn new_draft(form_id: Uuid, workflow_id: Option<Uuid>, applicant_id: Option<String>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(),
               form_id,
               workflow_id,
               applicant_id,
               data: Map::new(),
               version: 1,
               submitted_at: None,
               last_autosave_at: None,
               review: ReviewState::default(),
               extra: Map::new(),
               created_at: now,
               updated_at: now }
    }

    pub fn is_submitted(&self) -> bool {
        self.review.status == STATUS_SUBMITTED
    }

    pub fn stage_id(&self) -> Option<Uuid> {
        self.review.placement.stage_id()
    }

    pub fn stage_group_id(&self) -> Option<Uuid> {
        self.review.placement.stage_group_id()
    }

    pub fn group_id(&self) -> Option<Uuid> {
        self.review.placement.group_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_columns_reject_stage_and_group() {
        let err = Placement::from_columns(Some(Uuid::new_v4()), None, Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, DomainError::ValidationError(_)));
        assert!(Placement::from_columns(None, Some(Uuid::new_v4()), None).is_err());
    }

    #[test]
    fn placement_accessors_follow_variant() {
        let s = Uuid::new_v4();
        let sg = Uuid::new_v4();
        let p = Placement::from_columns(Some(s), Some(sg), None).unwrap();
        assert_eq!(p.stage_id(), Some(s));
        assert_eq!(p.stage_group_id(), Some(sg));
        assert_eq!(p.group_id(), None);
        let g = Placement::in_group(s);
        assert_eq!(g.stage_id(), None);
        assert_eq!(g.stage_group_id(), None);
    }

    #[test]
    fn tags_are_idempotent() {
        let mut st = ReviewState::default();
        let d1 = st.apply_tags(&["vip".into(), "vip".into()], &["absent".into()]);
        assert_eq!(d1.added, vec!["vip".to_string()]);
        assert!(d1.removed.is_empty());
        let d2 = st.apply_tags(&["vip".into()], &[]);
        assert!(d2.is_empty());
        assert_eq!(st.tags.len(), 1);
    }

    #[test]
    fn remove_runs_after_add() {
        let mut st = ReviewState::default();
        st.tags.insert("old".into());
        let d = st.apply_tags(&["x".into()], &["x".into(), "old".into()]);
        assert!(st.tags.is_empty());
        assert!(d.added.is_empty());
        assert_eq!(d.removed, vec!["old".to_string()]);
    }

    #[test]
    fn draft_starts_at_version_one() {
        let app = Application::new_draft(Uuid::new_v4(), None, Some("user-1".into()));
        assert_eq!(app.version, 1);
        assert_eq!(app.review.status, STATUS_DRAFT);
        assert!(!app.is_submitted());
        assert_eq!(app.review.placement, Placement::Unassigned);
    }
}
