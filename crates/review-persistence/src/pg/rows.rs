//! Filas Diesel y su conversión a entidades de dominio.
//!
//! Los campos estructurados (data, tags, reglas de status, detalle de
//! auditoría, evento del outbox) se guardan como JSONB con la misma forma
//! serde que usa el dominio.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use review_core::notify::{EffectState, NotificationEvent, PendingEffect};
use review_domain::{ActionDefinition, ActionScope, ActionType, Application, ApplicationGroup, AuditDetail, AuditEntry,
                    ChangeType, CustomStatus, HistoryKind, NewAuditEntry, Placement, ReviewState, Stage, StageGroup,
                    SubmissionVersion, Workflow};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::schema::{application_groups, applications, audit_log, outbox, review_actions, stage_groups, stages,
                    submission_versions, workflows};

fn corrupt(e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::CorruptRow(e.to_string())
}

fn object(v: Value) -> Result<Map<String, Value>, PersistenceError> {
    match v {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(corrupt(format!("expected JSON object, got {other}"))),
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = workflows)]
#[diesel(treat_none_as_null = true)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowRow {
    fn from(w: &Workflow) -> Self {
        Self { id: w.id,
               workspace_id: w.workspace_id,
               name: w.name.clone(),
               description: w.description.clone(),
               is_active: w.is_active,
               created_at: w.created_at }
    }
}

impl From<WorkflowRow> for Workflow {
    fn from(r: WorkflowRow) -> Self {
        Self { id: r.id,
               workspace_id: r.workspace_id,
               name: r.name,
               description: r.description,
               is_active: r.is_active,
               created_at: r.created_at }
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = stages)]
#[diesel(treat_none_as_null = true)]
pub struct StageRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub order_index: i32,
    pub custom_statuses: Value,
    pub status_actions: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&Stage> for StageRow {
    type Error = PersistenceError;

    fn try_from(s: &Stage) -> Result<Self, Self::Error> {
        Ok(Self { id: s.id,
                  workflow_id: s.workflow_id,
                  name: s.name.clone(),
                  description: s.description.clone(),
                  color: s.color.clone(),
                  order_index: s.order_index,
                  custom_statuses: serde_json::to_value(&s.custom_statuses)?,
                  status_actions: serde_json::to_value(&s.status_actions)?,
                  created_at: s.created_at })
    }
}

impl StageRow {
    /// Las reglas se leen con el parser tolerante: una regla mal formada se
    /// descarta en vez de invalidar el stage completo.
    pub fn into_stage(self) -> Result<Stage, PersistenceError> {
        let custom_statuses: Vec<CustomStatus> = serde_json::from_value(self.custom_statuses)?;
        Ok(Stage { id: self.id,
                   workflow_id: self.workflow_id,
                   name: self.name,
                   description: self.description,
                   color: self.color,
                   order_index: self.order_index,
                   custom_statuses,
                   status_actions: review_domain::parse_status_actions(&self.status_actions),
                   created_at: self.created_at })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = stage_groups)]
#[diesel(treat_none_as_null = true)]
pub struct StageGroupRow {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&StageGroup> for StageGroupRow {
    fn from(g: &StageGroup) -> Self {
        Self { id: g.id,
               stage_id: g.stage_id,
               workflow_id: g.workflow_id,
               name: g.name.clone(),
               description: g.description.clone(),
               color: g.color.clone(),
               icon: g.icon.clone(),
               order_index: g.order_index,
               created_at: g.created_at }
    }
}

impl From<StageGroupRow> for StageGroup {
    fn from(r: StageGroupRow) -> Self {
        Self { id: r.id,
               stage_id: r.stage_id,
               workflow_id: r.workflow_id,
               name: r.name,
               description: r.description,
               color: r.color,
               icon: r.icon,
               order_index: r.order_index,
               created_at: r.created_at }
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = application_groups)]
#[diesel(treat_none_as_null = true)]
pub struct ApplicationGroupRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub order_index: i32,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&ApplicationGroup> for ApplicationGroupRow {
    fn from(g: &ApplicationGroup) -> Self {
        Self { id: g.id,
               workflow_id: g.workflow_id,
               name: g.name.clone(),
               description: g.description.clone(),
               color: g.color.clone(),
               icon: g.icon.clone(),
               order_index: g.order_index,
               is_system: g.is_system,
               created_at: g.created_at }
    }
}

impl From<ApplicationGroupRow> for ApplicationGroup {
    fn from(r: ApplicationGroupRow) -> Self {
        Self { id: r.id,
               workflow_id: r.workflow_id,
               name: r.name,
               description: r.description,
               color: r.color,
               icon: r.icon,
               order_index: r.order_index,
               is_system: r.is_system,
               created_at: r.created_at }
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = review_actions)]
#[diesel(treat_none_as_null = true)]
pub struct ActionRow {
    pub id: Uuid,
    pub scope_kind: String,
    pub scope_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub action_type: String,
    pub target_group_id: Option<Uuid>,
    pub target_stage_id: Option<Uuid>,
    pub status_value: Option<String>,
    pub requires_comment: bool,
    pub is_system: bool,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&ActionDefinition> for ActionRow {
    fn from(a: &ActionDefinition) -> Self {
        Self { id: a.id,
               scope_kind: a.scope.kind_str().to_string(),
               scope_id: a.scope.owner_id(),
               name: a.name.clone(),
               description: a.description.clone(),
               color: a.color.clone(),
               icon: a.icon.clone(),
               action_type: a.action_type.as_str().to_string(),
               target_group_id: a.target_group_id,
               target_stage_id: a.target_stage_id,
               status_value: a.status_value.clone(),
               requires_comment: a.requires_comment,
               is_system: a.is_system,
               order_index: a.order_index,
               created_at: a.created_at }
    }
}

impl TryFrom<ActionRow> for ActionDefinition {
    type Error = PersistenceError;

    fn try_from(r: ActionRow) -> Result<Self, Self::Error> {
        Ok(Self { id: r.id,
                  scope: ActionScope::from_parts(&r.scope_kind, r.scope_id).map_err(corrupt)?,
                  name: r.name,
                  description: r.description,
                  color: r.color,
                  icon: r.icon,
                  action_type: r.action_type.parse::<ActionType>().map_err(corrupt)?,
                  target_group_id: r.target_group_id,
                  target_stage_id: r.target_stage_id,
                  status_value: r.status_value,
                  requires_comment: r.requires_comment,
                  is_system: r.is_system,
                  order_index: r.order_index,
                  created_at: r.created_at })
    }
}

/// Fila de `applications`. La ubicación se descompone en tres columnas; el
/// CHECK de la tabla garantiza que stage y grupo no coexistan.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = applications)]
#[diesel(treat_none_as_null = true)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub form_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub applicant_id: Option<String>,
    pub data: Value,
    pub version: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_autosave_at: Option<DateTime<Utc>>,
    pub stage_id: Option<Uuid>,
    pub stage_group_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub status: String,
    pub current_status: Option<String>,
    pub tags: Value,
    pub scores: Value,
    pub decision: Option<String>,
    pub flagged: bool,
    pub extra: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&Application> for ApplicationRow {
    type Error = PersistenceError;

    fn try_from(a: &Application) -> Result<Self, Self::Error> {
        let review = &a.review;
        Ok(Self { id: a.id,
                  form_id: a.form_id,
                  workflow_id: a.workflow_id,
                  applicant_id: a.applicant_id.clone(),
                  data: Value::Object(a.data.clone()),
                  version: a.version,
                  submitted_at: a.submitted_at,
                  last_autosave_at: a.last_autosave_at,
                  stage_id: review.placement.stage_id(),
                  stage_group_id: review.placement.stage_group_id(),
                  group_id: review.placement.group_id(),
                  status: review.status.clone(),
                  current_status: review.current_status.clone(),
                  tags: serde_json::to_value(&review.tags)?,
                  scores: Value::Object(review.scores.clone()),
                  decision: review.decision.clone(),
                  flagged: review.flagged,
                  extra: Value::Object(a.extra.clone()),
                  created_at: a.created_at,
                  updated_at: a.updated_at })
    }
}

impl TryFrom<ApplicationRow> for Application {
    type Error = PersistenceError;

    fn try_from(r: ApplicationRow) -> Result<Self, Self::Error> {
        let placement = Placement::from_columns(r.stage_id, r.stage_group_id, r.group_id).map_err(corrupt)?;
        let tags: BTreeSet<String> = serde_json::from_value(r.tags)?;
        Ok(Self { id: r.id,
                  form_id: r.form_id,
                  workflow_id: r.workflow_id,
                  applicant_id: r.applicant_id,
                  data: object(r.data)?,
                  version: r.version,
                  submitted_at: r.submitted_at,
                  last_autosave_at: r.last_autosave_at,
                  review: ReviewState { placement,
                                        status: r.status,
                                        current_status: r.current_status,
                                        tags,
                                        scores: object(r.scores)?,
                                        decision: r.decision,
                                        flagged: r.flagged },
                  extra: object(r.extra)?,
                  created_at: r.created_at,
                  updated_at: r.updated_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = audit_log)]
pub struct NewAuditRow<'a> {
    pub application_id: Uuid,
    pub history: &'a str,
    pub reference: &'a str,
    pub actor_id: Option<&'a str>,
    pub comment: Option<&'a str>,
    pub detail: Value,
    pub recorded_at: DateTime<Utc>,
}

impl<'a> NewAuditRow<'a> {
    pub fn new(application_id: Uuid, entry: &'a NewAuditEntry, recorded_at: DateTime<Utc>)
               -> Result<Self, PersistenceError> {
        Ok(Self { application_id,
                  history: entry.history.as_str(),
                  reference: &entry.reference,
                  actor_id: entry.actor_id.as_deref(),
                  comment: entry.comment.as_deref(),
                  detail: serde_json::to_value(&entry.detail)?,
                  recorded_at })
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = audit_log)]
pub struct AuditRow {
    pub seq: i64,
    pub application_id: Uuid,
    pub history: String,
    pub reference: String,
    pub actor_id: Option<String>,
    pub comment: Option<String>,
    pub detail: Value,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = PersistenceError;

    fn try_from(r: AuditRow) -> Result<Self, Self::Error> {
        let detail: AuditDetail = serde_json::from_value(r.detail)?;
        Ok(Self { seq: r.seq,
                  application_id: r.application_id,
                  history: r.history.parse::<HistoryKind>().map_err(corrupt)?,
                  reference: r.reference,
                  actor_id: r.actor_id,
                  comment: r.comment,
                  detail,
                  recorded_at: r.recorded_at })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = submission_versions)]
pub struct VersionRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub version: i64,
    pub data: Value,
    pub changed_fields: Value,
    pub change_type: String,
    pub checksum: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&SubmissionVersion> for VersionRow {
    type Error = PersistenceError;

    fn try_from(v: &SubmissionVersion) -> Result<Self, Self::Error> {
        Ok(Self { id: v.id,
                  application_id: v.application_id,
                  version: v.version,
                  data: Value::Object(v.data.clone()),
                  changed_fields: serde_json::to_value(&v.changed_fields)?,
                  change_type: v.change_type.as_str().to_string(),
                  checksum: v.checksum.clone(),
                  created_by: v.created_by.clone(),
                  created_at: v.created_at })
    }
}

impl TryFrom<VersionRow> for SubmissionVersion {
    type Error = PersistenceError;

    fn try_from(r: VersionRow) -> Result<Self, Self::Error> {
        Ok(Self { id: r.id,
                  application_id: r.application_id,
                  version: r.version,
                  data: object(r.data)?,
                  changed_fields: serde_json::from_value(r.changed_fields)?,
                  change_type: r.change_type.parse::<ChangeType>().map_err(corrupt)?,
                  checksum: r.checksum,
                  created_by: r.created_by,
                  created_at: r.created_at })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = outbox)]
pub struct OutboxRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub form_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub event_type: String,
    pub event: Value,
    pub idempotency_key: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&PendingEffect> for OutboxRow {
    type Error = PersistenceError;

    fn try_from(e: &PendingEffect) -> Result<Self, Self::Error> {
        Ok(Self { id: e.id,
                  application_id: e.application_id,
                  form_id: e.form_id,
                  workflow_id: e.workflow_id,
                  event_type: e.event.event_type().to_string(),
                  event: serde_json::to_value(&e.event)?,
                  idempotency_key: e.idempotency_key.clone(),
                  attempts: e.attempts,
                  last_error: e.last_error.clone(),
                  state: e.state.as_str().to_string(),
                  created_at: e.created_at })
    }
}

impl TryFrom<OutboxRow> for PendingEffect {
    type Error = PersistenceError;

    fn try_from(r: OutboxRow) -> Result<Self, Self::Error> {
        let event: NotificationEvent = serde_json::from_value(r.event)?;
        Ok(Self { id: r.id,
                  application_id: r.application_id,
                  form_id: r.form_id,
                  workflow_id: r.workflow_id,
                  event,
                  idempotency_key: r.idempotency_key,
                  attempts: r.attempts,
                  last_error: r.last_error,
                  state: r.state.parse::<EffectState>().map_err(corrupt)?,
                  created_at: r.created_at })
    }
}
