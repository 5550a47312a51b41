//! `ConcurrencyController`: autosave, guardado manual, envío y restauración.
//!
//! Cada escritura aceptada incrementa `version` exactamente en 1 y deja un
//! `SubmissionVersion` inmutable en el mismo `Commit`, así que el número de
//! snapshots de una aplicación siempre coincide con el de escrituras.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use review_domain::{changed_fields, Application, AuditDetail, ChangeType, HistoryKind, NewAuditEntry, Placement,
                    SubmissionVersion, STATUS_SUBMITTED};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::merge_object;
use crate::constants::VERSION_LIST_LIMIT;
use crate::errors::{ReviewError, StoreError};
use crate::notify::{NotificationEvent, PendingEffect};
use crate::store::{ApplicationStore, Commit, PipelineRepository, WriteOutcome};

/// Respuesta de un autosave aceptado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutosaveReceipt {
    pub version: i64,
    pub saved_at: DateTime<Utc>,
    pub changed_fields: Vec<String>,
}

/// Cambio de un campo entre dos snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Comparación entre dos versiones de una aplicación.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionDiff {
    pub from_version: i64,
    pub to_version: i64,
    pub changes: Vec<FieldChange>,
}

pub struct ConcurrencyController<S, P>
    where S: ApplicationStore,
          P: PipelineRepository
{
    store: Arc<S>,
    repo: Arc<P>,
}

impl<S, P> ConcurrencyController<S, P>
    where S: ApplicationStore,
          P: PipelineRepository
{
    pub fn new(store: Arc<S>, repo: Arc<P>) -> Self {
        Self { store, repo }
    }

    /// Devuelve la aplicación que el solicitante ya tiene para el formulario,
    /// o abre un borrador vacío (versión 1, status `draft`). Sin solicitante
    /// siempre se abre uno nuevo.
    pub fn open_draft(&self, form_id: Uuid, workflow_id: Option<Uuid>, applicant_id: Option<&str>)
                      -> Result<Application, ReviewError> {
        if let Some(id) = workflow_id {
            self.repo.workflow(id).map_err(|e| e.named("workflow", id))?;
        }
        if let Some(applicant) = applicant_id {
            if let Some(existing) = self.store.find_by_applicant(form_id, applicant)? {
                debug!("open_draft:existing application_id={} form_id={form_id}", existing.id);
                return Ok(existing);
            }
        }
        let app = Application::new_draft(form_id, workflow_id, applicant_id.map(str::to_string));
        self.store.insert(&app)?;
        debug!("open_draft application_id={} form_id={form_id}", app.id);
        Ok(app)
    }

    /// Fusiona `change_set` sobre `data` si `base_version` coincide con la
    /// versión almacenada; si no, devuelve el estado del servidor. Un
    /// `change_set` vacío también cuenta como escritura.
    pub fn autosave(&self, id: Uuid, base_version: i64, change_set: Map<String, Value>, actor: Option<&str>)
                    -> Result<WriteOutcome<AutosaveReceipt>, ReviewError> {
        let outcome = self.store.compare_and_set(id, base_version, |app| {
                                    let now = Utc::now();
                                    let changed: Vec<String> = change_set.keys().cloned().collect();
                                    app.data = merge_object(&app.data, &change_set);
                                    app.version += 1;
                                    app.last_autosave_at = Some(now);
                                    app.updated_at = now;
                                    let snapshot =
                                        SubmissionVersion::capture(app, ChangeType::Autosave, changed.clone(), actor);
                                    let receipt = AutosaveReceipt { version: app.version,
                                                                    saved_at: now,
                                                                    changed_fields: changed };
                                    Ok((receipt, Commit::write().with_snapshot(snapshot)))
                                })?;
        if let WriteOutcome::Conflict(c) = &outcome {
            warn!("autosave conflict application_id={id} client_version={base_version} server_version={}",
                  c.server_version);
        }
        Ok(outcome)
    }

    /// Reemplaza `data` completo. Sólo verifica conflicto si se indica una
    /// versión distinta de cero.
    pub fn manual_save(&self, id: Uuid, full_data: Map<String, Value>, version: Option<i64>, actor: Option<&str>)
                       -> Result<WriteOutcome<Application>, ReviewError> {
        let write = move |app: &mut Application| -> Result<(Application, Commit), ReviewError> {
            let changed = changed_fields(&app.data, &full_data);
            app.data = full_data;
            app.version += 1;
            app.updated_at = Utc::now();
            let snapshot = SubmissionVersion::capture(app, ChangeType::ManualSave, changed, actor);
            Ok((app.clone(), Commit::write().with_snapshot(snapshot)))
        };
        match version {
            Some(expected) if expected != 0 => {
                let outcome = self.store.compare_and_set(id, expected, write)?;
                if let WriteOutcome::Conflict(c) = &outcome {
                    warn!("manual_save conflict application_id={id} client_version={expected} server_version={}",
                          c.server_version);
                }
                Ok(outcome)
            }
            _ => Ok(WriteOutcome::Applied(self.store.modify(id, write)?)),
        }
    }

    /// Envío definitivo. Rechaza una aplicación ya enviada; si el workflow
    /// tiene un stage con `order_index == 0` la coloca allí.
    pub fn submit(&self, id: Uuid, actor: Option<&str>) -> Result<Application, ReviewError> {
        let current = self.store.load(id).map_err(|e| e.named("application", id))?;
        let initial_stage = match current.workflow_id {
            Some(workflow_id) => self.initial_stage(workflow_id)?,
            None => None,
        };
        let app = self.store.modify(id, |app| {
                                if app.is_submitted() || app.submitted_at.is_some() {
                                    return Err(ReviewError::Validation("application already submitted".into()));
                                }
                                let now = Utc::now();
                                let previous_status = app.review.status.clone();
                                app.review.status = STATUS_SUBMITTED.to_string();
                                app.submitted_at = Some(now);
                                app.version += 1;
                                app.updated_at = now;
                                // El stage se resolvió con el workflow leído antes del lock.
                                let stage_id = initial_stage.filter(|_| app.workflow_id == current.workflow_id);
                                let from = app.review.placement;
                                if let Some(stage_id) = stage_id {
                                    app.review.placement = Placement::in_stage(stage_id);
                                }
                                let snapshot = SubmissionVersion::capture(app, ChangeType::Submit, Vec::new(), actor);
                                let mut effects =
                                    vec![PendingEffect::new(app, NotificationEvent::NewSubmission { stage_id }),
                                         PendingEffect::new(app,
                                                            NotificationEvent::StatusChanged { previous_status,
                                                                                               new_status:
                                                                                                   STATUS_SUBMITTED.to_string() })];
                                let mut commit = Commit::write();
                                if let Some(stage_id) = stage_id.filter(|s| from.stage_id() != Some(*s)) {
                                    effects.push(PendingEffect::new(app,
                                                                    NotificationEvent::StageChanged { previous_stage_id: from.stage_id(),
                                                                                                      new_stage_id: Some(stage_id),
                                                                                                      group_id: None }));
                                    commit = Commit::audited(NewAuditEntry::new(HistoryKind::Stage,
                                                                                "submit",
                                                                                AuditDetail::Submitted { stage_id: Some(stage_id) }).by(actor));
                                }
                                Ok((app.clone(), commit.with_snapshot(snapshot).with_effects(effects)))
                            })?;
        debug!("submit:done application_id={id} version={} stage_id={:?}", app.version, app.stage_id());
        Ok(app)
    }

    /// Copia el `data` de un snapshot histórico como data actual, con una
    /// versión nueva (nunca reutiliza el número restaurado).
    pub fn restore(&self, id: Uuid, target_version: i64, actor: Option<&str>) -> Result<Application, ReviewError> {
        let source = self.version(id, target_version)?;
        if !source.verify() {
            return Err(ReviewError::Internal(format!("snapshot {} failed checksum verification", source.id)));
        }
        self.store.modify(id, |app| {
                      let changed = changed_fields(&app.data, &source.data);
                      app.data = source.data.clone();
                      app.version += 1;
                      app.updated_at = Utc::now();
                      let snapshot = SubmissionVersion::capture(app, ChangeType::Restore, changed, actor);
                      Ok((app.clone(), Commit::write().with_snapshot(snapshot)))
                  })
    }

    /// Snapshots más recientes primero.
    pub fn versions(&self, id: Uuid) -> Result<Vec<SubmissionVersion>, ReviewError> {
        Ok(self.store.versions(id, VERSION_LIST_LIMIT)?)
    }

    pub fn version(&self, id: Uuid, version: i64) -> Result<SubmissionVersion, ReviewError> {
        self.store.version(id, version).map_err(|e| match e {
                                            StoreError::NotFound(_) => {
                                                ReviewError::NotFound(format!("version {version} of application {id}"))
                                            }
                                            other => other.into(),
                                        })
    }

    /// Diferencias campo a campo entre dos snapshots.
    pub fn compare_versions(&self, id: Uuid, from_version: i64, to_version: i64) -> Result<VersionDiff, ReviewError> {
        let from = self.version(id, from_version)?;
        let to = self.version(id, to_version)?;
        let changes = changed_fields(&from.data, &to.data).into_iter()
                                                          .map(|field| FieldChange { before: from.data.get(&field).cloned(),
                                                                                     after: to.data.get(&field).cloned(),
                                                                                     field })
                                                          .collect();
        Ok(VersionDiff { from_version,
                         to_version,
                         changes })
    }

    fn initial_stage(&self, workflow_id: Uuid) -> Result<Option<Uuid>, ReviewError> {
        let stages = self.repo.stages(workflow_id)?;
        Ok(stages.into_iter().find(|s| s.order_index == 0).map(|s| s.id))
    }
}
