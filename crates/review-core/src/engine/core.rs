//! `TransitionEngine`: ejecuta acciones y primitivas de movimiento.
//!
//! Contrato común de cada operación:
//! 1. Resolver el destino (catálogo o argumento directo) y verificar que
//!    exista. `NotFound` sin mutación.
//! 2. Validar precondiciones (comentario obligatorio, pertenencia al
//!    workflow). `Validation` sin mutación.
//! 3. Dentro de `ApplicationStore::modify`: aplicar el efecto, construir una
//!    única entrada de auditoría y los efectos de outbox, y confirmarlos
//!    juntos.

use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;
use review_domain::{Application, AuditDetail, AuditEntry, HistoryKind, NewAuditEntry, Placement};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::apply::{apply_effect, notifications_for, placement_for_stage, AppliedChanges};
use crate::catalog::{ActionCatalog, ActionEffect, ActionRef, Target};
use crate::errors::ReviewError;
use crate::notify::{NotificationEvent, PendingEffect};
use crate::store::{ApplicationStore, Commit, PipelineRepository, PlacementFilter};
use crate::versioning::merge_object;

/// Quién invoca y con qué comentario.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invocation<'a> {
    pub actor_id: Option<&'a str>,
    pub comment: Option<&'a str>,
}

impl<'a> Invocation<'a> {
    pub fn by(actor_id: &'a str) -> Self {
        Self { actor_id: Some(actor_id),
               comment: None }
    }

    pub fn with_comment(mut self, comment: &'a str) -> Self {
        self.comment = Some(comment);
        self
    }

    fn has_comment(&self) -> bool {
        self.comment.map_or(false, |c| !c.trim().is_empty())
    }

    fn audit(&self, entry: NewAuditEntry) -> NewAuditEntry {
        entry.by(self.actor_id).with_comment(self.comment)
    }
}

/// Estado resultante de una transición.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionSummary {
    pub application_id: Uuid,
    pub status: String,
    pub current_status: Option<String>,
    pub stage_id: Option<Uuid>,
    pub stage_group_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub tags: Vec<String>,
    /// `false` sólo si se invocó un label de status sin regla configurada.
    pub action_applied: bool,
}

impl TransitionSummary {
    fn of(app: &Application, action_applied: bool) -> Self {
        Self { application_id: app.id,
               status: app.review.status.clone(),
               current_status: app.review.current_status.clone(),
               stage_id: app.stage_id(),
               stage_group_id: app.stage_group_id(),
               group_id: app.group_id(),
               tags: app.review.tags.iter().cloned().collect(),
               action_applied }
    }
}

/// Datos de una revisión registrada por un evaluador.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewInput {
    pub scores: Map<String, Value>,
    pub decision: Option<String>,
    pub flagged: Option<bool>,
}

pub struct TransitionEngine<S, P>
    where S: ApplicationStore,
          P: PipelineRepository
{
    store: Arc<S>,
    repo: Arc<P>,
    catalog: ActionCatalog<P>,
}

impl<S, P> TransitionEngine<S, P>
    where S: ApplicationStore,
          P: PipelineRepository
{
    pub fn new(store: Arc<S>, repo: Arc<P>) -> Self {
        let catalog = ActionCatalog::new(Arc::clone(&repo));
        Self { store,
               repo,
               catalog }
    }

    pub fn catalog(&self) -> &ActionCatalog<P> {
        &self.catalog
    }

    /// Ejecuta una Workflow Action, Stage Action o regla de status.
    pub fn execute(&self, action_ref: &ActionRef, application_id: Uuid, inv: Invocation<'_>)
                   -> Result<TransitionSummary, ReviewError> {
        let resolved = self.catalog.resolve(action_ref)?;
        self.apply_resolved(application_id, &resolved, inv)
    }

    /// Atajo de `execute` para `ActionRef::Status`.
    pub fn execute_status_action(&self, stage_id: Uuid, status_label: &str, application_id: Uuid, inv: Invocation<'_>)
                                 -> Result<TransitionSummary, ReviewError> {
        self.execute(&ActionRef::status(stage_id, status_label), application_id, inv)
    }

    fn apply_resolved(&self, application_id: Uuid, resolved: &ActionEffect, inv: Invocation<'_>)
                      -> Result<TransitionSummary, ReviewError> {
        if resolved.requires_comment() && !inv.has_comment() {
            return Err(ReviewError::Validation("this action requires a comment".into()));
        }
        let effect = resolved.effect();
        let target_workflow = self.target_workflow(effect.target)?;
        let summary = self.store.modify(application_id, |app| {
                                    adopt_workflow(app, target_workflow)?;
                                    let changes = apply_effect(&mut app.review, effect);
                                    if let Some(label) = resolved.status_label() {
                                        app.review.current_status = Some(label.to_string());
                                    }
                                    let entry = inv.audit(NewAuditEntry::new(HistoryKind::Action,
                                                                             resolved.reference(),
                                                                             action_detail(app, &changes, resolved)));
                                    let effects = notifications_for(app, &changes, Some(effect), resolved.status_label());
                                    Ok((TransitionSummary::of(app, resolved.rule_applied()),
                                        Commit::audited(entry).with_effects(effects)))
                                })?;
        debug!("execute:done application_id={application_id} ref={} status={}",
               resolved.reference(),
               summary.status);
        Ok(summary)
    }

    /// Saca la aplicación del pipeline hacia un Application Group.
    pub fn move_to_group(&self, application_id: Uuid, group_id: Uuid, inv: Invocation<'_>)
                         -> Result<TransitionSummary, ReviewError> {
        let target_workflow = self.target_workflow(Some(Target::Group(group_id)))?;
        self.store.modify(application_id, |app| {
                      adopt_workflow(app, target_workflow)?;
                      let from = app.review.placement;
                      app.review.placement = Placement::in_group(group_id);
                      let entry = inv.audit(NewAuditEntry::new(HistoryKind::Move,
                                                               format!("move_to_group:{group_id}"),
                                                               AuditDetail::MovedToGroup { from,
                                                                                           to_group_id: group_id }));
                      let effects = placement_notifications(app, from);
                      Ok((TransitionSummary::of(app, true), Commit::audited(entry).with_effects(effects)))
                  })
    }

    /// Mueve la aplicación a un stage (desde otro stage, un grupo o sin
    /// asignar).
    pub fn move_to_stage(&self, application_id: Uuid, stage_id: Uuid, inv: Invocation<'_>)
                         -> Result<TransitionSummary, ReviewError> {
        self.stage_move(application_id, stage_id, inv, false)
    }

    /// Devuelve al pipeline una aplicación que está en un Application Group.
    pub fn restore_from_group(&self, application_id: Uuid, stage_id: Uuid, inv: Invocation<'_>)
                              -> Result<TransitionSummary, ReviewError> {
        self.stage_move(application_id, stage_id, inv, true)
    }

    fn stage_move(&self, application_id: Uuid, stage_id: Uuid, inv: Invocation<'_>, restore: bool)
                  -> Result<TransitionSummary, ReviewError> {
        let target_workflow = self.target_workflow(Some(Target::Stage(stage_id)))?;
        let (history, reference) = if restore {
            (HistoryKind::Move, format!("restore_from_group:{stage_id}"))
        } else {
            (HistoryKind::Stage, format!("move_to_stage:{stage_id}"))
        };
        self.store.modify(application_id, |app| {
                      if restore && app.group_id().is_none() {
                          return Err(ReviewError::Validation("application is not in a group".into()));
                      }
                      adopt_workflow(app, target_workflow)?;
                      let from = app.review.placement;
                      app.review.placement = placement_for_stage(from, stage_id);
                      let entry = inv.audit(NewAuditEntry::new(history,
                                                               reference,
                                                               AuditDetail::MovedToStage { from,
                                                                                           to_stage_id: stage_id,
                                                                                           restored: restore }));
                      let effects = placement_notifications(app, from);
                      Ok((TransitionSummary::of(app, true), Commit::audited(entry).with_effects(effects)))
                  })
    }

    /// Asigna (o con `None` quita) el Stage Group dentro del stage actual.
    pub fn move_to_stage_group(&self, application_id: Uuid, stage_group_id: Option<Uuid>, inv: Invocation<'_>)
                               -> Result<TransitionSummary, ReviewError> {
        let group = match stage_group_id {
            Some(id) => Some(self.repo.stage_group(id).map_err(|e| e.named("stage group", id))?),
            None => None,
        };
        self.store.modify(application_id, |app| {
                      let stage_id = app.stage_id()
                                        .ok_or_else(|| ReviewError::Validation("application is not in a stage".into()))?;
                      if let Some(g) = &group {
                          if g.stage_id != stage_id {
                              return Err(ReviewError::Validation(format!("stage group {} belongs to another stage",
                                                                         g.id)));
                          }
                      }
                      let from_stage_group_id = app.stage_group_id();
                      app.review.placement = Placement::InStage { stage_id,
                                                                  stage_group_id };
                      let reference = match stage_group_id {
                          Some(id) => format!("move_to_stage_group:{id}"),
                          None => "clear_stage_group".to_string(),
                      };
                      let entry = inv.audit(NewAuditEntry::new(HistoryKind::Move,
                                                               reference,
                                                               AuditDetail::StageGroupChanged { stage_id,
                                                                                                from_stage_group_id,
                                                                                                to_stage_group_id:
                                                                                                    stage_group_id }));
                      Ok((TransitionSummary::of(app, true), Commit::audited(entry)))
                  })
    }

    /// Asigna workflow y stage a cada id de forma independiente. Los ids
    /// inexistentes (o que fallen) se omiten; devuelve cuántos se asignaron.
    pub fn bulk_assign_workflow(&self, application_ids: &[Uuid], workflow_id: Uuid, stage_id: Uuid, inv: Invocation<'_>)
                                -> Result<usize, ReviewError> {
        self.repo.workflow(workflow_id).map_err(|e| e.named("workflow", workflow_id))?;
        let stage = self.repo.stage(stage_id).map_err(|e| e.named("stage", stage_id))?;
        if stage.workflow_id != workflow_id {
            return Err(ReviewError::Validation(format!("stage {stage_id} does not belong to workflow {workflow_id}")));
        }
        let count = application_ids.par_iter()
                                   .filter(|id| match self.assign_one(**id, workflow_id, stage_id, inv) {
                                       Ok(()) => true,
                                       Err(ReviewError::NotFound(_)) => {
                                           debug!("bulk_assign:skip missing application_id={id}");
                                           false
                                       }
                                       Err(e) => {
                                           warn!("bulk_assign:skip application_id={id} err={e}");
                                           false
                                       }
                                   })
                                   .count();
        debug!("bulk_assign:done workflow_id={workflow_id} stage_id={stage_id} requested={} assigned={count}",
               application_ids.len());
        Ok(count)
    }

    fn assign_one(&self, application_id: Uuid, workflow_id: Uuid, stage_id: Uuid, inv: Invocation<'_>)
                  -> Result<(), ReviewError> {
        self.store.modify(application_id, |app| {
                      let from = app.review.placement;
                      app.workflow_id = Some(workflow_id);
                      app.review.placement = placement_for_stage(from, stage_id);
                      let entry = inv.audit(NewAuditEntry::new(HistoryKind::Stage,
                                                               format!("assign_workflow:{workflow_id}"),
                                                               AuditDetail::WorkflowAssigned { workflow_id,
                                                                                               from,
                                                                                               to_stage_id: stage_id }));
                      let effects = placement_notifications(app, from);
                      Ok(((), Commit::audited(entry).with_effects(effects)))
                  })
    }

    /// Registra puntajes/decisión de un evaluador en `review_history`.
    /// Los puntajes se fusionan clave a clave sobre los existentes.
    pub fn record_review(&self, application_id: Uuid, input: ReviewInput, inv: Invocation<'_>)
                         -> Result<TransitionSummary, ReviewError> {
        if input.scores.is_empty() && input.decision.is_none() && input.flagged.is_none() {
            return Err(ReviewError::Validation("review has no scores, decision or flag".into()));
        }
        self.store.modify(application_id, |app| {
                      app.review.scores = merge_object(&app.review.scores, &input.scores);
                      if let Some(decision) = &input.decision {
                          app.review.decision = Some(decision.clone());
                      }
                      if let Some(flagged) = input.flagged {
                          app.review.flagged = flagged;
                      }
                      let entry = inv.audit(NewAuditEntry::new(HistoryKind::Review,
                                                               "review",
                                                               AuditDetail::ReviewRecorded { scores: input.scores.clone(),
                                                                                             decision: input.decision.clone(),
                                                                                             flagged: app.review.flagged }));
                      Ok((TransitionSummary::of(app, true), Commit::audited(entry)))
                  })
    }

    pub fn history(&self, application_id: Uuid, kind: HistoryKind) -> Result<Vec<AuditEntry>, ReviewError> {
        Ok(self.store.history(application_id, kind)?)
    }

    pub fn application(&self, application_id: Uuid) -> Result<Application, ReviewError> {
        self.store
            .load(application_id)
            .map_err(|e| e.named("application", application_id))
    }

    /// Aplicaciones dentro de un Application Group.
    pub fn applications_in_group(&self, group_id: Uuid) -> Result<Vec<Application>, ReviewError> {
        self.repo
            .application_group(group_id)
            .map_err(|e| e.named("application group", group_id))?;
        Ok(self.store.list_by_placement(PlacementFilter::Group(group_id))?)
    }

    /// Aplicaciones dentro de un stage.
    pub fn applications_in_stage(&self, stage_id: Uuid) -> Result<Vec<Application>, ReviewError> {
        self.repo.stage(stage_id).map_err(|e| e.named("stage", stage_id))?;
        Ok(self.store.list_by_placement(PlacementFilter::Stage(stage_id))?)
    }

    /// Verifica que el destino exista y devuelve su workflow. Se resuelve
    /// antes de `modify` para no consultar la configuración con el registro
    /// bloqueado.
    fn target_workflow(&self, target: Option<Target>) -> Result<Option<Uuid>, ReviewError> {
        let workflow_id = match target {
            Some(Target::Group(id)) => {
                let group = self.repo
                                .application_group(id)
                                .map_err(|e| e.named("application group", id))?;
                Some(group.workflow_id)
            }
            Some(Target::Stage(id)) => Some(self.repo.stage(id).map_err(|e| e.named("stage", id))?.workflow_id),
            None => None,
        };
        Ok(workflow_id)
    }
}

/// Un destino de otro workflow es un error; una aplicación sin workflow
/// pasa a pertenecer al del destino.
fn adopt_workflow(app: &mut Application, target_workflow: Option<Uuid>) -> Result<(), ReviewError> {
    match (app.workflow_id, target_workflow) {
        (Some(current), Some(target)) if current != target => {
            Err(ReviewError::Validation(format!("target belongs to workflow {target}, application is in {current}")))
        }
        (None, Some(target)) => {
            app.workflow_id = Some(target);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn action_detail(app: &Application, changes: &AppliedChanges, resolved: &ActionEffect) -> AuditDetail {
    AuditDetail::ActionExecuted { from: changes.from,
                                  to: changes.to,
                                  status: Some(app.review.status.clone()),
                                  current_status: app.review.current_status.clone(),
                                  tags_added: changes.tags.added.clone(),
                                  tags_removed: changes.tags.removed.clone(),
                                  rule_applied: resolved.rule_applied() }
}

fn placement_notifications(app: &Application, from: Placement) -> Vec<PendingEffect> {
    if from == app.review.placement {
        return Vec::new();
    }
    vec![PendingEffect::new(app,
                            NotificationEvent::StageChanged { previous_stage_id: from.stage_id(),
                                                              new_stage_id: app.stage_id(),
                                                              group_id: app.group_id() })]
}

