use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use review_domain::{normalized_name, parse_status_actions, ActionDefinition, ActionScope, ActionType, ApplicationGroup,
                    CustomStatus, Stage, StageGroup, StatusActionRule, Workflow};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::constants::*;
use crate::errors::ReviewError;
use crate::store::{PipelineRepository, WorkflowSeed};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStage {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    /// `None` agrega el stage al final.
    pub order_index: Option<i32>,
    #[serde(default)]
    pub custom_statuses: Vec<CustomStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub order_index: Option<i32>,
    pub custom_statuses: Option<Vec<CustomStatus>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStageGroup {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewApplicationGroup {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub order_index: Option<i32>,
}

/// Cambios sobre un stage group o application group. `description:
/// Some(None)` borra la descripción.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub order_index: Option<i32>,
}

impl GroupUpdate {
    /// Cambia algo distinto del nombre.
    fn touches_appearance(&self) -> bool {
        self.description.is_some() || self.color.is_some() || self.icon.is_some() || self.order_index.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAction {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    /// `move_to_group | move_to_stage | set_status`; vacío toma el default
    /// del scope.
    pub action_type: Option<String>,
    pub target_group_id: Option<Uuid>,
    pub target_stage_id: Option<Uuid>,
    pub status_value: Option<String>,
    #[serde(default)]
    pub requires_comment: bool,
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub action_type: Option<String>,
    pub target_group_id: Option<Option<Uuid>>,
    pub target_stage_id: Option<Option<Uuid>>,
    pub status_value: Option<Option<String>>,
    pub requires_comment: Option<bool>,
    pub order_index: Option<i32>,
}

/// CRUD de la configuración del pipeline.
pub struct PipelineService<P: PipelineRepository> {
    repo: Arc<P>,
}

impl<P: PipelineRepository> PipelineService<P> {
    pub fn new(repo: Arc<P>) -> Self {
        Self { repo }
    }

    /// Crea el workflow junto con Rejected, Waitlist y la acción Reject en
    /// una sola operación.
    pub fn create_workflow(&self, workspace_id: Uuid, name: &str, description: Option<String>)
                           -> Result<WorkflowSeed, ReviewError> {
        let workflow = Workflow::new(workspace_id, name, description)?;
        let now = Utc::now();
        let system_group = |name: &str, color: &str, icon: &str, order_index: i32| ApplicationGroup {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            name: name.to_string(),
            description: None,
            color: color.to_string(),
            icon: icon.to_string(),
            order_index,
            is_system: true,
            created_at: now,
        };
        let rejected = system_group(SYSTEM_GROUP_REJECTED, COLOR_RED, ICON_X_CIRCLE, 0);
        let waitlist = system_group(SYSTEM_GROUP_WAITLIST, COLOR_YELLOW, ICON_CLOCK, 1);
        let reject = ActionDefinition { id: Uuid::new_v4(),
                                        scope: ActionScope::Workflow(workflow.id),
                                        name: SYSTEM_ACTION_REJECT.to_string(),
                                        description: None,
                                        color: COLOR_RED.to_string(),
                                        icon: ICON_X_CIRCLE.to_string(),
                                        action_type: ActionType::MoveToGroup,
                                        target_group_id: Some(rejected.id),
                                        target_stage_id: None,
                                        status_value: None,
                                        requires_comment: false,
                                        is_system: true,
                                        order_index: 0,
                                        created_at: now };
        let seed = WorkflowSeed { workflow,
                                  groups: vec![rejected, waitlist],
                                  actions: vec![reject] };
        self.repo.seed_workflow(&seed)?;
        info!("workflow:created id={} name={}", seed.workflow.id, seed.workflow.name);
        Ok(seed)
    }

    pub fn workflow(&self, id: Uuid) -> Result<Workflow, ReviewError> {
        self.repo.workflow(id).map_err(|e| e.named("workflow", id))
    }

    // ---- stages -------------------------------------------------------

    pub fn create_stage(&self, workflow_id: Uuid, input: NewStage) -> Result<Stage, ReviewError> {
        self.workflow(workflow_id)?;
        let order_index = match input.order_index {
            Some(i) => i,
            None => self.repo
                        .stages(workflow_id)?
                        .iter()
                        .map(|s| s.order_index + 1)
                        .max()
                        .unwrap_or(0),
        };
        let mut stage = Stage::new(workflow_id, &input.name, order_index)?;
        stage.description = input.description;
        stage.color = input.color;
        stage.custom_statuses = input.custom_statuses;
        self.repo.insert_stage(&stage)?;
        debug!("stage:created id={} workflow_id={workflow_id} order_index={}", stage.id, stage.order_index);
        Ok(stage)
    }

    pub fn update_stage(&self, id: Uuid, input: StageUpdate) -> Result<Stage, ReviewError> {
        let mut stage = self.stage(id)?;
        if let Some(name) = input.name {
            stage.name = normalized_name(&name, "stage")?;
        }
        if let Some(description) = input.description {
            stage.description = description;
        }
        if let Some(color) = input.color {
            stage.color = color;
        }
        if let Some(order_index) = input.order_index {
            if order_index < 0 {
                return Err(ReviewError::Validation(format!("negative order_index {order_index}")));
            }
            stage.order_index = order_index;
        }
        if let Some(statuses) = input.custom_statuses {
            stage.custom_statuses = statuses;
        }
        self.repo.update_stage(&stage)?;
        Ok(stage)
    }

    pub fn stage(&self, id: Uuid) -> Result<Stage, ReviewError> {
        self.repo.stage(id).map_err(|e| e.named("stage", id))
    }

    /// Configura (o con `None` elimina) la regla de un status label.
    pub fn set_status_rule(&self, stage_id: Uuid, label: &str, rule: Option<StatusActionRule>)
                           -> Result<Stage, ReviewError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ReviewError::Validation("status label is required".into()));
        }
        let mut stage = self.stage(stage_id)?;
        if let Some(rule) = &rule {
            self.ensure_rule_targets(&stage, rule)?;
        }
        match rule {
            Some(rule) => {
                stage.status_actions.insert(label.to_string(), rule);
            }
            None => {
                stage.status_actions.shift_remove(label);
            }
        }
        self.repo.update_stage(&stage)?;
        Ok(stage)
    }

    /// Reemplaza todas las reglas desde JSON crudo; las entradas mal formadas
    /// se descartan.
    pub fn set_status_actions_raw(&self, stage_id: Uuid, raw: &Value) -> Result<Stage, ReviewError> {
        let mut stage = self.stage(stage_id)?;
        stage.status_actions = parse_status_actions(raw);
        self.repo.update_stage(&stage)?;
        Ok(stage)
    }

    pub fn stages_ordered(&self, workflow_id: Uuid) -> Result<Vec<Stage>, ReviewError> {
        Ok(self.repo.stages(workflow_id)?)
    }

    // ---- stage groups -------------------------------------------------

    pub fn create_stage_group(&self, stage_id: Uuid, input: NewStageGroup) -> Result<StageGroup, ReviewError> {
        let stage = self.stage(stage_id)?;
        let name = normalized_name(&input.name, "stage group")?;
        let existing = self.repo.stage_groups(stage_id)?;
        if existing.iter().any(|g| g.name.eq_ignore_ascii_case(&name)) {
            return Err(ReviewError::Conflict(format!("stage group '{name}' already exists in stage {stage_id}")));
        }
        let group = StageGroup { id: Uuid::new_v4(),
                                 stage_id,
                                 workflow_id: stage.workflow_id,
                                 name,
                                 description: input.description,
                                 color: or_default(input.color, DEFAULT_STAGE_GROUP_COLOR),
                                 icon: or_default(input.icon, DEFAULT_STAGE_GROUP_ICON),
                                 order_index: input.order_index.unwrap_or(existing.len() as i32),
                                 created_at: Utc::now() };
        self.repo.insert_stage_group(&group)?;
        Ok(group)
    }

    pub fn update_stage_group(&self, id: Uuid, input: GroupUpdate) -> Result<StageGroup, ReviewError> {
        let mut group = self.repo.stage_group(id).map_err(|e| e.named("stage group", id))?;
        if let Some(name) = input.name {
            let name = normalized_name(&name, "stage group")?;
            let clash = self.repo
                            .stage_groups(group.stage_id)?
                            .iter()
                            .any(|g| g.id != id && g.name.eq_ignore_ascii_case(&name));
            if clash {
                return Err(ReviewError::Conflict(format!("stage group '{name}' already exists")));
            }
            group.name = name;
        }
        if let Some(description) = input.description {
            group.description = description;
        }
        if let Some(color) = input.color {
            group.color = or_default(Some(color), DEFAULT_STAGE_GROUP_COLOR);
        }
        if let Some(icon) = input.icon {
            group.icon = or_default(Some(icon), DEFAULT_STAGE_GROUP_ICON);
        }
        if let Some(order_index) = input.order_index {
            group.order_index = order_index;
        }
        self.repo.update_stage_group(&group)?;
        Ok(group)
    }

    /// Borra el grupo; las aplicaciones que lo referenciaban quedan en el
    /// stage sin sub-bucket. Devuelve cuántas se limpiaron.
    pub fn delete_stage_group(&self, id: Uuid) -> Result<usize, ReviewError> {
        let cleared = self.repo.delete_stage_group(id).map_err(|e| e.named("stage group", id))?;
        info!("stage_group:deleted id={id} cleared_applications={cleared}");
        Ok(cleared)
    }

    pub fn stage_groups(&self, stage_id: Uuid) -> Result<Vec<StageGroup>, ReviewError> {
        Ok(self.repo.stage_groups(stage_id)?)
    }

    // ---- application groups -------------------------------------------

    pub fn create_application_group(&self, workflow_id: Uuid, input: NewApplicationGroup)
                                    -> Result<ApplicationGroup, ReviewError> {
        self.workflow(workflow_id)?;
        let name = normalized_name(&input.name, "application group")?;
        let existing = self.repo.application_groups(workflow_id)?;
        if existing.iter().any(|g| g.name.eq_ignore_ascii_case(&name)) {
            return Err(ReviewError::Conflict(format!("application group '{name}' already exists")));
        }
        let group = ApplicationGroup { id: Uuid::new_v4(),
                                       workflow_id,
                                       name,
                                       description: input.description,
                                       color: or_default(input.color, DEFAULT_APPLICATION_GROUP_COLOR),
                                       icon: or_default(input.icon, DEFAULT_APPLICATION_GROUP_ICON),
                                       order_index: input.order_index.unwrap_or(existing.len() as i32),
                                       is_system: false,
                                       created_at: Utc::now() };
        self.repo.insert_application_group(&group)?;
        Ok(group)
    }

    pub fn update_application_group(&self, id: Uuid, input: GroupUpdate) -> Result<ApplicationGroup, ReviewError> {
        let mut group = self.repo
                            .application_group(id)
                            .map_err(|e| e.named("application group", id))?;
        if group.is_system && input.touches_appearance() {
            return Err(ReviewError::Forbidden(format!("system group '{}' cannot be modified", group.name)));
        }
        if let Some(name) = input.name {
            let name = normalized_name(&name, "application group")?;
            if group.is_system && name != group.name {
                return Err(ReviewError::Forbidden(format!("system group '{}' cannot be renamed", group.name)));
            }
            let clash = self.repo
                            .application_groups(group.workflow_id)?
                            .iter()
                            .any(|g| g.id != id && g.name.eq_ignore_ascii_case(&name));
            if clash {
                return Err(ReviewError::Conflict(format!("application group '{name}' already exists")));
            }
            group.name = name;
        }
        if let Some(description) = input.description {
            group.description = description;
        }
        if let Some(color) = input.color {
            group.color = or_default(Some(color), DEFAULT_APPLICATION_GROUP_COLOR);
        }
        if let Some(icon) = input.icon {
            group.icon = or_default(Some(icon), DEFAULT_APPLICATION_GROUP_ICON);
        }
        if let Some(order_index) = input.order_index {
            group.order_index = order_index;
        }
        self.repo.update_application_group(&group)?;
        Ok(group)
    }

    pub fn delete_application_group(&self, id: Uuid) -> Result<(), ReviewError> {
        let group = self.repo
                        .application_group(id)
                        .map_err(|e| e.named("application group", id))?;
        if group.is_system {
            return Err(ReviewError::Forbidden(format!("system group '{}' cannot be deleted", group.name)));
        }
        self.repo
            .delete_application_group(id)
            .map_err(|e| e.named("application group", id))
    }

    pub fn application_groups(&self, workflow_id: Uuid) -> Result<Vec<ApplicationGroup>, ReviewError> {
        Ok(self.repo.application_groups(workflow_id)?)
    }

    // ---- actions ------------------------------------------------------

    pub fn create_action(&self, scope: ActionScope, input: NewAction) -> Result<ActionDefinition, ReviewError> {
        let workflow_id = self.scope_workflow(scope)?;
        let (default_type, default_color, default_icon) = match scope {
            ActionScope::Workflow(_) => {
                (ActionType::MoveToGroup, DEFAULT_WORKFLOW_ACTION_COLOR, DEFAULT_WORKFLOW_ACTION_ICON)
            }
            ActionScope::Stage(_) => (ActionType::SetStatus, DEFAULT_STAGE_ACTION_COLOR, DEFAULT_STAGE_ACTION_ICON),
        };
        let action_type = match input.action_type.as_deref().map(str::trim) {
            None | Some("") => default_type,
            Some(raw) => raw.parse::<ActionType>()?,
        };
        let order_index = match input.order_index {
            Some(i) => i,
            None => self.repo.actions(scope)?.len() as i32,
        };
        let action = ActionDefinition { id: Uuid::new_v4(),
                                        scope,
                                        name: normalized_name(&input.name, "action")?,
                                        description: input.description,
                                        color: or_default(input.color, default_color),
                                        icon: or_default(input.icon, default_icon),
                                        action_type,
                                        target_group_id: input.target_group_id,
                                        target_stage_id: input.target_stage_id,
                                        status_value: input.status_value,
                                        requires_comment: input.requires_comment,
                                        is_system: false,
                                        order_index,
                                        created_at: Utc::now() };
        action.validate()?;
        self.ensure_action_targets(workflow_id, &action)?;
        self.repo.insert_action(&action)?;
        debug!("action:created id={} scope={} type={}", action.id, scope.kind_str(), action.action_type);
        Ok(action)
    }

    pub fn update_action(&self, id: Uuid, input: ActionUpdate) -> Result<ActionDefinition, ReviewError> {
        let mut action = self.action(id)?;
        if action.is_system {
            return Err(ReviewError::Forbidden(format!("system action '{}' cannot be modified", action.name)));
        }
        if let Some(name) = input.name {
            action.name = normalized_name(&name, "action")?;
        }
        if let Some(description) = input.description {
            action.description = description;
        }
        if let Some(color) = input.color {
            action.color = color;
        }
        if let Some(icon) = input.icon {
            action.icon = icon;
        }
        if let Some(raw) = input.action_type {
            action.action_type = raw.parse::<ActionType>()?;
        }
        if let Some(target) = input.target_group_id {
            action.target_group_id = target;
        }
        if let Some(target) = input.target_stage_id {
            action.target_stage_id = target;
        }
        if let Some(value) = input.status_value {
            action.status_value = value;
        }
        if let Some(flag) = input.requires_comment {
            action.requires_comment = flag;
        }
        if let Some(order_index) = input.order_index {
            action.order_index = order_index;
        }
        action.validate()?;
        let workflow_id = self.scope_workflow(action.scope)?;
        self.ensure_action_targets(workflow_id, &action)?;
        self.repo.update_action(&action)?;
        Ok(action)
    }

    pub fn delete_action(&self, id: Uuid) -> Result<(), ReviewError> {
        let action = self.action(id)?;
        if action.is_system {
            return Err(ReviewError::Forbidden(format!("system action '{}' cannot be deleted", action.name)));
        }
        self.repo.delete_action(id).map_err(|e| e.named("action", id))
    }

    pub fn action(&self, id: Uuid) -> Result<ActionDefinition, ReviewError> {
        self.repo.action(id).map_err(|e| e.named("action", id))
    }

    pub fn actions_for(&self, scope: ActionScope) -> Result<Vec<ActionDefinition>, ReviewError> {
        Ok(self.repo.actions(scope)?)
    }

    // ---- helpers ------------------------------------------------------

    fn scope_workflow(&self, scope: ActionScope) -> Result<Uuid, ReviewError> {
        match scope {
            ActionScope::Workflow(id) => self.workflow(id).map(|w| w.id),
            ActionScope::Stage(id) => self.stage(id).map(|s| s.workflow_id),
        }
    }

    fn ensure_action_targets(&self, workflow_id: Uuid, action: &ActionDefinition) -> Result<(), ReviewError> {
        if let Some(group_id) = action.target_group_id {
            self.ensure_group_in(workflow_id, group_id)?;
        }
        if let Some(stage_id) = action.target_stage_id {
            self.ensure_stage_in(workflow_id, stage_id)?;
        }
        Ok(())
    }

    fn ensure_rule_targets(&self, stage: &Stage, rule: &StatusActionRule) -> Result<(), ReviewError> {
        if let Some(group_id) = rule.move_to_group_id {
            self.ensure_group_in(stage.workflow_id, group_id)?;
        }
        if let Some(stage_id) = rule.move_to_stage_id {
            self.ensure_stage_in(stage.workflow_id, stage_id)?;
        }
        Ok(())
    }

    fn ensure_group_in(&self, workflow_id: Uuid, group_id: Uuid) -> Result<(), ReviewError> {
        let group = self.repo
                        .application_group(group_id)
                        .map_err(|e| e.named("application group", group_id))?;
        if group.workflow_id != workflow_id {
            return Err(ReviewError::Validation(format!("application group {group_id} belongs to another workflow")));
        }
        Ok(())
    }

    fn ensure_stage_in(&self, workflow_id: Uuid, stage_id: Uuid) -> Result<(), ReviewError> {
        let stage = self.stage(stage_id)?;
        if stage.workflow_id != workflow_id {
            return Err(ReviewError::Validation(format!("stage {stage_id} belongs to another workflow")));
        }
        Ok(())
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    value.map(|v| v.trim().to_string())
         .filter(|v| !v.is_empty())
         .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn service() -> (PipelineService<InMemoryStore>, Workflow) {
        let svc = PipelineService::new(Arc::new(InMemoryStore::new()));
        let seed = svc.create_workflow(Uuid::new_v4(), "Admissions", None).unwrap();
        (svc, seed.workflow)
    }

    #[test]
    fn workflow_is_seeded_with_system_groups_and_reject() {
        let (svc, wf) = service();
        let groups = svc.application_groups(wf.id).unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Rejected", "Waitlist"]);
        assert!(groups.iter().all(|g| g.is_system));
        let actions = svc.actions_for(ActionScope::Workflow(wf.id)).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target_group_id, Some(groups[0].id));
        assert_eq!(actions[0].color, "red");
    }

    #[test]
    fn defaults_fill_missing_color_and_icon() {
        let (svc, wf) = service();
        let stage = svc.create_stage(wf.id, NewStage { name: "Screening".into(), ..Default::default() })
                       .unwrap();
        let sg = svc.create_stage_group(stage.id, NewStageGroup { name: "Priority".into(), ..Default::default() })
                    .unwrap();
        assert_eq!((sg.color.as_str(), sg.icon.as_str()), ("blue", "folder"));
        let ag = svc.create_application_group(wf.id,
                                              NewApplicationGroup { name: "On hold".into(),
                                                                    color: Some("  ".into()),
                                                                    ..Default::default() })
                    .unwrap();
        assert_eq!((ag.color.as_str(), ag.icon.as_str()), ("gray", "folder"));
        let sa = svc.create_action(ActionScope::Stage(stage.id),
                                   NewAction { name: "Approve".into(),
                                               status_value: Some("Approved".into()),
                                               ..Default::default() })
                    .unwrap();
        assert_eq!(sa.action_type, ActionType::SetStatus);
        assert_eq!((sa.color.as_str(), sa.icon.as_str()), ("blue", "check"));
    }

    #[test]
    fn stages_append_in_order() {
        let (svc, wf) = service();
        let a = svc.create_stage(wf.id, NewStage { name: "A".into(), ..Default::default() }).unwrap();
        let b = svc.create_stage(wf.id, NewStage { name: "B".into(), ..Default::default() }).unwrap();
        assert_eq!((a.order_index, b.order_index), (0, 1));
        let ids: Vec<Uuid> = svc.stages_ordered(wf.id).unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn unknown_action_type_and_missing_target_are_rejected() {
        let (svc, wf) = service();
        let bad_type = svc.create_action(ActionScope::Workflow(wf.id),
                                         NewAction { name: "X".into(),
                                                     action_type: Some("teleport".into()),
                                                     ..Default::default() });
        assert!(matches!(bad_type, Err(ReviewError::Validation(_))));
        let no_target = svc.create_action(ActionScope::Workflow(wf.id),
                                          NewAction { name: "Y".into(), ..Default::default() });
        assert!(matches!(no_target, Err(ReviewError::Validation(_))));
    }

    #[test]
    fn system_entities_are_protected() {
        let (svc, wf) = service();
        let rejected = svc.application_groups(wf.id).unwrap().remove(0);
        assert!(matches!(svc.delete_application_group(rejected.id), Err(ReviewError::Forbidden(_))));
        let reject = svc.actions_for(ActionScope::Workflow(wf.id)).unwrap().remove(0);
        assert!(matches!(svc.delete_action(reject.id), Err(ReviewError::Forbidden(_))));
        let dup = svc.create_application_group(wf.id, NewApplicationGroup { name: "waitlist".into(), ..Default::default() });
        assert!(matches!(dup, Err(ReviewError::Conflict(_))));
    }

    #[test]
    fn system_action_and_group_cannot_be_edited() {
        let (svc, wf) = service();
        let groups = svc.application_groups(wf.id).unwrap();
        let (rejected, waitlist) = (&groups[0], &groups[1]);
        let reject = svc.actions_for(ActionScope::Workflow(wf.id)).unwrap().remove(0);

        let retarget = svc.update_action(reject.id,
                                         ActionUpdate { target_group_id: Some(Some(waitlist.id)),
                                                        ..Default::default() });
        assert!(matches!(retarget, Err(ReviewError::Forbidden(_))));
        let rename = svc.update_action(reject.id, ActionUpdate { name: Some("Decline".into()), ..Default::default() });
        assert!(matches!(rename, Err(ReviewError::Forbidden(_))));
        assert_eq!(svc.action(reject.id).unwrap(), reject);

        let recolor = svc.update_application_group(rejected.id,
                                                   GroupUpdate { color: Some("green".into()),
                                                                 ..Default::default() });
        assert!(matches!(recolor, Err(ReviewError::Forbidden(_))));
        let reorder = svc.update_application_group(waitlist.id,
                                                   GroupUpdate { order_index: Some(9), ..Default::default() });
        assert!(matches!(reorder, Err(ReviewError::Forbidden(_))));
        assert_eq!(&svc.application_groups(wf.id).unwrap(), &groups);

        // mismo nombre: no cambia nada y se acepta
        let same = svc.update_application_group(rejected.id,
                                                GroupUpdate { name: Some("Rejected".into()), ..Default::default() })
                      .unwrap();
        assert_eq!(&same, rejected);
    }

    #[test]
    fn status_rule_can_be_set_and_removed() {
        let (svc, wf) = service();
        let stage = svc.create_stage(wf.id, NewStage { name: "Review".into(), ..Default::default() }).unwrap();
        let rule = StatusActionRule { add_tags: vec!["vip".into()],
                                      ..Default::default() };
        let stage = svc.set_status_rule(stage.id, "Accepted", Some(rule)).unwrap();
        assert!(stage.rule_for("Accepted").is_some());
        let stage = svc.set_status_rule(stage.id, "Accepted", None).unwrap();
        assert!(stage.rule_for("Accepted").is_none());
    }
}
