use std::sync::Arc;

use log::debug;
use review_domain::{ActionDefinition, ActionScope};
use uuid::Uuid;

use super::{ActionEffect, Effect};
use crate::errors::ReviewError;
use crate::store::PipelineRepository;

/// Referencia a una acción tal como la envía un operador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRef {
    Workflow(Uuid),
    Stage(Uuid),
    Status { stage_id: Uuid, label: String },
}

impl ActionRef {
    /// Interpreta el par `(action_type, action_id)` de la API de operadores.
    pub fn parse(action_type: &str, action_id: Uuid) -> Result<Self, ReviewError> {
        match action_type {
            "workflow_action" => Ok(ActionRef::Workflow(action_id)),
            "stage_action" => Ok(ActionRef::Stage(action_id)),
            other => Err(ReviewError::Validation(format!("invalid action type: {other}"))),
        }
    }

    pub fn status(stage_id: Uuid, label: impl Into<String>) -> Self {
        ActionRef::Status { stage_id,
                            label: label.into() }
    }
}

/// Resuelve referencias contra la configuración del pipeline.
pub struct ActionCatalog<P: PipelineRepository> {
    repo: Arc<P>,
}

impl<P: PipelineRepository> Clone for ActionCatalog<P> {
    fn clone(&self) -> Self {
        Self { repo: Arc::clone(&self.repo) }
    }
}

impl<P: PipelineRepository> ActionCatalog<P> {
    pub fn new(repo: Arc<P>) -> Self {
        Self { repo }
    }

    pub fn resolve(&self, action_ref: &ActionRef) -> Result<ActionEffect, ReviewError> {
        let resolved = match action_ref {
            ActionRef::Workflow(id) => self.resolve_workflow_action(*id),
            ActionRef::Stage(id) => self.resolve_stage_action(*id),
            ActionRef::Status { stage_id, label } => self.resolve_status_rule(*stage_id, label),
        }?;
        debug!("resolve ref={:?} -> {}", action_ref, resolved.reference());
        Ok(resolved)
    }

    pub fn resolve_workflow_action(&self, id: Uuid) -> Result<ActionEffect, ReviewError> {
        let action = self.scoped_action(id, "workflow action")?;
        match action.scope {
            ActionScope::Workflow(_) => Ok(ActionEffect::WorkflowAction { action_id: action.id,
                                                                          effect: Effect::from_action(&action),
                                                                          name: action.name }),
            ActionScope::Stage(_) => Err(ReviewError::not_found("workflow action", id)),
        }
    }

    pub fn resolve_stage_action(&self, id: Uuid) -> Result<ActionEffect, ReviewError> {
        let action = self.scoped_action(id, "stage action")?;
        match action.scope {
            ActionScope::Stage(stage_id) => Ok(ActionEffect::StageAction { action_id: action.id,
                                                                           stage_id,
                                                                           effect: Effect::from_action(&action),
                                                                           name: action.name }),
            ActionScope::Workflow(_) => Err(ReviewError::not_found("stage action", id)),
        }
    }

    /// Un label sin regla es válido: resuelve a un efecto vacío con
    /// `rule_applied = false`.
    pub fn resolve_status_rule(&self, stage_id: Uuid, label: &str) -> Result<ActionEffect, ReviewError> {
        let key = label.trim();
        if key.is_empty() {
            return Err(ReviewError::Validation("status label must not be empty".into()));
        }
        let stage = self.repo.stage(stage_id).map_err(|e| e.named("stage", stage_id))?;
        // El label se guarda tal cual; sólo la búsqueda de regla lo recorta.
        let (effect, rule_applied) = match stage.rule_for(key) {
            Some(rule) => (Effect::from_rule(rule), true),
            None => (Effect::default(), false),
        };
        Ok(ActionEffect::StatusRule { stage_id,
                                      label: label.to_string(),
                                      rule_applied,
                                      effect })
    }

    fn scoped_action(&self, id: Uuid, what: &str) -> Result<ActionDefinition, ReviewError> {
        self.repo.action(id).map_err(|e| e.named(what, id))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use indexmap::IndexMap;
    use review_domain::{ActionType, Stage, StatusActionRule};

    fn action(scope: ActionScope) -> ActionDefinition {
        ActionDefinition { id: Uuid::new_v4(),
                           scope,
                           name: "Advance".into(),
                           description: None,
                           color: "blue".into(),
                           icon: "check".into(),
                           action_type: ActionType::MoveToStage,
                           target_group_id: None,
                           target_stage_id: Some(Uuid::new_v4()),
                           status_value: Some("advanced".into()),
                           requires_comment: true,
                           is_system: false,
                           order_index: 0,
                           created_at: Utc::now() }
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        assert!(matches!(ActionRef::parse("form_action", Uuid::new_v4()), Err(ReviewError::Validation(_))));
    }

    #[test]
    fn scope_mismatch_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let a = action(ActionScope::Stage(Uuid::new_v4()));
        store.insert_action(&a).unwrap();
        let catalog = ActionCatalog::new(store);
        assert!(matches!(catalog.resolve(&ActionRef::Workflow(a.id)), Err(ReviewError::NotFound(_))));
        let resolved = catalog.resolve(&ActionRef::Stage(a.id)).unwrap();
        assert!(resolved.requires_comment());
        assert_eq!(resolved.effect().set_status.as_deref(), Some("advanced"));
        assert!(resolved.status_label().is_none());
    }

    #[test]
    fn missing_rule_resolves_to_empty_effect() {
        let store = Arc::new(InMemoryStore::new());
        let mut stage = Stage::new(Uuid::new_v4(), "Review", 0).unwrap();
        let mut rules = IndexMap::new();
        rules.insert("Accepted".to_string(),
                     StatusActionRule { add_tags: vec!["accepted".into()],
                                        ..Default::default() });
        stage.status_actions = rules;
        store.insert_stage(&stage).unwrap();
        let catalog = ActionCatalog::new(store);

        let none = catalog.resolve(&ActionRef::status(stage.id, "On Hold")).unwrap();
        assert!(!none.rule_applied());
        assert_eq!(none.effect(), &Effect::default());

        let some = catalog.resolve(&ActionRef::status(stage.id, "Accepted")).unwrap();
        assert!(some.rule_applied());
        assert_eq!(some.status_label(), Some("Accepted"));

        assert!(matches!(catalog.resolve(&ActionRef::status(Uuid::new_v4(), "Accepted")),
                         Err(ReviewError::NotFound(_))));
    }

    #[test]
    fn padded_label_keeps_its_spelling_but_finds_the_rule() {
        let store = Arc::new(InMemoryStore::new());
        let mut stage = Stage::new(Uuid::new_v4(), "Review", 0).unwrap();
        stage.status_actions.insert("Accepted".to_string(), StatusActionRule::default());
        store.insert_stage(&stage).unwrap();
        let catalog = ActionCatalog::new(store);

        let padded = catalog.resolve(&ActionRef::status(stage.id, "  Accepted ")).unwrap();
        assert!(padded.rule_applied());
        assert_eq!(padded.status_label(), Some("  Accepted "));
        assert!(matches!(catalog.resolve(&ActionRef::status(stage.id, "   ")), Err(ReviewError::Validation(_))));
    }
}
