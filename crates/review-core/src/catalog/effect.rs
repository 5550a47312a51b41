use review_domain::{ActionDefinition, StatusActionRule};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Destino de una transición. Un grupo tiene prioridad sobre un stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Group(Uuid),
    Stage(Uuid),
}

impl Target {
    pub fn from_pair(group_id: Option<Uuid>, stage_id: Option<Uuid>) -> Option<Self> {
        match (group_id, stage_id) {
            (Some(g), _) => Some(Target::Group(g)),
            (None, Some(s)) => Some(Target::Stage(s)),
            (None, None) => None,
        }
    }
}

/// Forma común de efecto a la que resuelven todas las fuentes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub target: Option<Target>,
    pub set_status: Option<String>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub requires_comment: bool,
    pub send_email: bool,
    pub email_template_id: Option<String>,
}

fn non_blank(s: Option<&String>) -> Option<String> {
    s.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl Effect {
    pub fn from_action(action: &ActionDefinition) -> Self {
        Self { target: Target::from_pair(action.target_group_id, action.target_stage_id),
               set_status: non_blank(action.status_value.as_ref()),
               requires_comment: action.requires_comment,
               ..Self::default() }
    }

    pub fn from_rule(rule: &StatusActionRule) -> Self {
        Self { target: Target::from_pair(rule.move_to_group_id, rule.move_to_stage_id),
               set_status: non_blank(rule.set_status.as_ref()),
               add_tags: rule.add_tags.clone(),
               remove_tags: rule.remove_tags.clone(),
               requires_comment: rule.require_comment,
               send_email: rule.send_email,
               email_template_id: non_blank(rule.email_template_id.as_ref()) }
    }
}

/// Efecto resuelto, etiquetado con su fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEffect {
    WorkflowAction {
        action_id: Uuid,
        name: String,
        effect: Effect,
    },
    StageAction {
        action_id: Uuid,
        stage_id: Uuid,
        name: String,
        effect: Effect,
    },
    StatusRule {
        stage_id: Uuid,
        label: String,
        rule_applied: bool,
        effect: Effect,
    },
}

impl ActionEffect {
    pub fn effect(&self) -> &Effect {
        match self {
            ActionEffect::WorkflowAction { effect, .. }
            | ActionEffect::StageAction { effect, .. }
            | ActionEffect::StatusRule { effect, .. } => effect,
        }
    }

    pub fn requires_comment(&self) -> bool {
        self.effect().requires_comment
    }

    /// Label de status invocado; sólo existe para reglas de status.
    pub fn status_label(&self) -> Option<&str> {
        match self {
            ActionEffect::StatusRule { label, .. } => Some(label),
            _ => None,
        }
    }

    /// `false` sólo cuando se invocó un label sin regla configurada.
    pub fn rule_applied(&self) -> bool {
        match self {
            ActionEffect::StatusRule { rule_applied, .. } => *rule_applied,
            _ => true,
        }
    }

    /// Referencia estable que se guarda en la auditoría.
    pub fn reference(&self) -> String {
        match self {
            ActionEffect::WorkflowAction { action_id, .. } => format!("workflow_action:{action_id}"),
            ActionEffect::StageAction { action_id, .. } => format!("stage_action:{action_id}"),
            ActionEffect::StatusRule { stage_id, label, .. } => format!("status:{stage_id}:{label}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_wins_over_stage() {
        let g = Uuid::new_v4();
        let s = Uuid::new_v4();
        assert_eq!(Target::from_pair(Some(g), Some(s)), Some(Target::Group(g)));
        assert_eq!(Target::from_pair(None, Some(s)), Some(Target::Stage(s)));
    }

    #[test]
    fn rule_with_blank_status_sets_nothing() {
        let rule = StatusActionRule { set_status: Some(" ".into()),
                                      add_tags: vec!["a".into()],
                                      ..StatusActionRule::default() };
        let e = Effect::from_rule(&rule);
        assert!(e.set_status.is_none());
        assert_eq!(e.add_tags, vec!["a".to_string()]);
        assert!(e.target.is_none());
    }
}
