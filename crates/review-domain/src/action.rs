// action.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tipo declarado de una acción configurada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    MoveToGroup,
    MoveToStage,
    SetStatus,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::MoveToGroup => "move_to_group",
            ActionType::MoveToStage => "move_to_stage",
            ActionType::SetStatus => "set_status",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "move_to_group" => Ok(ActionType::MoveToGroup),
            "move_to_stage" => Ok(ActionType::MoveToStage),
            "set_status" => Ok(ActionType::SetStatus),
            other => Err(DomainError::ValidationError(format!("tipo de acción no reconocido: {other}"))),
        }
    }
}

/// Dueño de una acción: el workflow completo o un stage concreto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActionScope {
    Workflow(Uuid),
    Stage(Uuid),
}

impl ActionScope {
    pub fn owner_id(&self) -> Uuid {
        match self {
            ActionScope::Workflow(id) | ActionScope::Stage(id) => *id,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            ActionScope::Workflow(_) => "workflow",
            ActionScope::Stage(_) => "stage",
        }
    }

    pub fn from_parts(kind: &str, owner_id: Uuid) -> Result<Self, DomainError> {
        match kind {
            "workflow" => Ok(ActionScope::Workflow(owner_id)),
            "stage" => Ok(ActionScope::Stage(owner_id)),
            other => Err(DomainError::ValidationError(format!("scope de acción desconocido: {other}"))),
        }
    }
}

/// Acción con nombre que un operador puede invocar: Workflow Action o Stage
/// Action según `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: Uuid,
    pub scope: ActionScope,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub action_type: ActionType,
    pub target_group_id: Option<Uuid>,
    pub target_stage_id: Option<Uuid>,
    pub status_value: Option<String>,
    pub requires_comment: bool,
    pub is_system: bool,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

impl ActionDefinition {
    /// Verifica que el tipo declarado tenga el destino que necesita.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing = match self.action_type {
            ActionType::MoveToGroup if self.target_group_id.is_none() => Some("target_group_id"),
            ActionType::MoveToStage if self.target_stage_id.is_none() => Some("target_stage_id"),
            ActionType::SetStatus if self.status_value.as_deref().map_or(true, |s| s.trim().is_empty()) => {
                Some("status_value")
            }
            _ => None,
        };
        match missing {
            Some(field) => Err(DomainError::ValidationError(format!("acción '{}' ({}) requiere {field}",
                                                                    self.name, self.action_type))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(action_type: ActionType) -> ActionDefinition {
        ActionDefinition { id: Uuid::new_v4(),
                           scope: ActionScope::Workflow(Uuid::new_v4()),
                           name: "Reject".into(),
                           description: None,
                           color: "red".into(),
                           icon: "x-circle".into(),
                           action_type,
                           target_group_id: None,
                           target_stage_id: None,
                           status_value: None,
                           requires_comment: false,
                           is_system: false,
                           order_index: 0,
                           created_at: Utc::now() }
    }

    #[test]
    fn unknown_action_type_is_validation_error() {
        assert_eq!("set_status".parse::<ActionType>().unwrap(), ActionType::SetStatus);
        assert!(matches!("teleport".parse::<ActionType>(), Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn validate_requires_matching_target() {
        let mut a = sample(ActionType::MoveToGroup);
        assert!(a.validate().is_err());
        a.target_group_id = Some(Uuid::new_v4());
        assert!(a.validate().is_ok());

        let mut s = sample(ActionType::SetStatus);
        s.status_value = Some("  ".into());
        assert!(s.validate().is_err());
    }

    #[test]
    fn scope_round_trips_through_parts() {
        let owner = Uuid::new_v4();
        let scope = ActionScope::from_parts("stage", owner).unwrap();
        assert_eq!(scope, ActionScope::Stage(owner));
        assert_eq!(scope.kind_str(), "stage");
        assert!(ActionScope::from_parts("form", owner).is_err());
    }
}
