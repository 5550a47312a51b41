// pipeline.rs
use crate::{DomainError, StatusActionRule};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normaliza un nombre de entidad configurable (trim) y rechaza vacíos.
pub fn normalized_name(raw: &str, what: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::ValidationError(format!("{what}: el nombre no puede estar vacío")));
    }
    Ok(name.to_string())
}

/// Workflow de revisión de un workspace. Dueño de una secuencia ordenada de
/// stages y de sus application groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(workspace_id: Uuid, name: &str, description: Option<String>) -> Result<Self, DomainError> {
        Ok(Self { id: Uuid::new_v4(),
                  workspace_id,
                  name: normalized_name(name, "workflow")?,
                  description,
                  is_active: true,
                  created_at: Utc::now() })
    }
}

/// Botón de status disponible para los revisores dentro de un stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomStatus {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Paso ordenado del pipeline.
///
/// `status_actions` conserva el orden de configuración de las reglas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub order_index: i32,
    #[serde(default)]
    pub custom_statuses: Vec<CustomStatus>,
    #[serde(default)]
    pub status_actions: IndexMap<String, StatusActionRule>,
    pub created_at: DateTime<Utc>,
}

impl Stage {
    pub fn new(workflow_id: Uuid, name: &str, order_index: i32) -> Result<Self, DomainError> {
        if order_index < 0 {
            return Err(DomainError::ValidationError(format!("order_index negativo: {order_index}")));
        }
        Ok(Self { id: Uuid::new_v4(),
                  workflow_id,
                  name: normalized_name(name, "stage")?,
                  description: None,
                  color: None,
                  order_index,
                  custom_statuses: Vec::new(),
                  status_actions: IndexMap::new(),
                  created_at: Utc::now() })
    }

    /// Regla configurada para `label`, si existe.
    pub fn rule_for(&self, label: &str) -> Option<&StatusActionRule> {
        self.status_actions.get(label)
    }
}

/// Sub-bucket dentro de un stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGroup {
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

/// Área de espera fuera del pipeline (Rejected, Waitlist, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationGroup {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(normalized_name("  Interview ", "stage").unwrap(), "Interview");
        assert!(normalized_name("   ", "stage").is_err());
    }

    #[test]
    fn stage_rejects_negative_order() {
        assert!(Stage::new(Uuid::new_v4(), "Screening", -1).is_err());
        let st = Stage::new(Uuid::new_v4(), "Screening", 0).unwrap();
        assert!(st.rule_for("Accepted").is_none());
    }
}
