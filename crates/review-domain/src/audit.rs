// audit.rs
use crate::{DomainError, Placement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Secuencia de historial a la que pertenece una entrada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Action,
    Stage,
    Move,
    Review,
}

impl HistoryKind {
    pub const ALL: [HistoryKind; 4] = [HistoryKind::Action, HistoryKind::Stage, HistoryKind::Move, HistoryKind::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Action => "action_history",
            HistoryKind::Stage => "stage_history",
            HistoryKind::Move => "move_history",
            HistoryKind::Review => "review_history",
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action_history" | "action" => Ok(HistoryKind::Action),
            "stage_history" | "stage" => Ok(HistoryKind::Stage),
            "move_history" | "move" => Ok(HistoryKind::Move),
            "review_history" | "review" => Ok(HistoryKind::Review),
            other => Err(DomainError::ValidationError(format!("historial desconocido: {other}"))),
        }
    }
}

/// Detalle estructurado de la transición registrada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditDetail {
    ActionExecuted {
        from: Placement,
        to: Placement,
        status: Option<String>,
        current_status: Option<String>,
        #[serde(default)]
        tags_added: Vec<String>,
        #[serde(default)]
        tags_removed: Vec<String>,
        rule_applied: bool,
    },
    MovedToGroup {
        from: Placement,
        to_group_id: Uuid,
    },
    MovedToStage {
        from: Placement,
        to_stage_id: Uuid,
        restored: bool,
    },
    StageGroupChanged {
        stage_id: Uuid,
        from_stage_group_id: Option<Uuid>,
        to_stage_group_id: Option<Uuid>,
    },
    WorkflowAssigned {
        workflow_id: Uuid,
        from: Placement,
        to_stage_id: Uuid,
    },
    Submitted {
        stage_id: Option<Uuid>,
    },
    ReviewRecorded {
        scores: Map<String, Value>,
        decision: Option<String>,
        flagged: bool,
    },
}

/// Entrada a registrar; el store le asigna `seq` y `recorded_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub history: HistoryKind,
    pub reference: String,
    pub actor_id: Option<String>,
    pub comment: Option<String>,
    pub detail: AuditDetail,
}

impl NewAuditEntry {
    pub fn new(history: HistoryKind, reference: impl Into<String>, detail: AuditDetail) -> Self {
        Self { history,
               reference: reference.into(),
               actor_id: None,
               comment: None,
               detail }
    }

    pub fn by(mut self, actor_id: Option<&str>) -> Self {
        self.actor_id = actor_id.map(str::to_string);
        self
    }

    /// Comentarios vacíos o sólo espacios se guardan como ausentes.
    pub fn with_comment(mut self, comment: Option<&str>) -> Self {
        self.comment = comment.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string);
        self
    }

    pub fn into_entry(self, application_id: Uuid, seq: i64, recorded_at: DateTime<Utc>) -> AuditEntry {
        AuditEntry { seq,
                     application_id,
                     history: self.history,
                     reference: self.reference,
                     actor_id: self.actor_id,
                     comment: self.comment,
                     detail: self.detail,
                     recorded_at }
    }
}

/// Registro inmutable de una transición.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: i64,
    pub application_id: Uuid,
    pub history: HistoryKind,
    pub reference: String,
    pub actor_id: Option<String>,
    pub comment: Option<String>,
    pub detail: AuditDetail,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_kind_parses_both_spellings() {
        for kind in HistoryKind::ALL {
            assert_eq!(kind.as_str().parse::<HistoryKind>().unwrap(), kind);
        }
        assert_eq!("move".parse::<HistoryKind>().unwrap(), HistoryKind::Move);
        assert!("audit".parse::<HistoryKind>().is_err());
    }

    #[test]
    fn blank_comment_is_dropped() {
        let e = NewAuditEntry::new(HistoryKind::Move,
                                   "move_to_group",
                                   AuditDetail::MovedToGroup { from: Placement::Unassigned,
                                                               to_group_id: Uuid::new_v4() }).with_comment(Some("   "));
        assert!(e.comment.is_none());
    }
}
