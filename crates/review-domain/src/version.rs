// version.rs
use crate::{Application, DomainError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Origen de una escritura aceptada sobre `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Autosave,
    ManualSave,
    Submit,
    Restore,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Autosave => "autosave",
            ChangeType::ManualSave => "manual_save",
            ChangeType::Submit => "submit",
            ChangeType::Restore => "restore",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autosave" => Ok(ChangeType::Autosave),
            "manual_save" => Ok(ChangeType::ManualSave),
            "submit" => Ok(ChangeType::Submit),
            "restore" => Ok(ChangeType::Restore),
            other => Err(DomainError::ValidationError(format!("change_type desconocido: {other}"))),
        }
    }
}

/// Snapshot inmutable de `data` tras una escritura aceptada.
///
/// `checksum` es el sha256 del JSON de `data` (claves ordenadas), usado para
/// verificar integridad antes de restaurar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionVersion {
    pub id: Uuid,
    pub application_id: Uuid,
    pub version: i64,
    pub data: Map<String, Value>,
    pub changed_fields: Vec<String>,
    pub change_type: ChangeType,
    pub checksum: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionVersion {
    /// Captura el estado actual de `app` (ya con la versión nueva).
    pub fn capture(app: &Application,
                   change_type: ChangeType,
                   changed_fields: Vec<String>,
                   created_by: Option<&str>)
                   -> Self {
        Self { id: Uuid::new_v4(),
               application_id: app.id,
               version: app.version,
               data: app.data.clone(),
               checksum: Self::checksum_of(&app.data),
               changed_fields,
               change_type,
               created_by: created_by.map(str::to_string),
               created_at: Utc::now() }
    }

    pub fn checksum_of(data: &Map<String, Value>) -> String {
        // serde_json::Map ordena claves, la serialización es estable.
        let bytes = serde_json::to_vec(data).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }

    pub fn verify(&self) -> bool {
        Self::checksum_of(&self.data) == self.checksum
    }
}

/// Claves que difieren entre dos payloads (agregadas, quitadas o con valor
/// distinto), ordenadas.
pub fn changed_fields(before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<String> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|k| before.get(*k) != after.get(*k))
        .cloned()
        .collect()
}
