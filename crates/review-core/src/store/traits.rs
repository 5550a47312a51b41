use review_domain::{ActionDefinition, ActionScope, Application, ApplicationGroup, AuditEntry, HistoryKind, NewAuditEntry,
                    Stage, StageGroup, SubmissionVersion, Workflow};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{ReviewError, StoreError};
use crate::notify::PendingEffect;

/// Lo que debe persistirse junto con el registro modificado, en la misma
/// unidad atómica. Un `Commit` descartado no escribe nada.
#[derive(Debug, Clone)]
pub struct Commit {
    write: bool,
    pub audit: Option<NewAuditEntry>,
    pub snapshot: Option<SubmissionVersion>,
    pub effects: Vec<PendingEffect>,
}

impl Commit {
    /// Escribe el registro sin entradas asociadas.
    pub fn write() -> Self {
        Self { write: true,
               audit: None,
               snapshot: None,
               effects: Vec::new() }
    }

    /// No persiste nada (el closure sólo leyó o detectó un conflicto).
    pub fn discard() -> Self {
        Self { write: false,
               ..Self::write() }
    }

    /// Escribe el registro y una entrada de auditoría.
    pub fn audited(entry: NewAuditEntry) -> Self {
        Self { audit: Some(entry),
               ..Self::write() }
    }

    pub fn with_snapshot(mut self, snapshot: SubmissionVersion) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_effects(mut self, effects: Vec<PendingEffect>) -> Self {
        self.effects.extend(effects);
        self
    }

    pub fn is_write(&self) -> bool {
        self.write
    }
}

/// Estado del servidor devuelto cuando la versión base no coincide.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionConflict {
    pub server_data: Map<String, Value>,
    pub server_version: i64,
}

/// Resultado de una escritura con control de versión.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Applied(T),
    Conflict(VersionConflict),
}

impl<T> WriteOutcome<T> {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            WriteOutcome::Applied(v) => Some(v),
            WriteOutcome::Conflict(_) => None,
        }
    }
}

/// Criterio de listado de aplicaciones por ubicación.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementFilter {
    Stage(Uuid),
    StageGroup(Uuid),
    Group(Uuid),
}

/// Almacenamiento de aplicaciones (registro + historiales + snapshots).
///
/// Contrato:
/// - `modify` es un read-modify-write atómico sobre un único registro: el
///   closure recibe una copia; si devuelve `Err` o un `Commit` descartado no
///   se persiste nada. Si escribe, el registro, la entrada de auditoría, el
///   snapshot y los efectos del `Commit` se confirman juntos o no se
///   confirma ninguno.
/// - Los historiales y snapshots sólo crecen.
pub trait ApplicationStore: Send + Sync {
    /// Inserta un registro nuevo (`Duplicate` si el id ya existe).
    fn insert(&self, application: &Application) -> Result<(), StoreError>;

    fn load(&self, id: Uuid) -> Result<Application, StoreError>;

    fn modify<T, F>(&self, id: Uuid, f: F) -> Result<T, ReviewError>
        where F: FnOnce(&mut Application) -> Result<(T, Commit), ReviewError>;

    /// Compare-and-set sobre `version`: si la versión almacenada difiere de
    /// `expected_version` devuelve `Conflict` con el estado del servidor sin
    /// tocar nada; si coincide aplica `f` como en `modify`.
    fn compare_and_set<T, F>(&self, id: Uuid, expected_version: i64, f: F) -> Result<WriteOutcome<T>, ReviewError>
        where F: FnOnce(&mut Application) -> Result<(T, Commit), ReviewError>
    {
        self.modify(id, |app| {
                if app.version != expected_version {
                    let conflict = VersionConflict { server_data: app.data.clone(),
                                                     server_version: app.version };
                    return Ok((WriteOutcome::Conflict(conflict), Commit::discard()));
                }
                let (value, commit) = f(app)?;
                Ok((WriteOutcome::Applied(value), commit))
            })
    }

    /// Historial `kind` en orden de inserción.
    fn history(&self, id: Uuid, kind: HistoryKind) -> Result<Vec<AuditEntry>, StoreError>;

    /// Snapshots más recientes primero, como máximo `limit`.
    fn versions(&self, id: Uuid, limit: usize) -> Result<Vec<SubmissionVersion>, StoreError>;

    fn version(&self, id: Uuid, version: i64) -> Result<SubmissionVersion, StoreError>;

    fn list_by_placement(&self, filter: PlacementFilter) -> Result<Vec<Application>, StoreError>;

    /// La aplicación más antigua de `applicant_id` para `form_id`, en
    /// cualquier estado.
    fn find_by_applicant(&self, form_id: Uuid, applicant_id: &str) -> Result<Option<Application>, StoreError>;
}

/// Configuración del pipeline.
///
/// `seed_workflow` y `delete_stage_group` son operaciones todo-o-nada: la
/// segunda limpia `stage_group_id` de cada aplicación que lo referencia en la
/// misma unidad atómica en la que borra el grupo.
pub trait PipelineRepository: Send + Sync {
    fn seed_workflow(&self, seed: &WorkflowSeed) -> Result<(), StoreError>;
    fn workflow(&self, id: Uuid) -> Result<Workflow, StoreError>;

    fn insert_stage(&self, stage: &Stage) -> Result<(), StoreError>;
    fn update_stage(&self, stage: &Stage) -> Result<(), StoreError>;
    fn stage(&self, id: Uuid) -> Result<Stage, StoreError>;
    /// Stages del workflow ordenados por `order_index` y luego por creación.
    fn stages(&self, workflow_id: Uuid) -> Result<Vec<Stage>, StoreError>;

    fn insert_stage_group(&self, group: &StageGroup) -> Result<(), StoreError>;
    fn update_stage_group(&self, group: &StageGroup) -> Result<(), StoreError>;
    fn stage_group(&self, id: Uuid) -> Result<StageGroup, StoreError>;
    fn stage_groups(&self, stage_id: Uuid) -> Result<Vec<StageGroup>, StoreError>;
    /// Devuelve cuántas aplicaciones quedaron sin `stage_group_id`.
    fn delete_stage_group(&self, id: Uuid) -> Result<usize, StoreError>;

    fn insert_application_group(&self, group: &ApplicationGroup) -> Result<(), StoreError>;
    fn update_application_group(&self, group: &ApplicationGroup) -> Result<(), StoreError>;
    fn application_group(&self, id: Uuid) -> Result<ApplicationGroup, StoreError>;
    fn application_groups(&self, workflow_id: Uuid) -> Result<Vec<ApplicationGroup>, StoreError>;
    /// `InUse` si alguna aplicación sigue dentro del grupo o una acción lo
    /// tiene como destino.
    fn delete_application_group(&self, id: Uuid) -> Result<(), StoreError>;

    fn insert_action(&self, action: &ActionDefinition) -> Result<(), StoreError>;
    fn update_action(&self, action: &ActionDefinition) -> Result<(), StoreError>;
    fn action(&self, id: Uuid) -> Result<ActionDefinition, StoreError>;
    fn actions(&self, scope: ActionScope) -> Result<Vec<ActionDefinition>, StoreError>;
    fn delete_action(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Outbox de efectos pendientes.
pub trait OutboxStore: Send + Sync {
    /// Efectos en estado `pending`, más antiguos primero.
    fn pending_effects(&self, limit: usize) -> Result<Vec<PendingEffect>, StoreError>;
    fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError>;
    /// Suma un intento fallido; con `abandon` el efecto deja de estar pendiente.
    fn record_failure(&self, id: Uuid, error: &str, abandon: bool) -> Result<(), StoreError>;
}

/// Workflow recién creado con sus grupos y acciones de sistema.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSeed {
    pub workflow: Workflow,
    pub groups: Vec<ApplicationGroup>,
    pub actions: Vec<ActionDefinition>,
}
