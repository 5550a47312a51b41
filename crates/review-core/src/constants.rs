//! Constantes compartidas del motor de revisión.

/// Grupo de sistema sembrado en cada workflow nuevo.
pub const SYSTEM_GROUP_REJECTED: &str = "Rejected";
pub const SYSTEM_GROUP_WAITLIST: &str = "Waitlist";
/// Acción de sistema sembrada junto a los grupos.
pub const SYSTEM_ACTION_REJECT: &str = "Reject";

pub const COLOR_RED: &str = "red";
pub const COLOR_YELLOW: &str = "yellow";
pub const ICON_X_CIRCLE: &str = "x-circle";
pub const ICON_CLOCK: &str = "clock";

// Convenciones del workspace para color/icono cuando no se indican.
pub const DEFAULT_APPLICATION_GROUP_COLOR: &str = "gray";
pub const DEFAULT_APPLICATION_GROUP_ICON: &str = "folder";
pub const DEFAULT_STAGE_GROUP_COLOR: &str = "blue";
pub const DEFAULT_STAGE_GROUP_ICON: &str = "folder";
pub const DEFAULT_WORKFLOW_ACTION_COLOR: &str = "gray";
pub const DEFAULT_WORKFLOW_ACTION_ICON: &str = "circle";
pub const DEFAULT_STAGE_ACTION_COLOR: &str = "blue";
pub const DEFAULT_STAGE_ACTION_ICON: &str = "check";

/// Máximo de snapshots devueltos por `versions` (más recientes primero).
pub const VERSION_LIST_LIMIT: usize = 50;

/// Intentos de entrega antes de abandonar un efecto pendiente del outbox.
pub const OUTBOX_MAX_ATTEMPTS: i32 = 5;
