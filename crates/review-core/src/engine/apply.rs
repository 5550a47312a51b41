use review_domain::{Application, Placement, ReviewState, TagDelta};
use uuid::Uuid;

use crate::catalog::{Effect, Target};
use crate::notify::{NotificationEvent, PendingEffect};

/// Diferencias producidas al aplicar un efecto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChanges {
    pub from: Placement,
    pub to: Placement,
    pub previous_status: String,
    pub new_status: String,
    pub tags: TagDelta,
}

/// Rutina única de aplicación de efectos.
///
/// Orden: destino (grupo excluye stage y viceversa), status, tags
/// (`add` primero, luego `remove`). Moverse al mismo stage conserva el
/// `stage_group_id`; cualquier otro destino lo descarta.
pub fn apply_effect(state: &mut ReviewState, effect: &Effect) -> AppliedChanges {
    let from = state.placement;
    let previous_status = state.status.clone();
    match effect.target {
        Some(Target::Group(group_id)) => state.placement = Placement::in_group(group_id),
        Some(Target::Stage(stage_id)) => state.placement = placement_for_stage(from, stage_id),
        None => {}
    }
    if let Some(status) = &effect.set_status {
        state.status = status.clone();
    }
    let tags = state.apply_tags(&effect.add_tags, &effect.remove_tags);
    AppliedChanges { from,
                     to: state.placement,
                     new_status: state.status.clone(),
                     previous_status,
                     tags }
}

pub(crate) fn placement_for_stage(from: Placement, stage_id: Uuid) -> Placement {
    match from {
        Placement::InStage { stage_id: current, stage_group_id } if current == stage_id => {
            Placement::InStage { stage_id, stage_group_id }
        }
        _ => Placement::in_stage(stage_id),
    }
}

/// Efectos de outbox que corresponden a los cambios aplicados.
pub fn notifications_for(app: &Application, changes: &AppliedChanges, effect: Option<&Effect>, label: Option<&str>)
                         -> Vec<PendingEffect> {
    let mut out = Vec::new();
    if changes.from != changes.to {
        out.push(PendingEffect::new(app,
                                    NotificationEvent::StageChanged { previous_stage_id: changes.from.stage_id(),
                                                                      new_stage_id: changes.to.stage_id(),
                                                                      group_id: changes.to.group_id() }));
    }
    if changes.previous_status != changes.new_status {
        out.push(PendingEffect::new(app,
                                    NotificationEvent::StatusChanged { previous_status: changes.previous_status.clone(),
                                                                       new_status: changes.new_status.clone() }));
    }
    if !changes.tags.is_empty() {
        out.push(PendingEffect::new(app,
                                    NotificationEvent::TagChanged { added: changes.tags.added.clone(),
                                                                    removed: changes.tags.removed.clone(),
                                                                    tags: app.review.tags.iter().cloned().collect() }));
    }
    if let Some(effect) = effect.filter(|e| e.send_email) {
        out.push(PendingEffect::new(app,
                                    NotificationEvent::ReminderEmail { status_label: label.unwrap_or_default()
                                                                                          .to_string(),
                                                                       template_id: effect.email_template_id.clone() }));
    }
    out
}
