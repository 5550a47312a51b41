mod common;

use common::Fixture;
use review_core::notify::EffectState;
use review_core::{ActionRef, InMemoryNotifier, Invocation, NotificationEvent, OutboxDispatcher, OutboxStore};

#[test]
fn transitions_enqueue_effects_that_drain_once() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let after_submit = fx.store.pending_effects(100).unwrap();
    assert!(after_submit.iter()
                        .any(|e| matches!(e.event, NotificationEvent::NewSubmission { stage_id: Some(s) } if s == fx.screening.id)));

    fx.engine
      .execute(&ActionRef::Workflow(fx.reject_action), app.id, Invocation::default())
      .unwrap();
    let pending = fx.store.pending_effects(100).unwrap();
    assert!(pending.iter().any(|e| e.event.event_type() == "stage_changed"));

    let dispatcher = OutboxDispatcher::new(fx.store.clone(), InMemoryNotifier::new());
    let report = dispatcher.drain(100).unwrap();
    assert_eq!(report.delivered, pending.len());
    assert!(fx.store.effects().iter().all(|e| e.state == EffectState::Delivered));
    assert_eq!(dispatcher.drain(100).unwrap().processed(), 0);
}

#[test]
fn delivery_failure_never_touches_the_application() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let dispatcher = OutboxDispatcher::new(fx.store.clone(), InMemoryNotifier::failing(1));
    let report = dispatcher.drain(1).unwrap();
    assert_eq!(report.failed, 1);
    let again = dispatcher.drain(100).unwrap();
    assert!(again.delivered >= 1);
    assert_eq!(fx.engine.application(app.id).unwrap(), app);
}
