use std::sync::Arc;
use std::time::Duration;

use review_adapters::{spawn_outbox_worker, WorkerConfig};
use review_core::pipeline::{NewAction, NewStage};
use review_core::{ActionRef, ApplicationStore, InMemoryNotifier, Invocation, NotificationEvent, OutboxStore,
                  ReviewError, WriteOutcome};
use review_domain::{ActionScope, HistoryKind, StatusActionRule};
use reviewflow_rust::ReviewApp;
use serde_json::{json, Map};
use uuid::Uuid;

fn answers(pairs: &[(&str, serde_json::Value)]) -> Map<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn full_lifecycle_in_memory() {
    let app = ReviewApp::in_memory();
    let seed = app.pipeline.create_workflow(Uuid::new_v4(), "Fellowship", None).unwrap();
    let screening = app.pipeline
                       .create_stage(seed.workflow.id, NewStage { name: "Screening".into(),
                                                                  ..Default::default() })
                       .unwrap();
    let finals = app.pipeline
                    .create_stage(seed.workflow.id, NewStage { name: "Finals".into(),
                                                               ..Default::default() })
                    .unwrap();
    let advance = app.pipeline
                     .create_action(ActionScope::Stage(screening.id),
                                    NewAction { name: "Advance".into(),
                                                action_type: Some("move_to_stage".into()),
                                                target_stage_id: Some(finals.id),
                                                ..Default::default() })
                     .unwrap();

    let draft = app.versions.open_draft(Uuid::new_v4(), Some(seed.workflow.id), Some("a-1")).unwrap();
    let saved = app.versions
                   .autosave(draft.id, 1, answers(&[("name", json!("Lin"))]), Some("a-1"))
                   .unwrap();
    assert!(!saved.is_conflict());
    let submitted = app.versions.submit(draft.id, Some("a-1")).unwrap();
    assert_eq!(submitted.stage_id(), Some(screening.id));
    assert_eq!(submitted.version, 3);

    let summary = app.engine
                     .execute(&ActionRef::Stage(advance.id), draft.id, Invocation::by("rev"))
                     .unwrap();
    assert_eq!(summary.stage_id, Some(finals.id));

    // el postulante no toca la ubicación; la ubicación no toca data/version
    let stored = app.store.load(draft.id).unwrap();
    assert_eq!(stored.version, 3);
    assert_eq!(stored.data.get("name"), Some(&json!("Lin")));

    let stages = app.engine.history(draft.id, HistoryKind::Stage).unwrap();
    assert_eq!(stages.len(), 2);
    assert_eq!(app.versions.versions(draft.id).unwrap().len(), 2);
}

#[test]
fn conflicting_autosaves_keep_first_writer() {
    let app = ReviewApp::in_memory();
    let draft = app.versions.open_draft(Uuid::new_v4(), None, None).unwrap();
    let first = app.versions.autosave(draft.id, 1, answers(&[("q1", json!("a"))]), None).unwrap();
    let second = app.versions.autosave(draft.id, 1, answers(&[("q1", json!("b"))]), None).unwrap();
    assert!(!first.is_conflict());
    match second {
        WriteOutcome::Conflict(c) => {
            assert_eq!(c.server_version, 2);
            assert_eq!(c.server_data.get("q1"), Some(&json!("a")));
        }
        WriteOutcome::Applied(_) => panic!("second autosave must conflict"),
    }
}

#[test]
fn system_groups_are_protected() {
    let app = ReviewApp::in_memory();
    let seed = app.pipeline.create_workflow(Uuid::new_v4(), "Protected", None).unwrap();
    let rejected = &seed.groups[0];
    assert!(rejected.is_system);
    let err = app.pipeline.delete_application_group(rejected.id).unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
    let err = app.pipeline.delete_action(seed.actions[0].id).unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
}

#[test]
fn status_rule_reminder_reaches_notifier() {
    tokio_test::block_on(async {
        let app = ReviewApp::in_memory();
        let seed = app.pipeline.create_workflow(Uuid::new_v4(), "Reminders", None).unwrap();
        let stage = app.pipeline
                       .create_stage(seed.workflow.id, NewStage { name: "Docs".into(),
                                                                  ..Default::default() })
                       .unwrap();
        let rule = StatusActionRule { send_email: true,
                                      email_template_id: Some("missing-docs".into()),
                                      ..Default::default() };
        app.pipeline.set_status_rule(stage.id, "Missing docs", Some(rule)).unwrap();
        let draft = app.versions.open_draft(Uuid::new_v4(), Some(seed.workflow.id), None).unwrap();
        app.versions.submit(draft.id, None).unwrap();
        app.engine
           .execute_status_action(stage.id, "Missing docs", draft.id, Invocation::by("rev"))
           .unwrap();

        let notifier = InMemoryNotifier::new();
        let report = app.dispatcher(notifier).drain(100).unwrap();
        assert!(report.delivered >= 3);
        assert!(app.store.pending_effects(100).unwrap().is_empty());
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_delivers_reminder_effect() {
    let app = ReviewApp::in_memory();
    let seed = app.pipeline.create_workflow(Uuid::new_v4(), "Async", None).unwrap();
    let stage = app.pipeline
                   .create_stage(seed.workflow.id, NewStage { name: "Docs".into(),
                                                              ..Default::default() })
                   .unwrap();
    let rule = StatusActionRule { send_email: true,
                                  ..Default::default() };
    app.pipeline.set_status_rule(stage.id, "Remind", Some(rule)).unwrap();
    let draft = app.versions.open_draft(Uuid::new_v4(), Some(seed.workflow.id), None).unwrap();
    app.versions.submit(draft.id, None).unwrap();
    app.engine
       .execute_status_action(stage.id, "Remind", draft.id, Invocation::default())
       .unwrap();

    let notifier = Arc::new(InMemoryNotifier::new());
    let worker = spawn_outbox_worker(Arc::new(app.dispatcher(notifier.clone())),
                                     WorkerConfig { batch_size: 50,
                                                    period: Duration::from_millis(5) });
    for _ in 0..200 {
        if app.store.pending_effects(10).unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    worker.shutdown().await;
    let reminders = notifier.delivered()
                            .into_iter()
                            .filter(|e| matches!(e.event, NotificationEvent::ReminderEmail { .. }))
                            .count();
    assert_eq!(reminders, 1);
}
