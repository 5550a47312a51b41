
use review_core::{ActionRef, ApplicationStore, Invocation, OutboxStore, PipelineRepository, PlacementFilter,
                  ReviewError, StoreError, WriteOutcome};
use review_domain::{HistoryKind, StatusActionRule};
use serde_json::{json, Map, Value};
use test_support::PgFixture;
use uuid::Uuid;

fn change(key: &str, value: Value) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(key.to_string(), value);
    m
}

#[test]
fn reject_persists_placement_and_history() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let app = fx.submitted();
    assert_eq!(app.stage_id(), Some(fx.screening.id));

    let summary = fx.engine
                    .execute(&ActionRef::Workflow(fx.reject_action), app.id, Invocation::by("reviewer-pg"))
                    .expect("reject");
    assert_eq!(summary.group_id, Some(fx.rejected_group));

    let stored = fx.store.load(app.id).expect("load");
    assert_eq!(stored.group_id(), Some(fx.rejected_group));
    assert_eq!(stored.stage_id(), None);
    let history = fx.store.history(app.id, HistoryKind::Action).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].actor_id.as_deref(), Some("reviewer-pg"));
    let in_group = fx.store.list_by_placement(PlacementFilter::Group(fx.rejected_group)).expect("list");
    assert!(in_group.iter().any(|a| a.id == app.id));
}

#[test]
fn rejected_closure_rolls_back_everything() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let app = fx.submitted();
    let rule = StatusActionRule { require_comment: true,
                                  set_status: Some("interviewing".into()),
                                  ..Default::default() };
    fx.pipeline.set_status_rule(fx.screening.id, "Call", Some(rule)).expect("rule");
    let err = fx.engine
                .execute_status_action(fx.screening.id, "Call", app.id, Invocation::default())
                .unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)));
    let after = fx.store.load(app.id).expect("load");
    assert_eq!(after.version, app.version);
    assert!(fx.store.history(app.id, HistoryKind::Action).expect("history").is_empty());
}

#[test]
fn autosave_conflict_returns_server_state() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let draft = fx.versions.open_draft(Uuid::new_v4(), None, None).expect("draft");
    let first = fx.versions
                  .autosave(draft.id, 1, change("name", json!("Ada")), None)
                  .expect("autosave")
                  .applied()
                  .expect("applied");
    assert_eq!(first.version, 2);

    match fx.versions.autosave(draft.id, 1, change("name", json!("Grace")), None).expect("autosave") {
        WriteOutcome::Conflict(c) => {
            assert_eq!(c.server_version, 2);
            assert_eq!(c.server_data.get("name"), Some(&json!("Ada")));
        }
        WriteOutcome::Applied(_) => panic!("stale autosave was applied"),
    }
    let versions = fx.store.versions(draft.id, 50).expect("versions");
    assert_eq!(versions.len(), 1);
    assert!(versions[0].verify());
}

#[test]
fn deleting_stage_group_clears_members() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let app = fx.submitted();
    fx.engine
      .move_to_stage_group(app.id, Some(fx.priority.id), Invocation::by("r"))
      .expect("move");
    let cleared = fx.pipeline.delete_stage_group(fx.priority.id).expect("delete");
    assert_eq!(cleared, 1);
    let after = fx.store.load(app.id).expect("load");
    assert_eq!(after.stage_id(), Some(fx.screening.id));
    assert_eq!(after.review.placement.stage_group_id(), None);
    assert!(matches!(fx.store.stage_group(fx.priority.id), Err(StoreError::NotFound(_))));
}

#[test]
fn occupied_application_group_cannot_be_deleted() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let app = fx.submitted();
    let group = fx.pipeline
                  .create_application_group(fx.workflow.id,
                                            review_core::pipeline::NewApplicationGroup { name: "On hold".into(),
                                                                                          ..Default::default() })
                  .expect("group");
    fx.engine.move_to_group(app.id, group.id, Invocation::by("r")).expect("move");
    assert!(matches!(fx.store.delete_application_group(group.id), Err(StoreError::InUse(_))));
}

#[test]
fn submit_enqueues_outbox_effects() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let app = fx.submitted();
    let pending = fx.store.pending_effects(1000).expect("pending");
    let mine: Vec<_> = pending.iter().filter(|e| e.application_id == app.id).collect();
    assert!(mine.len() >= 2);

    let effect = mine[0];
    fx.store.record_failure(effect.id, "connection refused", false).expect("failure");
    fx.store.mark_delivered(mine[1].id).expect("delivered");
    let again = fx.store.pending_effects(1000).expect("pending");
    let retried = again.iter().find(|e| e.id == effect.id).expect("still pending");
    assert_eq!(retried.attempts, 1);
    assert!(again.iter().all(|e| e.id != mine[1].id));
}

#[test]
fn missing_records_map_to_not_found() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let ghost = Uuid::new_v4();
    assert!(matches!(fx.store.load(ghost), Err(StoreError::NotFound(_))));
    assert!(matches!(fx.store.history(ghost, HistoryKind::Stage), Err(StoreError::NotFound(_))));
    assert!(matches!(fx.store.workflow(ghost), Err(StoreError::NotFound(_))));
    let err = fx.engine.move_to_stage(ghost, fx.screening.id, Invocation::default()).unwrap_err();
    assert!(matches!(err, ReviewError::NotFound(_)));
}

#[test]
fn open_draft_finds_the_applicants_row() {
    let Some(fx) = PgFixture::new() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let form_id = Uuid::new_v4();
    let first = fx.versions
                  .open_draft(form_id, Some(fx.workflow.id), Some("applicant-pg-draft"))
                  .expect("draft");
    let again = fx.versions
                  .open_draft(form_id, Some(fx.workflow.id), Some("applicant-pg-draft"))
                  .expect("again");
    assert_eq!(again.id, first.id);
    assert!(fx.store.find_by_applicant(form_id, "someone-else").expect("lookup").is_none());

    match fx.versions.autosave(first.id, 7, Map::new(), None).expect("autosave") {
        WriteOutcome::Conflict(c) => assert_eq!(c.server_version, 1),
        WriteOutcome::Applied(_) => panic!("stale autosave must conflict"),
    }
}
