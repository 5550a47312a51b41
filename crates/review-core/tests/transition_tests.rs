mod common;

use common::Fixture;
use review_core::pipeline::{NewAction, NewStage};
use review_core::{ActionRef, ApplicationStore, Invocation, PipelineRepository, ReviewError, ReviewInput};
use review_domain::{ActionScope, HistoryKind, StatusActionRule};
use serde_json::json;
use uuid::Uuid;

#[test]
fn reject_moves_application_out_of_pipeline() {
    let fx = Fixture::new();
    let app = fx.submitted();
    assert_eq!(app.stage_id(), Some(fx.screening.id));

    let summary = fx.engine
                    .execute(&ActionRef::Workflow(fx.reject_action), app.id, Invocation::by("reviewer-1"))
                    .unwrap();
    assert_eq!(summary.group_id, Some(fx.rejected_group));
    assert_eq!(summary.stage_id, None);
    assert_eq!(summary.stage_group_id, None);

    let history = fx.engine.history(app.id, HistoryKind::Action).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].actor_id.as_deref(), Some("reviewer-1"));
    assert_eq!(history[0].reference, format!("workflow_action:{}", fx.reject_action));
}

#[test]
fn required_comment_blocks_mutation_and_audit() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let rule = StatusActionRule { require_comment: true,
                                  set_status: Some("interviewing".into()),
                                  ..Default::default() };
    fx.pipeline.set_status_rule(fx.screening.id, "Interview Scheduled", Some(rule)).unwrap();

    for inv in [Invocation::default(), Invocation::by("r").with_comment("   ")] {
        let err = fx.engine
                    .execute_status_action(fx.screening.id, "Interview Scheduled", app.id, inv)
                    .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }
    let after = fx.store.load(app.id).unwrap();
    assert_eq!(after.review.status, app.review.status);
    assert_eq!(after.review.current_status, None);
    assert!(fx.engine.history(app.id, HistoryKind::Action).unwrap().is_empty());

    let ok = fx.engine
               .execute_status_action(fx.screening.id,
                                      "Interview Scheduled",
                                      app.id,
                                      Invocation::by("r").with_comment("call on monday"))
               .unwrap();
    assert_eq!(ok.status, "interviewing");
    assert_eq!(ok.current_status.as_deref(), Some("Interview Scheduled"));
    let history = fx.engine.history(app.id, HistoryKind::Action).unwrap();
    assert_eq!(history[0].comment.as_deref(), Some("call on monday"));
}

#[test]
fn status_without_rule_still_records_label() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let summary = fx.engine
                    .execute_status_action(fx.screening.id, "Maybe", app.id, Invocation::default())
                    .unwrap();
    assert!(!summary.action_applied);
    assert_eq!(summary.current_status.as_deref(), Some("Maybe"));
    assert_eq!(summary.stage_id, Some(fx.screening.id));
    assert_eq!(fx.engine.history(app.id, HistoryKind::Action).unwrap().len(), 1);
}

#[test]
fn status_label_is_recorded_as_invoked() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let rule = StatusActionRule { add_tags: vec!["shortlist".into()],
                                  ..Default::default() };
    fx.pipeline.set_status_rule(fx.screening.id, "Shortlisted", Some(rule)).unwrap();

    let summary = fx.engine
                    .execute_status_action(fx.screening.id, " Shortlisted  ", app.id, Invocation::default())
                    .unwrap();
    assert!(summary.action_applied);
    assert_eq!(summary.tags, vec!["shortlist".to_string()]);
    assert_eq!(fx.store.load(app.id).unwrap().review.current_status.as_deref(), Some(" Shortlisted  "));
}

#[test]
fn moves_adopt_or_enforce_the_target_workflow() {
    let fx = Fixture::new();
    let loose = fx.versions.open_draft(Uuid::new_v4(), None, None).unwrap();
    assert_eq!(loose.workflow_id, None);
    fx.engine.move_to_stage(loose.id, fx.interview.id, Invocation::default()).unwrap();
    assert_eq!(fx.store.load(loose.id).unwrap().workflow_id, Some(fx.workflow.id));

    let grouped = fx.versions.open_draft(Uuid::new_v4(), None, None).unwrap();
    fx.engine.move_to_group(grouped.id, fx.waitlist_group, Invocation::default()).unwrap();
    assert_eq!(fx.store.load(grouped.id).unwrap().workflow_id, Some(fx.workflow.id));

    let other = fx.pipeline.create_workflow(Uuid::new_v4(), "Scholarships", None).unwrap();
    let foreign_stage = fx.pipeline
                          .create_stage(other.workflow.id, NewStage { name: "Intake".into(), ..Default::default() })
                          .unwrap();
    let app = fx.submitted();
    let err = fx.engine.move_to_stage(app.id, foreign_stage.id, Invocation::default()).unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)));
    let err = fx.engine.move_to_group(app.id, other.groups[0].id, Invocation::default()).unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)));
    assert_eq!(fx.store.load(app.id).unwrap(), app);
    assert!(fx.engine.history(app.id, HistoryKind::Move).unwrap().is_empty());
}

#[test]
fn status_rule_tags_are_idempotent() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let rule = StatusActionRule { add_tags: vec!["strong".into(), "strong".into()],
                                  remove_tags: vec!["absent".into()],
                                  move_to_stage_id: Some(fx.interview.id),
                                  ..Default::default() };
    fx.pipeline.set_status_rule(fx.screening.id, "Advance", Some(rule)).unwrap();

    let first = fx.engine
                  .execute_status_action(fx.screening.id, "Advance", app.id, Invocation::default())
                  .unwrap();
    assert_eq!(first.tags, vec!["strong".to_string()]);
    assert_eq!(first.stage_id, Some(fx.interview.id));
    let second = fx.engine
                   .execute_status_action(fx.screening.id, "Advance", app.id, Invocation::default())
                   .unwrap();
    assert_eq!(second.tags, first.tags);
    assert_eq!(fx.engine.history(app.id, HistoryKind::Action).unwrap().len(), 2);
}

#[test]
fn restore_and_stage_group_moves() {
    let fx = Fixture::new();
    let app = fx.submitted();
    fx.engine
      .move_to_stage_group(app.id, Some(fx.priority.id), Invocation::default())
      .unwrap();
    let moved = fx.engine.move_to_group(app.id, fx.waitlist_group, Invocation::default()).unwrap();
    assert_eq!((moved.stage_id, moved.stage_group_id), (None, None));
    assert_eq!(fx.engine.applications_in_group(fx.waitlist_group).unwrap().len(), 1);

    // Restaurar sólo aplica a aplicaciones en un grupo.
    let back = fx.engine.restore_from_group(app.id, fx.interview.id, Invocation::default()).unwrap();
    assert_eq!((back.stage_id, back.group_id), (Some(fx.interview.id), None));
    let again = fx.engine.restore_from_group(app.id, fx.interview.id, Invocation::default());
    assert!(matches!(again, Err(ReviewError::Validation(_))));

    // El stage group pertenece a Screening, no a Interview.
    let wrong = fx.engine.move_to_stage_group(app.id, Some(fx.priority.id), Invocation::default());
    assert!(matches!(wrong, Err(ReviewError::Validation(_))));
    assert_eq!(fx.engine.history(app.id, HistoryKind::Move).unwrap().len(), 3);
}

#[test]
fn deleting_stage_group_clears_every_reference() {
    let fx = Fixture::new();
    let apps: Vec<_> = (0..3).map(|_| fx.submitted()).collect();
    for app in &apps {
        fx.engine
          .move_to_stage_group(app.id, Some(fx.priority.id), Invocation::default())
          .unwrap();
    }
    assert_eq!(fx.pipeline.delete_stage_group(fx.priority.id).unwrap(), 3);
    for app in &apps {
        let stored = fx.store.load(app.id).unwrap();
        assert_eq!(stored.stage_group_id(), None);
        assert_eq!(stored.stage_id(), Some(fx.screening.id));
    }
}

#[test]
fn unknown_references_are_not_found() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let missing = uuid::Uuid::new_v4();
    assert!(matches!(fx.engine.execute(&ActionRef::Workflow(missing), app.id, Invocation::default()),
                     Err(ReviewError::NotFound(_))));
    assert!(matches!(fx.engine.execute(&ActionRef::Workflow(fx.reject_action), missing, Invocation::default()),
                     Err(ReviewError::NotFound(_))));
    assert!(matches!(fx.engine.move_to_stage(app.id, missing, Invocation::default()),
                     Err(ReviewError::NotFound(_))));
    assert!(matches!(ActionRef::parse("macro", missing), Err(ReviewError::Validation(_))));
}

#[test]
fn stage_action_requiring_comment() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let action = fx.pipeline
                   .create_action(ActionScope::Stage(fx.screening.id),
                                  NewAction { name: "Hold".into(),
                                              action_type: Some("move_to_group".into()),
                                              target_group_id: Some(fx.waitlist_group),
                                              requires_comment: true,
                                              ..Default::default() })
                   .unwrap();
    let r = ActionRef::parse("stage_action", action.id).unwrap();
    assert!(fx.engine.execute(&r, app.id, Invocation::default()).is_err());
    assert_eq!(fx.store.load(app.id).unwrap().stage_id(), Some(fx.screening.id));
    let ok = fx.engine.execute(&r, app.id, Invocation::by("r").with_comment("missing docs")).unwrap();
    assert_eq!(ok.group_id, Some(fx.waitlist_group));
    // Las referencias de otro scope no resuelven.
    assert!(matches!(fx.engine.execute(&ActionRef::Workflow(action.id), app.id, Invocation::default()),
                     Err(ReviewError::NotFound(_))));
}

#[test]
fn bulk_assign_skips_missing_ids() {
    let fx = Fixture::new();
    let drafts: Vec<_> = (0..4).map(|_| {
                                   fx.versions
                                     .open_draft(uuid::Uuid::new_v4(), None, None)
                                     .unwrap()
                               })
                               .collect();
    let mut ids: Vec<_> = drafts.iter().map(|a| a.id).collect();
    ids.push(uuid::Uuid::new_v4());
    let count = fx.engine
                  .bulk_assign_workflow(&ids, fx.workflow.id, fx.interview.id, Invocation::by("admin"))
                  .unwrap();
    assert_eq!(count, 4);
    for d in &drafts {
        let stored = fx.store.load(d.id).unwrap();
        assert_eq!(stored.workflow_id, Some(fx.workflow.id));
        assert_eq!(stored.stage_id(), Some(fx.interview.id));
        assert_eq!(fx.engine.history(d.id, HistoryKind::Stage).unwrap().len(), 1);
    }
}

#[test]
fn review_scores_merge_into_review_history() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let scores = json!({"essay": 4}).as_object().cloned().unwrap();
    fx.engine
      .record_review(app.id,
                     ReviewInput { scores,
                                   decision: Some("advance".into()),
                                   flagged: None },
                     Invocation::by("r1"))
      .unwrap();
    let scores = json!({"interview": 5}).as_object().cloned().unwrap();
    fx.engine
      .record_review(app.id, ReviewInput { scores, ..Default::default() }, Invocation::by("r2"))
      .unwrap();
    let stored = fx.store.load(app.id).unwrap();
    assert_eq!(stored.review.scores.len(), 2);
    assert_eq!(stored.review.decision.as_deref(), Some("advance"));
    assert_eq!(fx.engine.history(app.id, HistoryKind::Review).unwrap().len(), 2);
    assert!(fx.engine.record_review(app.id, ReviewInput::default(), Invocation::default()).is_err());
}

#[test]
fn non_empty_application_group_cannot_be_deleted() {
    let fx = Fixture::new();
    let app = fx.submitted();
    let group = fx.pipeline
                  .create_application_group(fx.workflow.id,
                                            review_core::pipeline::NewApplicationGroup { name: "Finalists".into(),
                                                                                         ..Default::default() })
                  .unwrap();
    fx.engine.move_to_group(app.id, group.id, Invocation::default()).unwrap();
    assert!(matches!(fx.pipeline.delete_application_group(group.id), Err(ReviewError::Conflict(_))));
    fx.engine.restore_from_group(app.id, fx.screening.id, Invocation::default()).unwrap();
    fx.pipeline.delete_application_group(group.id).unwrap();
    assert!(fx.store.application_group(group.id).is_err());
}
