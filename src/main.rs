//! Demo de ReviewFlow: siembra un workflow, recorre el ciclo de vida de una
//! aplicación y vacía el outbox con el worker asíncrono.
//!
//! Usa el backend en memoria salvo que se compile con `pg_demo` y exista
//! `DATABASE_URL`.

use std::sync::Arc;

use log::info;
use review_adapters::{spawn_outbox_worker, FanoutNotifier, WebhookNotifier};
use review_core::pipeline::NewStage;
use review_core::{ActionRef, ApplicationStore, Invocation, LogNotifier, OutboxDispatcher, OutboxStore,
                  PipelineRepository};
use review_domain::{HistoryKind, StatusActionRule};
use reviewflow_rust::{AppConfig, AppError, ReviewApp, CONFIG};
use serde_json::{json, Map};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_notifier(config: &AppConfig) -> Result<FanoutNotifier, AppError> {
    let mut fanout = FanoutNotifier::new().with(LogNotifier);
    if !config.webhooks.is_empty() {
        fanout = fanout.with(WebhookNotifier::new(config.webhooks.clone())?);
    }
    Ok(fanout)
}

fn demo_scenario<S>(app: &ReviewApp<S>, actor: &str) -> Result<(), AppError>
    where S: ApplicationStore + PipelineRepository + OutboxStore + 'static
{
    let seed = app.pipeline
                  .create_workflow(Uuid::new_v4(), "Becas 2026", Some("Demo".into()))?;
    let screening = app.pipeline.create_stage(seed.workflow.id, NewStage { name: "Screening".into(),
                                                                          ..Default::default() })?;
    let interview = app.pipeline.create_stage(seed.workflow.id, NewStage { name: "Interview".into(),
                                                                          ..Default::default() })?;
    let strong = StatusActionRule { add_tags: vec!["strong".into()],
                                    move_to_stage_id: Some(interview.id),
                                    ..Default::default() };
    app.pipeline.set_status_rule(screening.id, "Strong", Some(strong))?;

    let applicant = "applicant-demo";
    let draft = app.versions.open_draft(Uuid::new_v4(), Some(seed.workflow.id), Some(applicant))?;
    let mut answers = Map::new();
    answers.insert("full_name".into(), json!("Ada Lovelace"));
    answers.insert("essay".into(), json!("Analytical engines"));
    let receipt = app.versions
                     .autosave(draft.id, draft.version, answers, Some(applicant))?
                     .applied()
                     .ok_or_else(|| AppError::Internal("autosave en conflicto con un borrador nuevo".into()))?;
    println!("[demo] autosave version={} campos={:?}", receipt.version, receipt.changed_fields);

    let submitted = app.versions.submit(draft.id, Some(applicant))?;
    println!("[demo] submit status={} stage={:?}", submitted.review.status, submitted.stage_id());

    let moved = app.engine
                   .execute_status_action(screening.id, "Strong", draft.id, Invocation::by(actor))?;
    println!("[demo] status 'Strong' -> stage={:?} tags={:?}", moved.stage_id, moved.tags);

    let reject = ActionRef::Workflow(seed.actions[0].id);
    let rejected = app.engine
                      .execute(&reject, draft.id, Invocation::by(actor).with_comment("cupo completo"))?;
    println!("[demo] reject -> group={:?} status={}", rejected.group_id, rejected.status);

    let restored = app.engine.restore_from_group(draft.id, interview.id, Invocation::by(actor))?;
    println!("[demo] restore -> stage={:?} group={:?}", restored.stage_id, restored.group_id);

    for kind in [HistoryKind::Action, HistoryKind::Stage, HistoryKind::Move] {
        let entries = app.engine.history(draft.id, kind)?;
        let refs: Vec<&str> = entries.iter().map(|e| e.reference.as_str()).collect();
        println!("[demo] {} = {:?}", kind.as_str(), refs);
    }
    let versions = app.versions.versions(draft.id)?;
    println!("[demo] snapshots={} (última v{})",
             versions.len(),
             versions.first().map(|v| v.version).unwrap_or_default());
    Ok(())
}

fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError::Internal(format!("tarea bloqueante: {e}"))
}

async fn run<S>(app: ReviewApp<S>, config: AppConfig) -> Result<(), AppError>
    where S: ApplicationStore + PipelineRepository + OutboxStore + 'static
{
    let app = Arc::new(app);
    // reqwest blocking no puede construirse ni soltarse dentro del runtime
    let notifier_cfg = config.clone();
    let notifier = tokio::task::spawn_blocking(move || build_notifier(&notifier_cfg)).await
                                                                                      .map_err(join_error)??;
    let dispatcher: Arc<OutboxDispatcher<S, FanoutNotifier>> = Arc::new(app.dispatcher(notifier));
    let worker = spawn_outbox_worker(dispatcher.clone(), config.outbox.into());

    let scenario_app = app.clone();
    let actor = config.default_actor.clone();
    tokio::task::spawn_blocking(move || demo_scenario(&scenario_app, &actor)).await
                                                                             .map_err(join_error)??;

    let background = worker.shutdown().await;
    let batch = config.outbox.batch_size;
    let flushed = tokio::task::spawn_blocking(move || -> Result<usize, AppError> {
                      let mut delivered = 0;
                      loop {
                          let report = dispatcher.drain(batch)?;
                          delivered += report.delivered;
                          if report.processed() == 0 || report.delivered == 0 {
                              return Ok(delivered);
                          }
                      }
                  }).await
                    .map_err(join_error)??;
    info!("outbox delivered_by_worker={} flushed_on_shutdown={flushed}", background.delivered);
    println!("[demo] outbox: worker={} flush={}", background.delivered, flushed);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_tracing();
    let config = CONFIG.as_ref()
                       .map_err(|e| AppError::Config(e.to_string()))?
                       .clone();

    #[cfg(feature = "pg_demo")]
    if let Some(db) = &config.database {
        let pool = review_persistence::build_pool(&db.url, db.min_connections, db.max_connections)?;
        info!("demo backend=postgres");
        return run(ReviewApp::postgres(pool), config).await;
    }
    if config.database.is_some() && cfg!(not(feature = "pg_demo")) {
        info!("DATABASE_URL presente; compilar con --features pg_demo para usar Postgres");
    }
    info!("demo backend=memory");
    run(ReviewApp::in_memory(), config).await
}
