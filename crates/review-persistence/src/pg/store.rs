use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use log::{debug, warn};
use review_core::notify::{EffectState, PendingEffect};
use review_core::store::{ApplicationStore, Commit, OutboxStore, PipelineRepository, PlacementFilter, WorkflowSeed};
use review_core::{ReviewError, StoreError};
use review_domain::{ActionDefinition, ActionScope, Application, ApplicationGroup, AuditEntry, HistoryKind, Stage,
                    StageGroup, SubmissionVersion, Workflow};
use uuid::Uuid;

use super::rows::{ActionRow, ApplicationGroupRow, ApplicationRow, AuditRow, NewAuditRow, OutboxRow, StageGroupRow,
                  StageRow, VersionRow, WorkflowRow};
use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{application_groups, applications, audit_log, outbox, review_actions, stage_groups, stages,
                    submission_versions, workflows};

/// Error interno de una transacción: Diesel, conversión de filas o el
/// rechazo del closure del core (que también provoca rollback).
#[derive(Debug)]
enum TxError {
    Db(DieselError),
    Row(PersistenceError),
    Store(StoreError),
    Review(ReviewError),
}

impl From<DieselError> for TxError {
    fn from(e: DieselError) -> Self {
        TxError::Db(e)
    }
}

impl From<PersistenceError> for TxError {
    fn from(e: PersistenceError) -> Self {
        TxError::Row(e)
    }
}

impl From<TxError> for ReviewError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Db(e) => StoreError::from(PersistenceError::from(e)).into(),
            TxError::Row(e) => StoreError::from(e).into(),
            TxError::Store(e) => e.into(),
            TxError::Review(e) => e,
        }
    }
}

impl From<TxError> for StoreError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Db(e) => PersistenceError::from(e).into(),
            TxError::Row(e) => e.into(),
            TxError::Store(e) => e,
            TxError::Review(e) => StoreError::Backend(e.to_string()),
        }
    }
}

fn not_found(what: &str, id: Uuid) -> StoreError {
    StoreError::NotFound(format!("{what} {id}"))
}

/// Implementación Postgres de los tres traits de almacenamiento.
pub struct PgReviewStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgReviewStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Lectura con reintento; `f` recibe una conexión nueva en cada intento.
    fn read<T, F>(&self, mut f: F) -> Result<T, StoreError>
        where F: FnMut(&mut PgConnection) -> Result<T, PersistenceError>
    {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            f(&mut conn)
        }).map_err(StoreError::from)
    }

    /// Escritura en una transacción read-write (sin reintento).
    fn write_tx<T, F>(&self, f: F) -> Result<T, TxError>
        where F: FnOnce(&mut PgConnection) -> Result<T, TxError>
    {
        let mut conn = self.provider.connection()?;
        conn.build_transaction().read_write().run(f)
    }

    fn application_exists(conn: &mut PgConnection, id: Uuid) -> Result<bool, PersistenceError> {
        Ok(diesel::select(diesel::dsl::exists(applications::table.find(id))).get_result(conn)?)
    }
}

/// Persiste el resultado de un `modify` dentro de la transacción abierta.
fn write_commit(tx: &mut PgConnection, app: &Application, loaded_version: i64, commit: Commit, now: DateTime<Utc>)
                -> Result<(), TxError> {
    let row = ApplicationRow::try_from(app)?;
    let updated = diesel::update(applications::table.filter(applications::id.eq(app.id))
                                                    .filter(applications::version.eq(loaded_version)))
        .set(&row)
        .execute(tx)?;
    if updated != 1 {
        return Err(TxError::Store(StoreError::StaleVersion { expected: loaded_version,
                                                             stored: app.version }));
    }
    if let Some(entry) = &commit.audit {
        diesel::insert_into(audit_log::table).values(NewAuditRow::new(app.id, entry, now)?)
                                             .execute(tx)?;
    }
    if let Some(snapshot) = &commit.snapshot {
        diesel::insert_into(submission_versions::table).values(VersionRow::try_from(snapshot)?)
                                                       .execute(tx)?;
    }
    if !commit.effects.is_empty() {
        let rows = commit.effects
                         .iter()
                         .map(OutboxRow::try_from)
                         .collect::<Result<Vec<_>, _>>()?;
        diesel::insert_into(outbox::table).values(&rows).execute(tx)?;
    }
    Ok(())
}

impl<P: ConnectionProvider> ApplicationStore for PgReviewStore<P> {
    fn insert(&self, application: &Application) -> Result<(), StoreError> {
        let row = ApplicationRow::try_from(application)?;
        let mut conn = self.provider.connection()?;
        diesel::insert_into(applications::table).values(&row)
                                                .execute(&mut conn)
                                                .map_err(PersistenceError::from)?;
        debug!("insert application_id={}", application.id);
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<Application, StoreError> {
        let row = self.read(|conn| {
                          Ok(applications::table.find(id)
                                                .select(ApplicationRow::as_select())
                                                .first(conn)
                                                .optional()?)
                      })?;
        let row = row.ok_or_else(|| not_found("application", id))?;
        Ok(Application::try_from(row)?)
    }

    fn modify<T, F>(&self, id: Uuid, f: F) -> Result<T, ReviewError>
        where F: FnOnce(&mut Application) -> Result<(T, Commit), ReviewError>
    {
        let outcome = self.write_tx(|tx| {
                              let row: Option<ApplicationRow> = applications::table.find(id)
                                                                                   .select(ApplicationRow::as_select())
                                                                                   .for_update()
                                                                                   .first(tx)
                                                                                   .optional()?;
                              let row = row.ok_or_else(|| TxError::Review(ReviewError::not_found("application", id)))?;
                              let loaded_version = row.version;
                              let mut app = Application::try_from(row)?;
                              let now = Utc::now();
                              app.updated_at = now;
                              let (value, commit) = f(&mut app).map_err(TxError::Review)?;
                              if commit.is_write() {
                                  write_commit(tx, &app, loaded_version, commit, now)?;
                              }
                              Ok(value)
                          });
        outcome.map_err(|e| {
                   if !matches!(e, TxError::Review(_)) {
                       warn!("modify:rollback application_id={id} err={e:?}");
                   }
                   ReviewError::from(e)
               })
    }

    fn history(&self, id: Uuid, kind: HistoryKind) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = self.read(|conn| {
                           if !Self::application_exists(conn, id)? {
                               return Err(PersistenceError::NotFound);
                           }
                           Ok(audit_log::table.filter(audit_log::application_id.eq(id))
                                              .filter(audit_log::history.eq(kind.as_str()))
                                              .order(audit_log::seq.asc())
                                              .select(AuditRow::as_select())
                                              .load(conn)?)
                       })
                       .map_err(|e| match e {
                           StoreError::NotFound(_) => not_found("application", id),
                           other => other,
                       })?;
        Ok(rows.into_iter()
               .map(AuditEntry::try_from)
               .collect::<Result<Vec<_>, _>>()?)
    }

    fn versions(&self, id: Uuid, limit: usize) -> Result<Vec<SubmissionVersion>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.read(|conn| {
                           if !Self::application_exists(conn, id)? {
                               return Err(PersistenceError::NotFound);
                           }
                           Ok(submission_versions::table.filter(submission_versions::application_id.eq(id))
                                                        .order(submission_versions::version.desc())
                                                        .limit(limit)
                                                        .select(VersionRow::as_select())
                                                        .load(conn)?)
                       })
                       .map_err(|e| match e {
                           StoreError::NotFound(_) => not_found("application", id),
                           other => other,
                       })?;
        Ok(rows.into_iter()
               .map(SubmissionVersion::try_from)
               .collect::<Result<Vec<_>, _>>()?)
    }

    fn version(&self, id: Uuid, version: i64) -> Result<SubmissionVersion, StoreError> {
        let row = self.read(|conn| {
                          Ok(submission_versions::table.filter(submission_versions::application_id.eq(id))
                                                       .filter(submission_versions::version.eq(version))
                                                       .select(VersionRow::as_select())
                                                       .first(conn)
                                                       .optional()?)
                      })?;
        let row = row.ok_or_else(|| StoreError::NotFound(format!("version {version} of application {id}")))?;
        Ok(SubmissionVersion::try_from(row)?)
    }

    fn list_by_placement(&self, filter: PlacementFilter) -> Result<Vec<Application>, StoreError> {
        let rows = self.read(|conn| {
                           let query = applications::table.select(ApplicationRow::as_select())
                                                          .order(applications::created_at.asc())
                                                          .into_boxed();
                           let query = match filter {
                               PlacementFilter::Stage(id) => query.filter(applications::stage_id.eq(id)),
                               PlacementFilter::StageGroup(id) => query.filter(applications::stage_group_id.eq(id)),
                               PlacementFilter::Group(id) => query.filter(applications::group_id.eq(id)),
                           };
                           Ok(query.load(conn)?)
                       })?;
        Ok(rows.into_iter()
               .map(Application::try_from)
               .collect::<Result<Vec<_>, _>>()?)
    }

    fn find_by_applicant(&self, form_id: Uuid, applicant_id: &str) -> Result<Option<Application>, StoreError> {
        let row = self.read(|conn| {
                          Ok(applications::table.filter(applications::form_id.eq(form_id))
                                                .filter(applications::applicant_id.eq(applicant_id))
                                                .order(applications::created_at.asc())
                                                .select(ApplicationRow::as_select())
                                                .first(conn)
                                                .optional()?)
                      })?;
        Ok(row.map(Application::try_from).transpose()?)
    }
}

impl<P: ConnectionProvider> PipelineRepository for PgReviewStore<P> {
    fn seed_workflow(&self, seed: &WorkflowSeed) -> Result<(), StoreError> {
        let groups: Vec<ApplicationGroupRow> = seed.groups.iter().map(ApplicationGroupRow::from).collect();
        let actions: Vec<ActionRow> = seed.actions.iter().map(ActionRow::from).collect();
        self.write_tx(|tx| {
                diesel::insert_into(workflows::table).values(WorkflowRow::from(&seed.workflow))
                                                     .execute(tx)?;
                diesel::insert_into(application_groups::table).values(&groups).execute(tx)?;
                diesel::insert_into(review_actions::table).values(&actions).execute(tx)?;
                Ok(())
            })?;
        debug!("seed_workflow workflow_id={} groups={} actions={}",
               seed.workflow.id,
               groups.len(),
               actions.len());
        Ok(())
    }

    fn workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = self.read(|conn| {
                          Ok(workflows::table.find(id)
                                             .select(WorkflowRow::as_select())
                                             .first(conn)
                                             .optional()?)
                      })?;
        row.map(Workflow::from).ok_or_else(|| not_found("workflow", id))
    }

    fn insert_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        let row = StageRow::try_from(stage)?;
        let mut conn = self.provider.connection()?;
        diesel::insert_into(stages::table).values(&row)
                                          .execute(&mut conn)
                                          .map_err(PersistenceError::from)?;
        Ok(())
    }

    fn update_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        let row = StageRow::try_from(stage)?;
        let mut conn = self.provider.connection()?;
        let n = diesel::update(stages::table.find(stage.id)).set(&row)
                                                           .execute(&mut conn)
                                                           .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("stage", stage.id));
        }
        Ok(())
    }

    fn stage(&self, id: Uuid) -> Result<Stage, StoreError> {
        let row = self.read(|conn| {
                          Ok(stages::table.find(id)
                                          .select(StageRow::as_select())
                                          .first(conn)
                                          .optional()?)
                      })?;
        let row = row.ok_or_else(|| not_found("stage", id))?;
        Ok(row.into_stage()?)
    }

    fn stages(&self, workflow_id: Uuid) -> Result<Vec<Stage>, StoreError> {
        let rows = self.read(|conn| {
                           Ok(stages::table.filter(stages::workflow_id.eq(workflow_id))
                                           .order((stages::order_index.asc(), stages::created_at.asc()))
                                           .select(StageRow::as_select())
                                           .load(conn)?)
                       })?;
        Ok(rows.into_iter()
               .map(StageRow::into_stage)
               .collect::<Result<Vec<_>, _>>()?)
    }

    fn insert_stage_group(&self, group: &StageGroup) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        diesel::insert_into(stage_groups::table).values(StageGroupRow::from(group))
                                                .execute(&mut conn)
                                                .map_err(PersistenceError::from)?;
        Ok(())
    }

    fn update_stage_group(&self, group: &StageGroup) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        let n = diesel::update(stage_groups::table.find(group.id)).set(StageGroupRow::from(group))
                                                                 .execute(&mut conn)
                                                                 .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("stage group", group.id));
        }
        Ok(())
    }

    fn stage_group(&self, id: Uuid) -> Result<StageGroup, StoreError> {
        let row = self.read(|conn| {
                          Ok(stage_groups::table.find(id)
                                                .select(StageGroupRow::as_select())
                                                .first(conn)
                                                .optional()?)
                      })?;
        row.map(StageGroup::from).ok_or_else(|| not_found("stage group", id))
    }

    fn stage_groups(&self, stage_id: Uuid) -> Result<Vec<StageGroup>, StoreError> {
        let rows = self.read(|conn| {
                           Ok(stage_groups::table.filter(stage_groups::stage_id.eq(stage_id))
                                                 .order((stage_groups::order_index.asc(),
                                                         stage_groups::created_at.asc()))
                                                 .select(StageGroupRow::as_select())
                                                 .load(conn)?)
                       })?;
        Ok(rows.into_iter().map(StageGroup::from).collect())
    }

    fn delete_stage_group(&self, id: Uuid) -> Result<usize, StoreError> {
        let cleared = self.write_tx(|tx| {
                              let now = Utc::now();
                              let cleared =
                                  diesel::update(applications::table.filter(applications::stage_group_id.eq(id)))
                                      .set((applications::stage_group_id.eq(None::<Uuid>),
                                            applications::updated_at.eq(now)))
                                      .execute(tx)?;
                              let deleted = diesel::delete(stage_groups::table.find(id)).execute(tx)?;
                              if deleted == 0 {
                                  return Err(TxError::Store(not_found("stage group", id)));
                              }
                              Ok(cleared)
                          })?;
        debug!("delete_stage_group id={id} cleared={cleared}");
        Ok(cleared)
    }

    fn insert_application_group(&self, group: &ApplicationGroup) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        diesel::insert_into(application_groups::table).values(ApplicationGroupRow::from(group))
                                                      .execute(&mut conn)
                                                      .map_err(PersistenceError::from)?;
        Ok(())
    }

    fn update_application_group(&self, group: &ApplicationGroup) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        let n = diesel::update(application_groups::table.find(group.id)).set(ApplicationGroupRow::from(group))
                                                                       .execute(&mut conn)
                                                                       .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("application group", group.id));
        }
        Ok(())
    }

    fn application_group(&self, id: Uuid) -> Result<ApplicationGroup, StoreError> {
        let row = self.read(|conn| {
                          Ok(application_groups::table.find(id)
                                                      .select(ApplicationGroupRow::as_select())
                                                      .first(conn)
                                                      .optional()?)
                      })?;
        row.map(ApplicationGroup::from)
           .ok_or_else(|| not_found("application group", id))
    }

    fn application_groups(&self, workflow_id: Uuid) -> Result<Vec<ApplicationGroup>, StoreError> {
        let rows = self.read(|conn| {
                           Ok(application_groups::table.filter(application_groups::workflow_id.eq(workflow_id))
                                                       .order((application_groups::order_index.asc(),
                                                               application_groups::created_at.asc()))
                                                       .select(ApplicationGroupRow::as_select())
                                                       .load(conn)?)
                       })?;
        Ok(rows.into_iter().map(ApplicationGroup::from).collect())
    }

    // Las FK RESTRICT de applications.group_id y review_actions.target_group_id
    // convierten un grupo referenciado en `InUse`.
    fn delete_application_group(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        let n = diesel::delete(application_groups::table.find(id)).execute(&mut conn)
                                                                  .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("application group", id));
        }
        Ok(())
    }

    fn insert_action(&self, action: &ActionDefinition) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        diesel::insert_into(review_actions::table).values(ActionRow::from(action))
                                                  .execute(&mut conn)
                                                  .map_err(PersistenceError::from)?;
        Ok(())
    }

    fn update_action(&self, action: &ActionDefinition) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        let n = diesel::update(review_actions::table.find(action.id)).set(ActionRow::from(action))
                                                                    .execute(&mut conn)
                                                                    .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("action", action.id));
        }
        Ok(())
    }

    fn action(&self, id: Uuid) -> Result<ActionDefinition, StoreError> {
        let row = self.read(|conn| {
                          Ok(review_actions::table.find(id)
                                                  .select(ActionRow::as_select())
                                                  .first(conn)
                                                  .optional()?)
                      })?;
        let row = row.ok_or_else(|| not_found("action", id))?;
        Ok(ActionDefinition::try_from(row)?)
    }

    fn actions(&self, scope: ActionScope) -> Result<Vec<ActionDefinition>, StoreError> {
        let rows = self.read(|conn| {
                           Ok(review_actions::table.filter(review_actions::scope_kind.eq(scope.kind_str()))
                                                   .filter(review_actions::scope_id.eq(scope.owner_id()))
                                                   .order((review_actions::order_index.asc(),
                                                           review_actions::created_at.asc()))
                                                   .select(ActionRow::as_select())
                                                   .load(conn)?)
                       })?;
        Ok(rows.into_iter()
               .map(ActionDefinition::try_from)
               .collect::<Result<Vec<_>, _>>()?)
    }

    fn delete_action(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        let n = diesel::delete(review_actions::table.find(id)).execute(&mut conn)
                                                              .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("action", id));
        }
        Ok(())
    }
}

impl<P: ConnectionProvider> OutboxStore for PgReviewStore<P> {
    fn pending_effects(&self, limit: usize) -> Result<Vec<PendingEffect>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.read(|conn| {
                           Ok(outbox::table.filter(outbox::state.eq(EffectState::Pending.as_str()))
                                           .order(outbox::created_at.asc())
                                           .limit(limit)
                                           .select(OutboxRow::as_select())
                                           .load(conn)?)
                       })?;
        Ok(rows.into_iter()
               .map(PendingEffect::try_from)
               .collect::<Result<Vec<_>, _>>()?)
    }

    fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.provider.connection()?;
        let n = diesel::update(outbox::table.find(id)).set(outbox::state.eq(EffectState::Delivered.as_str()))
                                                     .execute(&mut conn)
                                                     .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("effect", id));
        }
        Ok(())
    }

    fn record_failure(&self, id: Uuid, error: &str, abandon: bool) -> Result<(), StoreError> {
        let state = if abandon { EffectState::Abandoned } else { EffectState::Pending };
        let mut conn = self.provider.connection()?;
        let n = diesel::update(outbox::table.find(id)).set((outbox::attempts.eq(outbox::attempts + 1),
                                                            outbox::last_error.eq(Some(error)),
                                                            outbox::state.eq(state.as_str())))
                                                     .execute(&mut conn)
                                                     .map_err(PersistenceError::from)?;
        if n == 0 {
            return Err(not_found("effect", id));
        }
        Ok(())
    }
}
