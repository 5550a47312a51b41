//! Wiring de servicios sobre un backend de almacenamiento.
//!
//! `ReviewApp` agrupa motor, control de versiones y configuración de
//! pipeline sobre el mismo store, ya sea `InMemoryStore` o `PgReviewStore`.

use std::sync::Arc;

use review_core::{ApplicationStore, ConcurrencyController, InMemoryStore, Notifier, OutboxDispatcher, OutboxStore,
                  PipelineRepository, PipelineService, TransitionEngine};
use review_persistence::{PgPool, PgReviewStore, PoolProvider};

pub type PgStore = PgReviewStore<PoolProvider>;

pub struct ReviewApp<S>
    where S: ApplicationStore + PipelineRepository + OutboxStore + 'static
{
    pub store: Arc<S>,
    pub engine: TransitionEngine<S, S>,
    pub versions: ConcurrencyController<S, S>,
    pub pipeline: PipelineService<S>,
}

impl<S> ReviewApp<S> where S: ApplicationStore + PipelineRepository + OutboxStore + 'static
{
    pub fn new(store: Arc<S>) -> Self {
        Self { engine: TransitionEngine::new(store.clone(), store.clone()),
               versions: ConcurrencyController::new(store.clone(), store.clone()),
               pipeline: PipelineService::new(store.clone()),
               store }
    }

    /// Dispatcher del outbox de este store hacia `notifier`.
    pub fn dispatcher<N: Notifier>(&self, notifier: N) -> OutboxDispatcher<S, N> {
        OutboxDispatcher::new(self.store.clone(), notifier)
    }
}

impl ReviewApp<InMemoryStore> {
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }
}

impl ReviewApp<PgStore> {
    pub fn postgres(pool: PgPool) -> Self {
        Self::new(Arc::new(PgReviewStore::new(PoolProvider { pool })))
    }
}
