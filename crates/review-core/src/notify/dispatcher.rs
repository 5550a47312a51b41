use std::sync::Arc;

use log::{debug, error, warn};
use serde::Serialize;

use super::Notifier;
use crate::constants::OUTBOX_MAX_ATTEMPTS;
use crate::errors::ReviewError;
use crate::store::OutboxStore;

/// Resultado de un `drain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl DrainReport {
    pub fn processed(&self) -> usize {
        self.delivered + self.failed + self.abandoned
    }
}

/// Entrega los efectos pendientes del outbox a un `Notifier`.
///
/// Un efecto que falla `max_attempts` veces pasa a `abandoned` y no se
/// vuelve a intentar.
pub struct OutboxDispatcher<O, N>
    where O: OutboxStore,
          N: Notifier
{
    outbox: Arc<O>,
    notifier: N,
    max_attempts: i32,
}

impl<O, N> OutboxDispatcher<O, N>
    where O: OutboxStore,
          N: Notifier
{
    pub fn new(outbox: Arc<O>, notifier: N) -> Self {
        Self { outbox,
               notifier,
               max_attempts: OUTBOX_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Procesa como máximo `limit` efectos. Sólo falla si el outbox no se
    /// puede leer; los errores de entrega quedan en el reporte.
    pub fn drain(&self, limit: usize) -> Result<DrainReport, ReviewError> {
        let pending = self.outbox.pending_effects(limit)?;
        let mut report = DrainReport::default();
        if pending.is_empty() {
            return Ok(report);
        }
        debug!("outbox:drain:start pending={}", pending.len());
        for effect in &pending {
            match self.notifier.deliver(effect) {
                Ok(()) => {
                    if let Err(e) = self.outbox.mark_delivered(effect.id) {
                        error!("outbox:mark_delivered failed effect_id={} err={e}", effect.id);
                    }
                    report.delivered += 1;
                }
                Err(e) => {
                    let abandon = effect.attempts + 1 >= self.max_attempts;
                    warn!("outbox:deliver failed effect_id={} event={} attempt={} abandon={abandon} err={e}",
                          effect.id,
                          effect.event.event_type(),
                          effect.attempts + 1);
                    if let Err(store_err) = self.outbox.record_failure(effect.id, &e.to_string(), abandon) {
                        error!("outbox:record_failure failed effect_id={} err={store_err}", effect.id);
                    }
                    if abandon {
                        report.abandoned += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }
        debug!("outbox:drain:done delivered={} failed={} abandoned={}",
               report.delivered, report.failed, report.abandoned);
        Ok(report)
    }
}
