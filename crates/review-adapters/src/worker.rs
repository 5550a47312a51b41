//! Worker asíncrono del outbox.
//!
//! `drain` es bloqueante (Diesel, reqwest blocking), así que cada ciclo corre
//! en el pool de `spawn_blocking` y el loop sólo espera el tick o la señal de
//! apagado.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use review_core::{DrainReport, Notifier, OutboxDispatcher, OutboxStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub batch_size: usize,
    pub period: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { batch_size: 100,
               period: Duration::from_secs(5) }
    }
}

/// Handle de un worker en marcha. `shutdown` espera a que termine el ciclo
/// en curso y devuelve el acumulado.
pub struct OutboxWorker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<DrainReport>,
}

impl OutboxWorker {
    pub async fn shutdown(self) -> DrainReport {
        let _ = self.shutdown_tx.send(true);
        match self.handle.await {
            Ok(total) => total,
            Err(e) => {
                error!("outbox_worker:join failed err={e}");
                DrainReport::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn accumulate(total: &mut DrainReport, step: DrainReport) {
    total.delivered += step.delivered;
    total.failed += step.failed;
    total.abandoned += step.abandoned;
}

/// Lanza el worker en el runtime actual. El primer ciclo corre enseguida.
pub fn spawn_outbox_worker<O, N>(dispatcher: Arc<OutboxDispatcher<O, N>>, config: WorkerConfig) -> OutboxWorker
    where O: OutboxStore + 'static,
          N: Notifier + 'static
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let period = config.period.max(Duration::from_millis(1));
    let batch_size = config.batch_size.max(1);
    let handle = tokio::spawn(async move {
        let mut total = DrainReport::default();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("outbox_worker:start batch_size={batch_size} period_ms={}", period.as_millis());
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let d = dispatcher.clone();
                    match tokio::task::spawn_blocking(move || d.drain(batch_size)).await {
                        Ok(Ok(report)) => {
                            if report.processed() > 0 {
                                debug!("outbox_worker:cycle delivered={} failed={} abandoned={}",
                                       report.delivered, report.failed, report.abandoned);
                            }
                            accumulate(&mut total, report);
                        }
                        Ok(Err(e)) => error!("outbox_worker:drain failed err={e}"),
                        Err(e) => error!("outbox_worker:blocking task failed err={e}"),
                    }
                }
            }
        }
        info!("outbox_worker:stop delivered={} failed={} abandoned={}",
              total.delivered, total.failed, total.abandoned);
        total
    });
    OutboxWorker { shutdown_tx, handle }
}
