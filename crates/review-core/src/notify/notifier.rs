use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::PendingEffect;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("transport: {0}")] Transport(String),
    #[error("receiver rejected delivery with status {0}")] Rejected(u16),
    #[error("notifier unavailable: {0}")] Unavailable(String),
}

/// Entrega best-effort de efectos a colaboradores externos.
pub trait Notifier: Send + Sync {
    fn deliver(&self, effect: &PendingEffect) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn deliver(&self, effect: &PendingEffect) -> Result<(), NotifyError> {
        (**self).deliver(effect)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn deliver(&self, effect: &PendingEffect) -> Result<(), NotifyError> {
        (**self).deliver(effect)
    }
}

/// Notificador que sólo escribe al log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, effect: &PendingEffect) -> Result<(), NotifyError> {
        info!("notify application_id={} event={} key={}",
              effect.application_id,
              effect.event.event_type(),
              effect.idempotency_key);
        Ok(())
    }
}

/// Notificador en memoria para tests: guarda lo entregado y puede simular
/// fallos en las primeras `n` entregas.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    delivered: Mutex<Vec<PendingEffect>>,
    failures_left: AtomicUsize,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(first_n: usize) -> Self {
        Self { delivered: Mutex::new(Vec::new()),
               failures_left: AtomicUsize::new(first_n) }
    }

    pub fn delivered(&self) -> Vec<PendingEffect> {
        self.delivered.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Notifier for InMemoryNotifier {
    fn deliver(&self, effect: &PendingEffect) -> Result<(), NotifyError> {
        let should_fail = self.failures_left
                              .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                              .is_ok();
        if should_fail {
            return Err(NotifyError::Transport("simulated failure".into()));
        }
        let mut guard = self.delivered
                            .lock()
                            .map_err(|_| NotifyError::Unavailable("mutex poisoned".into()))?;
        guard.push(effect.clone());
        Ok(())
    }
}
