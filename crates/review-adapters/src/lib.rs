//! review-adapters: colaboradores externos del motor de revisión.
//!
//! Este crate provee:
//! - `WebhookNotifier`: entrega efectos del outbox por HTTP a los endpoints
//!   configurados cuyo `trigger_type` coincide con el evento.
//! - `FanoutNotifier`: combina varios `Notifier`.
//! - `spawn_outbox_worker`: tarea tokio que vacía el outbox periódicamente.
//!
//! Nota: el core nunca llama a la red; todo lo de aquí corre fuera de la
//! transacción que encoló el efecto.

pub mod fanout;
pub mod webhook;
pub mod worker;

pub use fanout::FanoutNotifier;
pub use webhook::{WebhookEndpoint, WebhookNotifier, WebhookPayload};
pub use worker::{spawn_outbox_worker, OutboxWorker, WorkerConfig};
