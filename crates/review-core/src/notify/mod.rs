//! Efectos secundarios (webhooks, recordatorios) vía outbox.
//!
//! El motor nunca llama a la red: encola `PendingEffect`s en la misma unidad
//! atómica que la mutación principal y un `OutboxDispatcher` los entrega
//! después. Los fallos de entrega se registran en el log y en el propio
//! registro del outbox, jamás vuelven al llamador del motor.

pub mod dispatcher;
pub mod event;
pub mod notifier;

pub use dispatcher::{DrainReport, OutboxDispatcher};
pub use event::{EffectState, NotificationEvent, PendingEffect};
pub use notifier::{InMemoryNotifier, LogNotifier, Notifier, NotifyError};
