use log::warn;
use review_core::{NotifyError, Notifier, PendingEffect};

/// Entrega cada efecto a todos los notificadores internos.
///
/// Se intentan todos aunque alguno falle; devuelve el primer error.
#[derive(Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn deliver(&self, effect: &PendingEffect) -> Result<(), NotifyError> {
        let mut first_error = None;
        for (idx, notifier) in self.notifiers.iter().enumerate() {
            if let Err(e) = notifier.deliver(effect) {
                warn!("fanout:notifier_failed index={idx} effect_id={} err={e}", effect.id);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_core::{InMemoryNotifier, NotificationEvent};
    use review_domain::Application;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn all_notifiers_run_even_if_one_fails() {
        let ok = Arc::new(InMemoryNotifier::new());
        let fanout = FanoutNotifier::new().with(InMemoryNotifier::failing(1)).with(ok.clone());
        let app = Application::new_draft(Uuid::new_v4(), None, None);
        let effect = PendingEffect::new(&app, NotificationEvent::NewSubmission { stage_id: None });

        assert!(fanout.deliver(&effect).is_err());
        assert_eq!(ok.delivered().len(), 1);
        assert!(fanout.deliver(&effect).is_ok());
        assert_eq!(ok.delivered().len(), 2);
    }
}
