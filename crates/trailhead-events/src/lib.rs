//! Synchronous publish/subscribe channel for the Trailhead engine.
//!
//! The [`EventChannel`] decouples the geofence evaluator from everything that
//! reacts to it: overlay renderers, audio players, the backpack visit
//! recorder. It is deliberately minimal:
//!
//! - Dispatch is synchronous. Every subscriber sees an event before
//!   [`EventChannel::emit`] returns, in registration order.
//! - There is no queueing, retry or cross-process delivery.
//! - The handler list is snapshotted before dispatch, so handlers may
//!   subscribe, unsubscribe or emit from inside a callback. A handler removed
//!   mid-dispatch still receives the event being dispatched.
//!
//! A channel is an ordinary value. Create one per engine instance; nothing
//! is global, so independent engines (and tests) never share subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::trace;
use trailhead_types::{EngineEvent, EventKind};

/// A subscriber callback.
pub type Handler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// One registered handler.
struct Registration {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

/// Shared registry behind a channel and its subscriptions.
#[derive(Default)]
struct Registry {
    next_id: u64,
    registrations: Vec<Registration>,
}

impl Registry {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.registrations.len() != before
    }
}

/// In-process event bus keyed by [`EventKind`].
///
/// Cloning a channel yields another handle to the same subscriber registry.
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Mutex<Registry>>,
}

impl EventChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    ///
    /// The returned [`Subscription`] removes the handler when dropped or
    /// when [`Subscription::unsubscribe`] is called. Use
    /// [`Subscription::detach`] to keep the handler for the channel's
    /// lifetime.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id = registry.next_id.wrapping_add(1);
        registry.registrations.push(Registration {
            id,
            kind,
            handler: Arc::new(handler),
        });
        trace!(id, ?kind, "handler subscribed");
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
            active: AtomicBool::new(true),
            detached: false,
        }
    }

    /// Publish `event` to every handler registered for its kind.
    ///
    /// Returns the number of handlers invoked. Zero subscribers is not an
    /// error.
    pub fn emit(&self, event: &EngineEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .lock()
            .registrations
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        trace!(?kind, delivered = handlers.len(), "event emitted");
        handlers.len()
    }

    /// Number of handlers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock()
            .registrations
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Number of handlers currently registered across every kind.
    pub fn total_subscribers(&self) -> usize {
        self.lock().registrations.len()
    }

    /// Remove every handler. Outstanding subscriptions become no-ops.
    pub fn clear(&self) {
        self.lock().registrations.clear();
    }

    /// A handle that does not keep the channel alive.
    ///
    /// Handlers that publish back onto their own channel hold one of these
    /// so the registry does not own a reference to itself.
    pub fn downgrade(&self) -> WeakEventChannel {
        WeakEventChannel {
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Non-owning handle to an [`EventChannel`].
#[derive(Clone, Debug)]
pub struct WeakEventChannel {
    registry: Weak<Mutex<Registry>>,
}

impl WeakEventChannel {
    /// Recover the channel if it is still alive.
    pub fn upgrade(&self) -> Option<EventChannel> {
        self.registry.upgrade().map(|registry| EventChannel { registry })
    }

    /// Emit on the channel if it is still alive. Returns handlers invoked.
    pub fn emit(&self, event: &EngineEvent) -> usize {
        self.upgrade().map_or(0, |channel| channel.emit(event))
    }
}

impl core::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.lock().registrations.len())
            .finish()
    }
}

/// Handle returned by [`EventChannel::on`].
///
/// Unsubscribing is idempotent and safe after the channel itself has been
/// dropped.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
    active: AtomicBool,
    detached: bool,
}

impl Subscription {
    /// Remove the handler from its channel.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.id);
        trace!(id = self.id, removed, "handler unsubscribed");
        removed
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
            && self.registry.upgrade().is_some_and(|registry| {
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .registrations
                    .iter()
                    .any(|r| r.id == self.id)
            })
    }

    /// Keep the handler registered for the lifetime of the channel.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.unsubscribe();
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use trailhead_types::{FeatureId, PositionSample, SettingsChange, UiAction, UiActionKind};

    use super::*;

    fn position() -> EngineEvent {
        EngineEvent::Position(PositionSample::new(44.0, -93.0, 5.0, 1_000))
    }

    #[test]
    fn dispatches_in_registration_order() {
        let channel = EventChannel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut subs = Vec::new();
        for label in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            subs.push(channel.on(EventKind::Position, move |_| {
                seen.lock().unwrap_or_else(PoisonError::into_inner).push(label);
            }));
        }

        assert_eq!(channel.emit(&position()), 3);
        let seen = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let channel = EventChannel::new();
        let hits = Arc::new(Mutex::new(0_u32));
        let counter = Arc::clone(&hits);
        let _sub = channel.on(EventKind::Settings, move |_| {
            *counter.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        });

        assert_eq!(channel.emit(&position()), 0);
        assert_eq!(
            channel.emit(&EngineEvent::Settings(SettingsChange::Debug(true))),
            1
        );
        assert_eq!(*hits.lock().unwrap_or_else(PoisonError::into_inner), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let channel = EventChannel::new();
        let sub = channel.on(EventKind::Position, |_| {});
        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        assert_eq!(channel.subscriber_count(EventKind::Position), 0);
    }

    #[test]
    fn clear_drops_handlers_of_every_kind() {
        let channel = EventChannel::new();
        let enter = channel.on(EventKind::Enter, |_| {});
        let _exit = channel.on(EventKind::Exit, |_| {});
        let _position = channel.on(EventKind::Position, |_| {});
        assert_eq!(channel.total_subscribers(), 3);
        assert!(enter.unsubscribe());
        assert_eq!(channel.total_subscribers(), 2);
        channel.clear();
        assert_eq!(channel.total_subscribers(), 0);
        assert_eq!(channel.emit(&position()), 0);
    }

    #[test]
    fn unsubscribe_after_channel_dropped_is_safe() {
        let channel = EventChannel::new();
        let sub = channel.on(EventKind::Position, |_| {});
        drop(channel);
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
    }

    #[test]
    fn dropping_subscription_unsubscribes_unless_detached() {
        let channel = EventChannel::new();
        {
            let _sub = channel.on(EventKind::Enter, |_| {});
            assert_eq!(channel.subscriber_count(EventKind::Enter), 1);
        }
        assert_eq!(channel.subscriber_count(EventKind::Enter), 0);

        channel.on(EventKind::Enter, |_| {}).detach();
        assert_eq!(channel.subscriber_count(EventKind::Enter), 1);
        channel.clear();
        assert_eq!(channel.subscriber_count(EventKind::Enter), 0);
    }

    #[test]
    fn handlers_may_emit_reentrantly() {
        let channel = EventChannel::new();
        let actions = Arc::new(Mutex::new(Vec::new()));

        let inner = channel.downgrade();
        let _relay = channel.on(EventKind::Position, move |_| {
            inner.emit(&EngineEvent::Action(UiAction {
                feature_id: FeatureId::from("f1"),
                action: UiActionKind::Show,
            }));
        });
        let sink = Arc::clone(&actions);
        let _recorder = channel.on(EventKind::Action, move |event| {
            if let EngineEvent::Action(action) = event {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(action.action);
            }
        });

        channel.emit(&position());
        let actions = actions.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(actions, vec![UiActionKind::Show]);
    }

    #[test]
    fn independent_channels_do_not_share_handlers() {
        let first = EventChannel::new();
        let second = EventChannel::new();
        let _sub = first.on(EventKind::Position, |_| {});
        assert_eq!(second.emit(&position()), 0);
        assert_eq!(first.emit(&position()), 1);
    }
}
