//! Subscriber registry driven by the master tick

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::widget::PeriodicSubscriber;

/// Identity of a subscriber: the address of its shared allocation
///
/// Two subscribers with the same name are distinct. The registry keeps the
/// `Arc` alive, so an id cannot be reused while registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

impl SubscriberId {
    pub fn of(subscriber: &Arc<dyn PeriodicSubscriber>) -> Self {
        Self(Arc::as_ptr(subscriber) as *const () as usize)
    }
}

struct Registration {
    subscriber: Arc<dyn PeriodicSubscriber>,
    interval: Duration,
    last_fired: Instant,
    in_flight: bool,
}

/// A due subscriber whose slot has been reserved
pub(crate) struct Dispatch {
    pub id: SubscriberId,
    pub subscriber: Arc<dyn PeriodicSubscriber>,
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<SubscriberId, Registration>,
}

impl Registry {
    /// Register unless already present; returns whether it was added
    pub fn insert(&mut self, subscriber: Arc<dyn PeriodicSubscriber>, interval: Duration, now: Instant) -> bool {
        let id = SubscriberId::of(&subscriber);
        if self.entries.contains_key(&id) {
            debug!(name = subscriber.name(), "Registry::insert: already registered");
            return false;
        }
        self.entries.insert(
            id,
            Registration {
                subscriber,
                interval,
                last_fired: now,
                in_flight: false,
            },
        );
        true
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn interval_of(&self, id: SubscriberId) -> Option<Duration> {
        self.entries.get(&id).map(|r| r.interval)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Select and reserve every subscriber due at `now`
    ///
    /// Returns the reserved dispatches and the number of due subscribers
    /// skipped because a previous invocation is still running.
    pub fn take_due(&mut self, now: Instant) -> (Vec<Dispatch>, usize) {
        let mut due = Vec::new();
        let mut skipped = 0;
        for (id, reg) in self.entries.iter_mut() {
            let elapsed = now.saturating_duration_since(reg.last_fired);
            if elapsed < reg.interval {
                continue;
            }
            if reg.in_flight {
                debug!(name = reg.subscriber.name(), "Registry::take_due: still in flight, skipping");
                skipped += 1;
                continue;
            }
            reg.last_fired = now;
            reg.in_flight = true;
            due.push(Dispatch {
                id: *id,
                subscriber: reg.subscriber.clone(),
            });
        }
        (due, skipped)
    }

    /// Release the in-flight reservation taken by `take_due`
    pub fn finish(&mut self, id: SubscriberId) {
        if let Some(reg) = self.entries.get_mut(&id) {
            reg.in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::WidgetError;
    use async_trait::async_trait;

    struct Named(&'static str, Duration);

    #[async_trait]
    impl PeriodicSubscriber for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn interval(&self) -> Duration {
            self.1
        }

        async fn on_tick(&self) -> Result<(), WidgetError> {
            Ok(())
        }
    }

    fn sub(name: &'static str, secs: u64) -> Arc<dyn PeriodicSubscriber> {
        Arc::new(Named(name, Duration::from_secs(secs)))
    }

    #[test]
    fn test_identity_is_by_pointer() {
        let a = sub("same", 1);
        let b = sub("same", 1);
        assert_ne!(SubscriberId::of(&a), SubscriberId::of(&b));
        assert_eq!(SubscriberId::of(&a), SubscriberId::of(&a.clone()));
    }

    #[test]
    fn test_insert_is_first_write_wins() {
        let mut registry = Registry::default();
        let a = sub("a", 1);
        let now = Instant::now();

        assert!(registry.insert(a.clone(), Duration::from_secs(5), now));
        assert!(!registry.insert(a.clone(), Duration::from_secs(60), now));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.interval_of(SubscriberId::of(&a)), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_take_due_reserves_slot() {
        let mut registry = Registry::default();
        let a = sub("a", 2);
        let t0 = Instant::now();
        registry.insert(a.clone(), Duration::from_secs(2), t0);

        let (due, _) = registry.take_due(t0 + Duration::from_secs(1));
        assert!(due.is_empty());

        let (due, skipped) = registry.take_due(t0 + Duration::from_secs(2));
        assert_eq!(due.len(), 1);
        assert_eq!(skipped, 0);

        // Still running at the next due point
        let (due, skipped) = registry.take_due(t0 + Duration::from_secs(4));
        assert!(due.is_empty());
        assert_eq!(skipped, 1);

        registry.finish(SubscriberId::of(&a));
        let (due, _) = registry.take_due(t0 + Duration::from_secs(4));
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn test_clock_going_backwards_does_not_fire() {
        let mut registry = Registry::default();
        let t0 = Instant::now() + Duration::from_secs(10);
        registry.insert(sub("a", 1), Duration::from_secs(1), t0);

        let (due, _) = registry.take_due(t0 - Duration::from_secs(5));
        assert!(due.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = Registry::default();
        let a = sub("a", 1);
        assert!(!registry.remove(SubscriberId::of(&a)));
        registry.insert(a.clone(), Duration::from_secs(1), Instant::now());
        assert!(registry.contains(SubscriberId::of(&a)));
        assert!(registry.remove(SubscriberId::of(&a)));
        assert!(!registry.contains(SubscriberId::of(&a)));
    }
}
