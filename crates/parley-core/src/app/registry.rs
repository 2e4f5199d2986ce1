//! SubscriberRegistry - メッセージの配信先となる購読者の集合
//!
//! # 設計
//! - 同一性は `Arc` の割り当て単位（値の等価性ではない）
//!   - 同じ `Arc` を 2 回登録しても 1 件、別インスタンスなら 2 件
//! - 配信はスナップショットに対して行うので、購読の変更が配信中の処理と競合しない
//! - ロックは `Vec` 操作の間だけ保持し、`.await` をまたがない

use std::sync::{Arc, Mutex, MutexGuard};

use crate::ports::{Category, Diagnostics, Subscriber};

pub struct SubscriberRegistry {
    entries: Mutex<Vec<Arc<dyn Subscriber>>>,
    diagnostics: Diagnostics,
}

fn same_subscriber(a: &Arc<dyn Subscriber>, b: &Arc<dyn Subscriber>) -> bool {
    // compare data pointers only; vtable pointers may differ across codegen units
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl SubscriberRegistry {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            diagnostics,
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Arc<dyn Subscriber>>> {
        // a poisoned Vec is still structurally valid
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add `subscriber` unless this exact instance is already registered.
    ///
    /// Always returns a token that removes this registration.
    pub fn register(self: &Arc<Self>, subscriber: Arc<dyn Subscriber>) -> Subscription {
        {
            let mut entries = self.entries();
            if !entries.iter().any(|s| same_subscriber(s, &subscriber)) {
                entries.push(Arc::clone(&subscriber));
                self.diagnostics
                    .debug(Category::Client, format!("added subscriber {}", subscriber.name()));
            }
        }
        Subscription {
            registry: Arc::clone(self),
            subscriber,
        }
    }

    /// Remove the subscriber behind `subscription`, if still present.
    pub fn unregister(&self, subscription: &Subscription) {
        let name = subscription.subscriber.name();
        let removed = {
            let mut entries = self.entries();
            match entries
                .iter()
                .position(|s| same_subscriber(s, &subscription.subscriber))
            {
                Some(index) => {
                    entries.swap_remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.diagnostics
                .debug(Category::Client, format!("removed subscriber {name}"));
        } else {
            self.diagnostics.debug(
                Category::Client,
                format!("subscriber {name} was not registered; nothing removed"),
            );
        }
    }

    /// Point-in-time copy of the registered subscribers.
    pub fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.entries().clone()
    }

    /// Remove every subscriber, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Token for one registration; `unsubscribe` removes it.
///
/// Releasing is explicit and idempotent: dropping the token keeps the
/// subscriber registered.
pub struct Subscription {
    registry: Arc<SubscriberRegistry>,
    subscriber: Arc<dyn Subscriber>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        self.registry.unregister(self);
    }

    pub fn subscriber(&self) -> &Arc<dyn Subscriber> {
        &self.subscriber
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber", &self.subscriber.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{RecordingSubscriber, diagnostics};

    fn registry() -> Arc<SubscriberRegistry> {
        Arc::new(SubscriberRegistry::new(diagnostics()))
    }

    #[test]
    fn same_instance_registers_once() {
        let reg = registry();
        let sub: Arc<dyn Subscriber> = Arc::new(RecordingSubscriber::new("a"));

        let _first = reg.register(Arc::clone(&sub));
        let _second = reg.register(Arc::clone(&sub));

        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn distinct_instances_register_separately() {
        let reg = registry();
        let _a = reg.register(Arc::new(RecordingSubscriber::new("same")));
        let _b = reg.register(Arc::new(RecordingSubscriber::new("same")));

        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn unsubscribe_removes_only_that_subscriber() {
        let reg = registry();
        let a = reg.register(Arc::new(RecordingSubscriber::new("a")));
        let _b = reg.register(Arc::new(RecordingSubscriber::new("b")));

        a.unsubscribe();

        let names: Vec<String> = reg.snapshot().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[test]
    fn unsubscribe_twice_is_a_noop() {
        let reg = registry();
        let a = reg.register(Arc::new(RecordingSubscriber::new("a")));
        let _b = reg.register(Arc::new(RecordingSubscriber::new("b")));

        a.unsubscribe();
        a.unsubscribe();

        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn dropping_the_token_keeps_the_subscriber() {
        let reg = registry();
        drop(reg.register(Arc::new(RecordingSubscriber::new("a"))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let reg = registry();
        let _a = reg.register(Arc::new(RecordingSubscriber::new("a")));

        let mut snapshot = reg.snapshot();
        snapshot.clear();

        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn clear_empties_the_registry() {
        let reg = registry();
        let _a = reg.register(Arc::new(RecordingSubscriber::new("a")));
        let _b = reg.register(Arc::new(RecordingSubscriber::new("b")));

        assert_eq!(reg.clear(), 2);
        assert!(reg.is_empty());
    }
}
