// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Tracks which sources currently have a live listener.
///
/// Creation hooks, startup enumeration and listener teardown all race on the
/// same ids; the lock is held only for the in-memory check-and-update.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscribed: Mutex<HashSet<String>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribed(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set is updated by single insert/remove calls, so it is never
        // left half-written by a panicking holder.
        self.subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `source_id`. Returns `false` if it is already subscribed.
    pub fn try_claim(&self, source_id: &str) -> bool {
        let mut subscribed = self.subscribed();
        if subscribed.contains(source_id) {
            return false;
        }
        subscribed.insert(source_id.to_string())
    }

    /// Releases `source_id` so a recreated source with the same id can be claimed again.
    pub fn release(&self, source_id: &str) {
        self.subscribed().remove(source_id);
    }

    #[must_use]
    pub fn is_subscribed(&self, source_id: &str) -> bool {
        self.subscribed().contains(source_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribed().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribed().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.try_claim("srv-1"));
        assert!(!registry.try_claim("srv-1"));
        assert!(registry.try_claim("srv-2"));
        assert_eq!(registry.len(), 2);

        registry.release("srv-1");
        assert!(!registry.is_subscribed("srv-1"));
        assert!(registry.try_claim("srv-1"));
    }

    #[test]
    fn test_release_unknown_id_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.release("missing");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if registry.try_claim("srv-1") {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Claim(u8),
        Release(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4).prop_map(Op::Claim),
            (0u8..4).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_live_subscription(ops in proptest::collection::vec(op(), 0..64)) {
            let registry = SubscriptionRegistry::new();
            // Number of live listeners per id, as a pipeline would count them.
            let mut live: HashMap<u8, usize> = HashMap::new();

            for op in ops {
                match op {
                    Op::Claim(id) => {
                        if registry.try_claim(&id.to_string()) {
                            *live.entry(id).or_default() += 1;
                        }
                    }
                    Op::Release(id) => {
                        // Only a live listener releases its id.
                        if live.get(&id).copied().unwrap_or_default() > 0 {
                            registry.release(&id.to_string());
                            *live.entry(id).or_default() -= 1;
                        }
                    }
                }
                for (id, count) in &live {
                    prop_assert!(*count <= 1);
                    prop_assert_eq!(registry.is_subscribed(&id.to_string()), *count == 1);
                }
            }
        }
    }
}
