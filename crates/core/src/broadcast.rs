//! Topic-based publish/subscribe hub.
//!
//! Delivery is synchronous and in subscription order. A subscriber that
//! returns an error or panics is logged and skipped; the rest still receive
//! the message. Nothing is buffered: a publish with no subscribers is dropped.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use thiserror::Error;
use uuid::Uuid;

pub type Callback<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("subscriber {id} on '{topic}' failed: {detail}")]
    Failed {
        id: Uuid,
        topic: String,
        detail: String,
    },

    #[error("subscriber {id} on '{topic}' panicked: {detail}")]
    Panicked {
        id: Uuid,
        topic: String,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: Uuid,
    topics: Vec<String>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

struct Subscriber<T> {
    id: Uuid,
    callback: Callback<T>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

pub struct Broadcaster<T> {
    topics: Mutex<HashMap<String, Vec<Subscriber<T>>>>,
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> std::fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = topics.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("Broadcaster").field("topics", &counts).finish()
    }
}

impl<T> Broadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_all([topic], callback)
    }

    /// Registers one callback for several topics under a single handle.
    pub fn subscribe_all<I, S, F>(&self, topics: I, callback: F) -> SubscriptionHandle
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let id = Uuid::new_v4();
        let mut names: Vec<String> = Vec::new();
        for topic in topics {
            let topic = topic.as_ref().to_string();
            if !names.contains(&topic) {
                names.push(topic);
            }
        }

        let mut map = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        for topic in &names {
            map.entry(topic.clone()).or_default().push(Subscriber {
                id,
                callback: Arc::clone(&callback),
            });
        }
        tracing::debug!(subscription = %id, topics = ?names, "subscribed");

        SubscriptionHandle { id, topics: names }
    }

    /// Returns `false` if the handle was already removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut removed = false;
        let mut map = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        for topic in &handle.topics {
            if let Some(subs) = map.get_mut(topic) {
                let before = subs.len();
                subs.retain(|s| s.id != handle.id);
                removed |= subs.len() != before;
                if subs.is_empty() {
                    map.remove(topic);
                }
            }
        }
        removed
    }

    /// Delivers `message` to every subscriber of `topic`; returns how many
    /// callbacks completed without error.
    pub fn publish(&self, topic: &str, message: &T) -> usize {
        // Snapshot the list so callbacks may (un)subscribe without deadlocking.
        let subscribers: Vec<Subscriber<T>> = {
            let map = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
            match map.get(topic) {
                Some(subs) => subs.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for sub in &subscribers {
            match catch_unwind(AssertUnwindSafe(|| (sub.callback)(message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    let err = SubscriberError::Failed {
                        id: sub.id,
                        topic: topic.to_string(),
                        detail: format!("{err:#}"),
                    };
                    tracing::error!(error = %err, "subscriber callback failed");
                }
                Err(panic) => {
                    let err = SubscriberError::Panicked {
                        id: sub.id,
                        topic: topic.to_string(),
                        detail: panic_message(panic.as_ref()),
                    };
                    tracing::error!(error = %err, "subscriber callback panicked");
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<T: 'static> Broadcaster<T> {
    /// Like [`Broadcaster::subscribe_all`], but the subscription ends when the
    /// returned guard is dropped.
    pub fn subscribe_scoped<I, S, F>(self: &Arc<Self>, topics: I, callback: F) -> Subscription<T>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handle = self.subscribe_all(topics, callback);
        Subscription {
            hub: Arc::downgrade(self),
            handle,
        }
    }
}

pub struct Subscription<T> {
    hub: Weak<Broadcaster<T>>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.handle);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = panic.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Callback<u32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for = Arc::clone(&log);
        let make = move |name: &str| -> Callback<u32> {
            let log = Arc::clone(&log_for);
            let name = name.to_string();
            Arc::new(move |v: &u32| {
                log.lock().unwrap().push(format!("{name}:{v}"));
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn delivers_in_subscription_order() {
        let hub = Broadcaster::<u32>::new();
        let (log, make) = recorder();
        for name in ["a", "b", "c"] {
            let cb = make(name);
            hub.subscribe("readiness", move |v| cb(v));
        }

        assert_eq!(hub.publish("readiness", &7), 3);
        assert_eq!(*log.lock().unwrap(), ["a:7", "b:7", "c:7"]);
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let hub = Broadcaster::<u32>::new();
        let (log, make) = recorder();

        hub.subscribe("readiness", |_| anyhow::bail!("widget detached"));
        hub.subscribe("readiness", |_| panic!("widget exploded"));
        let cb = make("second");
        hub.subscribe("readiness", move |v| cb(v));

        assert_eq!(hub.publish("readiness", &1), 1);
        assert_eq!(*log.lock().unwrap(), ["second:1"]);

        // Still subscribed and still isolated on the next publish.
        assert_eq!(hub.publish("readiness", &2), 1);
        assert_eq!(hub.subscriber_count("readiness"), 3);
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let hub = Broadcaster::<u32>::new();
        assert_eq!(hub.publish("readiness", &1), 0);

        let (log, make) = recorder();
        let cb = make("late");
        hub.subscribe("readiness", move |v| cb(v));
        assert!(log.lock().unwrap().is_empty());
        hub.publish("readiness", &2);
        assert_eq!(*log.lock().unwrap(), ["late:2"]);
    }

    #[test]
    fn unsubscribe_removes_every_topic() {
        let hub = Broadcaster::<u32>::new();
        let (log, make) = recorder();
        let cb = make("multi");
        let handle = hub.subscribe_all(["readiness", "leverage", "readiness"], move |v| cb(v));
        assert_eq!(handle.topics(), ["readiness", "leverage"]);

        hub.publish("leverage", &3);
        assert!(hub.unsubscribe(&handle));
        assert!(!hub.unsubscribe(&handle));
        hub.publish("readiness", &4);

        assert_eq!(*log.lock().unwrap(), ["multi:3"]);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn resubscribing_does_not_leak() {
        let hub = Broadcaster::<u32>::new();
        for _ in 0..100 {
            let handle = hub.subscribe("readiness", |_| Ok(()));
            hub.unsubscribe(&handle);
        }
        assert_eq!(hub.subscriber_count("readiness"), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn scoped_subscription_ends_on_drop() {
        let hub = Arc::new(Broadcaster::<u32>::new());
        let guard = hub.subscribe_scoped(["readiness"], |_| Ok(()));
        assert_eq!(hub.subscriber_count("readiness"), 1);
        drop(guard);
        assert_eq!(hub.subscriber_count("readiness"), 0);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let hub = Arc::new(Broadcaster::<u32>::new());
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let hub_ref = Arc::downgrade(&hub);
        let slot_ref = Arc::clone(&slot);
        let handle = hub.subscribe("readiness", move |_| {
            if let (Some(hub), Some(handle)) = (hub_ref.upgrade(), slot_ref.lock().unwrap().take()) {
                hub.unsubscribe(&handle);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(handle);

        assert_eq!(hub.publish("readiness", &1), 1);
        assert_eq!(hub.publish("readiness", &2), 0);
    }
}
