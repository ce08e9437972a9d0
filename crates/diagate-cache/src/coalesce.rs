//! Request coalescing ("single flight").
//!
//! [`Coalescer::run`] guarantees at most one running producer per key. A
//! caller that arrives while a producer for its key is in flight awaits the
//! same shared outcome instead of starting another one.
//!
//! The producer runs on its own task, so it completes (and its side effects,
//! such as populating a result cache, happen) even if every waiting caller
//! goes away. Its registration is removed when it settles, on success, failure
//! or panic alike, so the next call after a failure starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::task::JoinError;

use crate::lock::lock;

type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// How a caller took part in a coalesced call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flight {
    /// This caller registered and started the producer.
    Started,
    /// A producer for the key was already running; this caller shared it.
    Joined,
}

struct InFlight<T, E> {
    id: u64,
    outcome: SharedOutcome<T, E>,
}

struct Registry<T, E> {
    calls: HashMap<String, InFlight<T, E>>,
    next_id: u64,
}

/// Deduplicates concurrent producers by key.
///
/// `T` and `E` are cloned to every caller sharing an outcome, so both are
/// typically cheap handles (`Arc`s or small enums). `E: From<JoinError>`
/// covers a producer task that panicked or was aborted.
pub struct Coalescer<T, E> {
    registry: Arc<Mutex<Registry<T, E>>>,
}

impl<T, E> Default for Coalescer<T, E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                calls: HashMap::new(),
                next_id: 0,
            })),
        }
    }
}

impl<T, E> Coalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + From<JoinError> + Send + Sync + 'static,
{
    /// Create an empty coalescer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key`, or share the outcome of the one already
    /// running.
    ///
    /// `producer` is only polled when this call starts the flight; otherwise
    /// it is dropped without running.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn run<F>(&self, key: &str, producer: F) -> (Result<T, E>, Flight)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (outcome, flight) = {
            let mut registry = lock(&self.registry, "coalescer.run");

            if let Some(existing) = registry.calls.get(key) {
                (existing.outcome.clone(), Flight::Joined)
            } else {
                let id = registry.next_id;
                registry.next_id += 1;

                let guard = Deregister {
                    registry: Arc::clone(&self.registry),
                    key: key.to_owned(),
                    id,
                };
                // The deregistration lock is taken only after this block
                // releases it, so the entry is always inserted first.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    producer.await
                });
                let outcome = async move { handle.await.unwrap_or_else(|e| Err(E::from(e))) }
                    .boxed()
                    .shared();

                registry.calls.insert(
                    key.to_owned(),
                    InFlight {
                        id,
                        outcome: outcome.clone(),
                    },
                );
                (outcome, Flight::Started)
            }
        };

        (outcome.await, flight)
    }

    /// Number of keys with a producer currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.registry, "coalescer.in_flight").calls.len()
    }
}

/// Removes a flight's registration when its producer task finishes or unwinds.
struct Deregister<T, E> {
    registry: Arc<Mutex<Registry<T, E>>>,
    key: String,
    id: u64,
}

impl<T, E> Drop for Deregister<T, E> {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry, "coalescer.deregister");
        if registry
            .calls
            .get(&self.key)
            .is_some_and(|call| call.id == self.id)
        {
            registry.calls.remove(&self.key);
        }
    }
}
