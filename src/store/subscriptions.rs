//! Subscription registry
//!
//! The engine only knows adapters (closures over descriptors). Each public
//! subscription gets a [`SubscriptionHandle`] that maps to the engine
//! observer wrapping the caller's callback, so cancelling by handle always
//! reaches the right adapter.

use crate::engine::{ChangeEvent, ObserverId, QuadDescriptor};
use crate::engine::callbacks::{NodeAdapter, PatternAdapter, QueryAdapter};
use crate::rdf::Triple;
use crate::sparql::SparqlResults;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Handle returned by every subscription call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription#{}", self.0)
    }
}

/// What a subscription observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Node,
    Query,
    Pattern,
}

/// An active subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub kind: SubscriptionKind,
    /// Node IRI, query text or pattern description
    pub target: String,
    observer: ObserverId,
}

/// Handle → engine observer mapping
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_handle: AtomicU64,
    entries: Mutex<HashMap<SubscriptionHandle, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SubscriptionHandle, Subscription>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an engine observer and issue its handle
    pub fn register(&self, kind: SubscriptionKind, target: impl Into<String>, observer: ObserverId) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        let target = target.into();
        debug!("{} active: {:?} {}", handle, kind, target);
        self.entries().insert(handle, Subscription { kind, target, observer });
        handle
    }

    /// Remove a handle of the given kind, returning its engine observer
    ///
    /// Unknown handles, and handles of another kind, are left alone.
    pub fn remove(&self, handle: SubscriptionHandle, kind: SubscriptionKind) -> Option<ObserverId> {
        let mut entries = self.entries();
        match entries.get(&handle) {
            Some(subscription) if subscription.kind == kind => {
                entries.remove(&handle).map(|s| s.observer)
            }
            Some(subscription) => {
                warn!("{} is a {:?} subscription, not {:?}", handle, subscription.kind, kind);
                None
            }
            None => None,
        }
    }

    pub fn get(&self, handle: SubscriptionHandle) -> Option<Subscription> {
        self.entries().get(&handle).cloned()
    }

    /// Every active handle of a kind
    pub fn handles(&self, kind: SubscriptionKind) -> Vec<SubscriptionHandle> {
        let mut handles: Vec<SubscriptionHandle> = self
            .entries()
            .iter()
            .filter(|(_, s)| s.kind == kind)
            .map(|(h, _)| *h)
            .collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Rehydrate descriptors, skipping any that aren't valid triples
fn triples(quads: &[QuadDescriptor]) -> Vec<Triple> {
    quads
        .iter()
        .filter_map(|q| match q.to_triple() {
            Ok(triple) => Some(triple),
            Err(e) => {
                warn!("Dropping undeliverable quad: {}", e);
                None
            }
        })
        .collect()
}

/// Engine adapter for a node callback
pub fn node_adapter<F>(callback: F) -> NodeAdapter
where
    F: Fn(Vec<Triple>) + Send + Sync + 'static,
{
    Arc::new(move |quads: &[QuadDescriptor]| callback(triples(quads)))
}

/// Engine adapter for a query callback
pub fn query_adapter<F>(callback: F) -> QueryAdapter
where
    F: Fn(&SparqlResults) + Send + Sync + 'static,
{
    Arc::new(move |results: &SparqlResults| callback(results))
}

/// Engine adapter for a pattern callback
pub fn pattern_adapter<F>(callback: F) -> PatternAdapter
where
    F: Fn(ChangeEvent, Vec<Triple>) + Send + Sync + 'static,
{
    Arc::new(move |event: ChangeEvent, quads: &[QuadDescriptor]| callback(event, triples(quads)))
}
