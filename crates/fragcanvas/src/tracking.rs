//! Change trackers feeding a [`SurfaceController`](crate::controller::SurfaceController).
//!
//! Visibility and resize notifications go through process-wide
//! [`ObserverRegistry`] instances keyed by [`TargetId`]; the host reports raw
//! events with [`ObserverRegistry::notify`] and the registry routes them to the
//! one callback registered for that target. Text mutation tracking is
//! per-subscription and entirely host specific.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tracing::trace;

use crate::types::ContentBox;

/// Stable identity of a tracked surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active registration with a tracker. Dropping it unregisters.
#[must_use = "dropping a subscription stops delivery immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to release.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

pub type VisibilityCallback = Box<dyn FnMut(bool) + Send>;
pub type ResizeCallback = Box<dyn FnMut(ContentBox) + Send>;
pub type TextCallback = Box<dyn FnMut() + Send>;

/// Reports whether a target intersects the visible area at all.
pub trait VisibilityTracker {
    fn track(&self, target: &TargetId, callback: VisibilityCallback) -> Subscription;
}

/// Reports the target's device-pixel content box whenever it changes.
pub trait ResizeTracker {
    fn track(&self, target: &TargetId, callback: ResizeCallback) -> Subscription;
}

/// Reports any change to the target's descendant text content.
pub trait TextMutationTracker {
    fn track(&self, target: &TargetId, callback: TextCallback) -> Subscription;
}

type SharedCallback<E> = Arc<Mutex<Box<dyn FnMut(E) + Send>>>;

struct Registration<E> {
    generation: u64,
    callback: SharedCallback<E>,
}

struct RegistryInner<E> {
    generation: u64,
    callbacks: HashMap<TargetId, Registration<E>>,
}

/// Maps each target to at most one callback.
///
/// Registering a target again replaces the earlier callback; the earlier
/// subscription then releases nothing.
pub struct ObserverRegistry<E> {
    inner: Mutex<RegistryInner<E>>,
}

impl<E> ObserverRegistry<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                generation: 0,
                callbacks: HashMap::new(),
            }),
        }
    }

    pub fn register(
        self: &Arc<Self>,
        target: &TargetId,
        callback: Box<dyn FnMut(E) + Send>,
    ) -> Subscription
    where
        E: 'static,
    {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            let generation = inner.generation;
            inner.callbacks.insert(
                target.clone(),
                Registration {
                    generation,
                    callback: Arc::new(Mutex::new(callback)),
                },
            );
            generation
        };
        trace!(surface = %target, "observer registered");

        let registry: Weak<Self> = Arc::downgrade(self);
        let target = target.clone();
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.unregister(&target, generation);
            }
        })
    }

    /// Delivers `event` to the callback registered for `target`, if any.
    ///
    /// The registry lock is released before the callback runs, so callbacks
    /// may register or cancel subscriptions. A callback must not notify its
    /// own target.
    pub fn notify(&self, target: &TargetId, event: E) -> bool {
        let callback = match self.lock().callbacks.get(target) {
            Some(registration) => Arc::clone(&registration.callback),
            None => return false,
        };
        let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
        (*callback)(event);
        true
    }

    pub fn is_tracking(&self, target: &TargetId) -> bool {
        self.lock().callbacks.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unregister(&self, target: &TargetId, generation: u64) {
        let mut inner = self.lock();
        if inner
            .callbacks
            .get(target)
            .is_some_and(|registration| registration.generation == generation)
        {
            inner.callbacks.remove(target);
            trace!(surface = %target, "observer unregistered");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityTracker for Arc<ObserverRegistry<bool>> {
    fn track(&self, target: &TargetId, callback: VisibilityCallback) -> Subscription {
        self.register(target, callback)
    }
}

impl ResizeTracker for Arc<ObserverRegistry<ContentBox>> {
    fn track(&self, target: &TargetId, callback: ResizeCallback) -> Subscription {
        self.register(target, callback)
    }
}

/// Process-wide visibility registry, created on first use.
pub fn visibility_registry() -> Arc<ObserverRegistry<bool>> {
    static REGISTRY: OnceLock<Arc<ObserverRegistry<bool>>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(|| Arc::new(ObserverRegistry::new())))
}

/// Process-wide resize registry, created on first use.
pub fn resize_registry() -> Arc<ObserverRegistry<ContentBox>> {
    static REGISTRY: OnceLock<Arc<ObserverRegistry<ContentBox>>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(|| Arc::new(ObserverRegistry::new())))
}
