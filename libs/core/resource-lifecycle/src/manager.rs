//! Managed resource slot and scoped leases.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::factory::ResourceFactory;
use crate::observer::{LifecycleEvent, LifecycleObserver};

struct Slot<T> {
    instance: Option<Arc<T>>,
    leases: usize,
}

struct Shared<T> {
    name: String,
    factory: Box<dyn ResourceFactory<T>>,
    /// Serializes construction. Held across the factory's await.
    init_lock: tokio::sync::Mutex<()>,
    /// Never held across an await.
    slot: Mutex<Slot<T>>,
    observer: Option<Arc<dyn LifecycleObserver>>,
}

impl<T> Shared<T> {
    fn lock_slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: LifecycleEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&self.name, event);
        }
    }
}

/// A lazily constructed resource that lives only while leased.
///
/// `acquire()` builds the instance if the slot is empty and hands out a
/// [`Lease`]. When the last lease is dropped the instance is destroyed. The
/// state is process-local and cheap to clone: clones share the same slot.
pub struct ManagedResource<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ManagedResource<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for ManagedResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.shared.lock_slot();
        f.debug_struct("ManagedResource")
            .field("name", &self.shared.name)
            .field("loaded", &slot.instance.is_some())
            .field("leases", &slot.leases)
            .finish()
    }
}

impl<T> ManagedResource<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(factory: impl ResourceFactory<T> + 'static) -> Self {
        Self::build(factory, None)
    }

    pub fn with_observer(
        factory: impl ResourceFactory<T> + 'static,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self::build(factory, Some(observer))
    }

    fn build(
        factory: impl ResourceFactory<T> + 'static,
        observer: Option<Arc<dyn LifecycleObserver>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: factory.name().to_string(),
                factory: Box::new(factory),
                init_lock: tokio::sync::Mutex::new(()),
                slot: Mutex::new(Slot {
                    instance: None,
                    leases: 0,
                }),
                observer,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Lease the resource, constructing it first if no instance is live.
    ///
    /// At most one construction runs at a time. Callers arriving while a
    /// construction is in flight wait for it and share its instance. On
    /// failure the slot stays empty and the error is returned as-is.
    pub async fn acquire(&self) -> Result<Lease<T>, ResourceError> {
        if let Some(lease) = self.try_lease() {
            return Ok(lease);
        }

        let _guard = self.shared.init_lock.lock().await;

        // Someone else may have finished building while we waited
        if let Some(lease) = self.try_lease() {
            return Ok(lease);
        }

        debug!(resource = %self.shared.name, "Constructing resource");
        let resource = match self.shared.factory.create().await {
            Ok(resource) => resource,
            Err(e) => {
                warn!(resource = %self.shared.name, error = %e, "Resource construction failed");
                self.shared.notify(LifecycleEvent::LoadFailed);
                return Err(e);
            }
        };

        let instance = Arc::new(resource);
        {
            let mut slot = self.shared.lock_slot();
            slot.instance = Some(Arc::clone(&instance));
            slot.leases += 1;
        }
        self.shared.notify(LifecycleEvent::Loaded);
        self.shared.notify(LifecycleEvent::Acquired);

        Ok(Lease {
            shared: Arc::clone(&self.shared),
            instance,
        })
    }

    fn try_lease(&self) -> Option<Lease<T>> {
        let instance = {
            let mut slot = self.shared.lock_slot();
            let instance = slot.instance.as_ref().map(Arc::clone)?;
            slot.leases += 1;
            instance
        };
        self.shared.notify(LifecycleEvent::Acquired);

        Some(Lease {
            shared: Arc::clone(&self.shared),
            instance,
        })
    }

    /// Whether an instance is currently resident
    pub fn is_loaded(&self) -> bool {
        self.shared.lock_slot().instance.is_some()
    }

    pub fn active_leases(&self) -> usize {
        self.shared.lock_slot().leases
    }

    /// Destroy an idle instance immediately.
    ///
    /// Returns `false` if nothing was resident or leases are still out; an
    /// instance in use is never torn down underneath its holders.
    pub async fn unload(&self) -> bool {
        let _guard = self.shared.init_lock.lock().await;

        let instance = {
            let mut slot = self.shared.lock_slot();
            if slot.leases == 0 {
                slot.instance.take()
            } else {
                None
            }
        };

        match instance {
            Some(instance) => {
                drop(instance);
                self.shared.notify(LifecycleEvent::Unloaded);
                debug!(resource = %self.shared.name, "Resource unloaded");
                true
            }
            None => false,
        }
    }
}

/// Scoped handle to a live resource. Dropping it releases the resource.
pub struct Lease<T> {
    shared: Arc<Shared<T>>,
    instance: Arc<T>,
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        let unloaded = {
            let mut slot = self.shared.lock_slot();
            slot.leases = slot.leases.saturating_sub(1);
            if slot.leases == 0 {
                slot.instance.take()
            } else {
                None
            }
        };
        self.shared.notify(LifecycleEvent::Released);

        // The slot's reference goes here; ours follows when the fields drop,
        // which destroys the instance before `drop(lease)` returns.
        if let Some(instance) = unloaded {
            drop(instance);
            self.shared.notify(LifecycleEvent::Unloaded);
            debug!(resource = %self.shared.name, "Last lease released, resource unloaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::fn_factory;
    use crate::observer::RecordingObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Tracked {
        id: usize,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked_resource(
        builds: Arc<AtomicUsize>,
        drops: Arc<AtomicUsize>,
    ) -> ManagedResource<Tracked> {
        ManagedResource::new(fn_factory("tracked", move || {
            let builds = builds.clone();
            let drops = drops.clone();
            async move {
                let id = builds.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, ResourceError>(Tracked { id, drops })
            }
        }))
    }

    #[tokio::test]
    async fn test_acquire_builds_lazily_and_release_destroys() {
        let builds = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let resource = tracked_resource(builds.clone(), drops.clone());

        assert!(!resource.is_loaded());
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        let lease = resource.acquire().await.unwrap();
        assert_eq!(lease.id, 1);
        assert!(resource.is_loaded());
        assert_eq!(resource.active_leases(), 1);

        drop(lease);
        assert!(!resource.is_loaded());
        assert_eq!(resource.active_leases(), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nested_leases_share_instance() {
        let builds = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let resource = tracked_resource(builds.clone(), drops.clone());

        let first = resource.acquire().await.unwrap();
        let second = resource.acquire().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(resource.active_leases(), 2);

        drop(first);
        assert!(resource.is_loaded());
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(second);
        assert!(!resource.is_loaded());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_constructs_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let resource = tracked_resource(builds.clone(), drops.clone());
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let resource = resource.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                let lease = resource.acquire().await.unwrap();
                // Hold every lease until all tasks have one
                barrier.wait().await;
                lease.id
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!resource.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_construction_leaves_slot_empty_and_retry_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let observer = Arc::new(RecordingObserver::new());
        let counter = attempts.clone();
        let resource = ManagedResource::with_observer(
            fn_factory("flaky", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ResourceError::init("flaky", "connection refused"))
                    } else {
                        Ok(42u32)
                    }
                }
            }),
            observer.clone(),
        );

        let err = resource.acquire().await.err().unwrap();
        assert!(matches!(err, ResourceError::Init { .. }));
        assert!(!resource.is_loaded());
        assert_eq!(resource.active_leases(), 0);

        let lease = resource.acquire().await.unwrap();
        assert_eq!(*lease, 42);
        drop(lease);

        assert_eq!(
            observer.events(),
            vec![
                LifecycleEvent::LoadFailed,
                LifecycleEvent::Loaded,
                LifecycleEvent::Acquired,
                LifecycleEvent::Released,
                LifecycleEvent::Unloaded,
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_cycles_reconstruct() {
        let builds = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let resource = tracked_resource(builds.clone(), drops.clone());

        for cycle in 1..=3 {
            let lease = resource.acquire().await.unwrap();
            assert_eq!(lease.id, cycle);
            drop(lease);
            assert!(!resource.is_loaded());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 3);
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_lease_released_on_error_path() {
        let observer = Arc::new(RecordingObserver::new());
        let resource = ManagedResource::with_observer(
            fn_factory("conn", || async { Ok::<_, ResourceError>(String::from("conn")) }),
            observer.clone(),
        );

        async fn use_and_fail(resource: &ManagedResource<String>) -> Result<(), String> {
            let lease = resource.acquire().await.map_err(|e| e.to_string())?;
            Err(format!("transport fault on {}", *lease))
        }

        let result = use_and_fail(&resource).await;
        assert_eq!(result.unwrap_err(), "transport fault on conn");
        assert_eq!(observer.outstanding(), 0);
        assert_eq!(observer.count(LifecycleEvent::Unloaded), 1);
        assert!(!resource.is_loaded());
    }

    #[tokio::test]
    async fn test_unload_skips_leased_instance() {
        let resource = ManagedResource::new(fn_factory("conn", || async { Ok::<_, ResourceError>(1u8) }));

        assert!(!resource.unload().await);

        let lease = resource.acquire().await.unwrap();
        assert!(!resource.unload().await);
        assert!(resource.is_loaded());
        drop(lease);
        assert!(!resource.is_loaded());
    }
}
