//! Resource Lifecycle
//!
//! Keeps a heavyweight resource (an ML model, a remote index connection)
//! resident only while work that needs it is running.
//!
//! ## Features
//!
//! - **Lazy construction**: the instance is built on the first `acquire()`
//! - **Single construction**: concurrent acquirers wait on one in-flight build and share it
//! - **Scoped release**: a [`Lease`] releases on drop, on every exit path
//! - **Deterministic teardown**: the instance is destroyed when the last lease ends
//! - **Observer hook**: load/acquire/release/unload events for tracing and tests
//!
//! ## Example
//!
//! ```ignore
//! use resource_lifecycle::{ManagedResource, ResourceFactory};
//!
//! let model = ManagedResource::new(ModelLoader::new(config));
//!
//! {
//!     let lease = model.acquire().await?;
//!     lease.embed("...")?;
//! } // last lease dropped: model unloaded
//!
//! assert!(!model.is_loaded());
//! ```

mod error;
mod factory;
mod manager;
mod observer;

pub use error::ResourceError;
pub use factory::{FnFactory, ResourceFactory, fn_factory};
pub use manager::{Lease, ManagedResource};
pub use observer::{LifecycleEvent, LifecycleObserver, RecordingObserver, TracingObserver};
