use std::future::Future;

use async_trait::async_trait;

use crate::error::ResourceError;

/// Builds a fresh instance of a managed resource.
///
/// Called under the manager's construction lock, so an implementation never
/// runs concurrently with itself for the same `ManagedResource`.
#[async_trait]
pub trait ResourceFactory<T>: Send + Sync {
    /// Resource name used in logs, metrics and errors
    fn name(&self) -> &str;

    /// Construct the resource. Must not leave partial state behind on error.
    async fn create(&self) -> Result<T, ResourceError>;
}

/// Factory backed by an async closure.
pub struct FnFactory<F> {
    name: String,
    build: F,
}

/// Wrap an async closure as a [`ResourceFactory`].
///
/// ```ignore
/// let conn = ManagedResource::new(fn_factory("index", || async { connect().await }));
/// ```
pub fn fn_factory<F>(name: impl Into<String>, build: F) -> FnFactory<F> {
    FnFactory {
        name: name.into(),
        build,
    }
}

#[async_trait]
impl<T, F, Fut> ResourceFactory<T> for FnFactory<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ResourceError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self) -> Result<T, ResourceError> {
        (self.build)().await
    }
}
