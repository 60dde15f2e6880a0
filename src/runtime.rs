//! Runtime abstraction layer for async operations
//!
//! Tile fetches are the only async work in the crate. They are spawned through
//! an [`AsyncSpawner`] so hosts can plug in whichever executor they already run.

use crate::prelude::{Future, Pin};
use crate::{Error, Result};

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Result<Box<dyn AsyncHandle>>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;
}

/// Spawn on the global runtime.
pub fn spawn<F>(future: F) -> Result<Box<dyn AsyncHandle>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let spawner = runtime().ok_or_else(|| {
        Error::Runtime("no async runtime configured; call runtime::init_runtime".to_string())
    })?;
    spawner.spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::runtime::Handle;
        use ::tokio::task::JoinHandle;

        /// Tokio-based async spawner.
        ///
        /// Without a pinned handle it spawns onto whichever tokio runtime is
        /// current at the call site.
        #[derive(Debug, Clone, Default)]
        pub struct TokioSpawner {
            handle: Option<Handle>,
        }

        impl TokioSpawner {
            pub fn new(handle: Handle) -> Self {
                Self {
                    handle: Some(handle),
                }
            }
        }

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Result<Box<dyn AsyncHandle>> {
                let handle = match &self.handle {
                    Some(handle) => handle.clone(),
                    None => Handle::try_current()
                        .map_err(|e| Error::Runtime(format!("no tokio runtime: {}", e)))?,
                };
                Ok(Box::new(TokioHandle(handle.spawn(future))))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }
        }
    }
}

/// Global runtime instance
static RUNTIME: once_cell::sync::OnceCell<Box<dyn AsyncSpawner>> =
    once_cell::sync::OnceCell::new();

/// Initialize the runtime with a specific spawner. Returns `false` if a
/// spawner was already installed.
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) -> bool {
    RUNTIME.set(spawner).is_ok()
}

/// Get the global runtime spawner, falling back to the tokio spawner when
/// that backend is compiled in.
pub fn runtime() -> Option<&'static dyn AsyncSpawner> {
    #[cfg(feature = "tokio-runtime")]
    {
        Some(
            RUNTIME
                .get_or_init(|| Box::new(spawners::tokio_impl::TokioSpawner::default()))
                .as_ref(),
        )
    }

    #[cfg(not(feature = "tokio-runtime"))]
    {
        RUNTIME.get().map(|spawner| spawner.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    #[::tokio::test]
    async fn test_tokio_spawner() {
        let (tx, rx) = ::tokio::sync::oneshot::channel();
        let handle = spawn(async move {
            let _ = tx.send(7);
        })
        .unwrap();

        assert_eq!(rx.await.unwrap(), 7);
        ::tokio::task::yield_now().await;
        ::tokio::time::sleep(::tokio::time::Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }

    #[cfg(feature = "tokio-runtime")]
    #[test]
    fn test_spawn_outside_runtime_is_an_error() {
        let spawner = spawners::tokio_impl::TokioSpawner::default();
        let result = spawner.spawn_boxed(Box::pin(async {}));
        assert!(matches!(result, Err(Error::Runtime(_))));
    }
}
