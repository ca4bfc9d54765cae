//! Thin async-runtime glue. Connection and wire-protocol I/O live behind the `Connection` trait
//! (spec §4.2 "Connection Binding"), so the only ambient runtime concerns this crate has are
//! spawning best-effort background work (e.g. a deferred `killCursors`) and, for the blocking
//! `sync` shim, a place to `block_on` the async core.

use std::future::Future;

use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

pub(crate) static RUNTIME: Lazy<AsyncRuntime> = Lazy::new(AsyncRuntime::new);

pub(crate) struct AsyncRuntime {
    handle: Runtime,
}

impl AsyncRuntime {
    fn new() -> Self {
        let handle = Runtime::new().expect("failed to initialize async runtime");
        Self { handle }
    }

    /// Spawns `fut` as a detached background task (used for best-effort cursor cleanup).
    pub(crate) fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }

    /// Blocks the current thread until `fut` completes.
    pub(crate) fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}
