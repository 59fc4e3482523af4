//! The engine seam: how the embed protocol driver talks to whatever hosts the embeddable surface.
//!
//! A launcher produces one fresh [`EngineSession`] per render. Sessions exchange JSON text
//! messages and are always [`terminate`](EngineSession::terminate)d by the driver, on success and
//! on every failure path.

use futures::future::BoxFuture;

use drawport_core::Result;

pub trait EngineLauncher: Send + Sync {
    /// Starts an engine and returns an exclusively owned session to it.
    ///
    /// A missing or unlaunchable engine is reported as
    /// [`Error::BackendUnavailable`](drawport_core::Error::BackendUnavailable).
    fn launch(&self) -> BoxFuture<'_, Result<Box<dyn EngineSession>>>;
}

pub trait EngineSession: Send {
    /// Delivers one command (a JSON object serialized to text) to the surface.
    fn send(&mut self, message: String) -> BoxFuture<'_, Result<()>>;

    /// Waits for the next message from the surface. `Ok(None)` means the channel closed.
    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<String>>>;

    /// Stops the engine and releases everything the session holds.
    fn terminate(self: Box<Self>) -> BoxFuture<'static, ()>;
}
