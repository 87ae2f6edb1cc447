//! Runs blocking engine work on tokio's blocking pool.

use rustlevel_core::{Error, Result};
use std::io;

/// Run `f` on the blocking pool and resolve once with its result.
///
/// A panic inside `f` is resumed on the awaiting task.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(Error::Io(io::Error::new(
            io::ErrorKind::Interrupted,
            format!("blocking task did not complete: {}", e),
        ))),
    }
}
