//! Global Tokio runtime for component background tasks
//!
//! The capture timer, playback position poller, and device event listener
//! are tokio tasks, but the public API is synchronous and callers may not
//! have a runtime of their own. Commands reuse the caller's runtime when one
//! is ambient, otherwise they spawn onto a lazily initialized global one.

use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Handle for spawning background tasks
pub(crate) fn handle() -> Handle {
    if let Ok(handle) = Handle::try_current() {
        return handle;
    }
    RUNTIME
        .get_or_init(|| {
            Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("voicenote-rt")
                .enable_all()
                .build()
                .expect("failed to create tokio runtime")
        })
        .handle()
        .clone()
}
