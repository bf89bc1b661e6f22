//! Local task spawning and cancellable timers.
//!
//! Natively everything runs on tokio's thread-local executor, so the library must be driven
//! from inside a [`tokio::task::LocalSet`]. In the browser the wasm-bindgen executor is used.
//!
//! Outside any tokio runtime, such as a plain `#[test]` or a synchronous setup step, deferred
//! work is dropped with a warning instead of panicking, so cache writes still succeed.

use std::{future::Future, time::Duration};

use futures::future::{AbortHandle, Abortable};

/// Whether deferred work can run on this thread.
pub(crate) fn has_executor() -> bool {
    cfg_if::cfg_if! {
        if #[cfg(any(feature = "hydrate", feature = "csr"))] {
            true
        } else {
            tokio::runtime::Handle::try_current().is_ok()
        }
    }
}

pub(crate) fn spawn_local(fut: impl Future<Output = ()> + 'static) {
    if !has_executor() {
        tracing::warn!("no tokio runtime on this thread, dropping local task");
        return;
    }
    cfg_if::cfg_if! {
        if #[cfg(any(feature = "hydrate", feature = "csr"))] {
            wasm_bindgen_futures::spawn_local(fut);
        } else {
            // Detached: completion is observed through cache state, not the join handle.
            drop(tokio::task::spawn_local(fut));
        }
    }
}

/// The deadline is fixed when this is called, not when the future is first polled.
pub(crate) fn sleep(duration: Duration) -> impl Future<Output = ()> {
    cfg_if::cfg_if! {
        if #[cfg(any(feature = "hydrate", feature = "csr"))] {
            gloo_timers::future::sleep(duration)
        } else {
            tokio::time::sleep(duration)
        }
    }
}

/// Runs `func` on the next turn of the executor, after the current synchronous work.
pub(crate) fn queue_microtask(func: impl FnOnce() + 'static) {
    spawn_local(async move { func() })
}

/// Handle to a pending [`set_timeout`] callback.
#[derive(Debug)]
pub(crate) struct TimeoutHandle(AbortHandle);

impl TimeoutHandle {
    /// Cancels the callback. No-op if it already ran.
    pub(crate) fn clear(self) {
        self.0.abort();
    }
}

pub(crate) fn set_timeout(func: impl FnOnce() + 'static, duration: Duration) -> TimeoutHandle {
    let (handle, registration) = AbortHandle::new_pair();
    if !has_executor() {
        tracing::warn!(?duration, "no tokio runtime on this thread, timer will not fire");
        return TimeoutHandle(handle);
    }
    let delay = sleep(duration);
    let timer = Abortable::new(
        async move {
            delay.await;
            func();
        },
        registration,
    );
    spawn_local(async move {
        let _ = timer.await;
    });
    TimeoutHandle(handle)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::future::Future;

    /// Runs a test body inside a `LocalSet`.
    pub(crate) async fn run_local<F: Future>(fut: F) -> F::Output {
        tokio::task::LocalSet::new().run_until(fut).await
    }

    /// Lets every ready local task run to completion.
    pub(crate) async fn flush() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }
}
