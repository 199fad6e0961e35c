//! Timers for polling loops and countdowns.
//!
//! Everything here runs on a single-threaded executor: the browser event loop on wasm,
//! a tokio `LocalSet` natively.
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::AbortHandle;

pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    fn sleep(&self, ms: u32) -> impl Future<Output = ()>;
}

/// Wall clock for native builds.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(not(target_arch = "wasm32"))]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn sleep(&self, ms: u32) -> impl Future<Output = ()> {
        tokio::time::sleep(std::time::Duration::from_millis(u64::from(ms)))
    }
}

/// `Date.now()` and `setTimeout`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserClock;

#[cfg(target_arch = "wasm32")]
impl Clock for BrowserClock {
    fn now_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }

    fn sleep(&self, ms: u32) -> impl Future<Output = ()> {
        let promise = js_sys::Promise::new(&mut |resolve, _| match web_sys::window() {
            Some(window) => {
                if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                    &resolve,
                    ms.min(i32::MAX as u32) as i32,
                ) {
                    log::error!("Failed to schedule timer: {e:?}");
                }
            }
            None => log::error!("No window available, timer will never fire"),
        });
        async move {
            let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
        }
    }
}

/// The clock of the platform being compiled for.
#[cfg(target_arch = "wasm32")]
pub type PlatformClock = BrowserClock;
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformClock = SystemClock;

/// A clock that only moves when told to. Sleeping advances it by the requested amount.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(now_ms)),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }

    fn sleep(&self, ms: u32) -> impl Future<Output = ()> {
        let now = self.now.clone();
        async move {
            YieldOnce(false).await;
            now.set(now.get() + i64::from(ms));
        }
    }
}

// Returns Pending exactly once, so an executor gets a chance to observe cancellation.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Stops its interval when cleared or dropped.
#[derive(Debug)]
pub struct IntervalHandle {
    abort: AbortHandle,
}

impl IntervalHandle {
    pub fn clear(&self) {
        self.abort.abort();
    }

    pub fn is_cleared(&self) -> bool {
        self.abort.is_aborted()
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Run `tick` every `period_ms`, first after one full period, like `setInterval`.
///
/// The returned future must be spawned (or awaited) to start the interval. It completes once the
/// handle is cleared or dropped.
pub fn every<C, F, Fut>(
    clock: C,
    period_ms: u32,
    mut tick: F,
) -> (impl Future<Output = ()>, IntervalHandle)
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let (future, abort) = futures::future::abortable(async move {
        loop {
            clock.sleep(period_ms).await;
            tick().await;
        }
    });
    (future.map(|_| ()), IntervalHandle { abort })
}

#[cfg(target_arch = "wasm32")]
pub fn spawn_local(future: impl Future<Output = ()> + 'static) {
    wasm_bindgen_futures::spawn_local(future);
}

/// Must be called from within a tokio `LocalSet`.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_local(future: impl Future<Output = ()> + 'static) {
    tokio::task::spawn_local(future);
}
