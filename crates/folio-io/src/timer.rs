//! Browser [`Timer`] on `setTimeout`.

use std::future::Future;
use std::time::Duration;

use folio_pipeline::Timer;

/// Sleeps with `gloo_timers`, yielding to the browser event loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserTimer;

impl Timer for BrowserTimer {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        gloo_timers::future::sleep(duration)
    }
}
