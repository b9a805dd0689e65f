//! Readiness gate: wait until every chart surface has laid out.
//!
//! Chart libraries render asynchronously, so a capture taken straight
//! after mount sees empty canvases. The gate waits an initial grace
//! delay, then polls a [`ChartProbe`] until every surface reports a
//! nonzero pixel size, or the probe signals it has settled.
//!
//! Unlike a bare polling loop, the gate is bounded: when
//! [`ReadinessConfig::timeout`] elapses it fails with
//! [`PipelineError::ChartsNotReady`].
//!
//! Timing is injected through [`Timer`] and [`Clock`] so the same code
//! runs against `gloo-timers` in the browser and a manual clock in tests.

use std::future::Future;
use std::time::Duration;

use crate::config::ReadinessConfig;
use crate::types::{Dimensions, PipelineError};

/// Source of chart surface sizes (canvases, SVG roots).
pub trait ChartProbe {
    /// Intrinsic pixel size of every currently-mounted chart surface.
    fn surface_sizes(&self) -> Vec<Dimensions>;

    /// Explicit completion signal from the chart layer.
    ///
    /// Probes that can observe a "rendered" event return `true` once it
    /// has fired; the gate then proceeds without checking sizes.
    fn is_settled(&self) -> bool {
        false
    }
}

/// Asynchronous sleep.
pub trait Timer {
    /// Resolve after `duration` has passed.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Monotonic time source.
pub trait Clock {
    /// Opaque instant type.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`, which uses
/// `performance.now()` on WASM and `std::time::Instant` on native.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Summary of a successful readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Surfaces inspected on the final poll.
    pub surfaces: usize,
    /// Number of inspections performed.
    pub polls: u32,
    /// Total time spent in the gate.
    pub waited: Duration,
}

/// Number of surfaces still reporting a zero size.
fn pending_surfaces(sizes: &[Dimensions]) -> usize {
    sizes.iter().filter(|d| d.is_empty()).count()
}

/// Wait until every chart surface has a nonzero rendered size.
///
/// A probe reporting no surfaces at all is considered ready: the report
/// simply has no charts.
///
/// # Errors
///
/// Returns [`PipelineError::ChartsNotReady`] if surfaces are still
/// unrendered when `config.timeout` has elapsed.
#[allow(clippy::future_not_send)] // WASM is single-threaded; probes hold DOM handles
pub async fn wait_for_charts<P, T, C>(
    probe: &P,
    timer: &T,
    clock: &C,
    config: &ReadinessConfig,
) -> Result<ReadinessReport, PipelineError>
where
    P: ChartProbe + ?Sized,
    T: Timer + ?Sized,
    C: Clock + ?Sized,
{
    let started = clock.now();
    if !config.grace_delay.is_zero() {
        timer.sleep(config.grace_delay).await;
    }

    let mut polls = 0u32;
    loop {
        polls += 1;
        let sizes = probe.surface_sizes();
        let pending = pending_surfaces(&sizes);
        let waited = clock.elapsed(&started);

        if probe.is_settled() || pending == 0 {
            log::debug!(
                "charts ready: {} surfaces after {polls} polls ({waited:?})",
                sizes.len()
            );
            return Ok(ReadinessReport {
                surfaces: sizes.len(),
                polls,
                waited,
            });
        }

        if waited >= config.timeout {
            log::warn!(
                "gave up waiting for charts: {pending} of {} surfaces unrendered after {waited:?}",
                sizes.len()
            );
            return Err(PipelineError::ChartsNotReady {
                waited,
                pending,
                total: sizes.len(),
            });
        }

        // Never sleep past the deadline by more than one interval.
        let remaining = config.timeout.saturating_sub(waited);
        timer.sleep(config.poll_interval.min(remaining)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::testing::{FakeProbe, ManualClock};

    fn config() -> ReadinessConfig {
        ReadinessConfig {
            grace_delay: Duration::from_millis(300),
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn no_surfaces_is_ready_after_grace_delay() {
        let clock = ManualClock::default();
        let probe = FakeProbe::new(vec![]);
        let report = block_on(wait_for_charts(&probe, &clock, &clock, &config())).unwrap();
        assert_eq!(report.surfaces, 0);
        assert_eq!(report.polls, 1);
        assert_eq!(report.waited, Duration::from_millis(300));
    }

    #[test]
    fn waits_until_every_surface_is_sized() {
        let clock = ManualClock::default();
        let probe = FakeProbe::new(vec![Dimensions::new(400, 300), Dimensions::new(600, 200)])
            .rendered_after(3);
        let report = block_on(wait_for_charts(&probe, &clock, &clock, &config())).unwrap();
        assert_eq!(report.surfaces, 2);
        assert_eq!(report.polls, 4);
        // Grace delay plus three poll intervals.
        assert_eq!(report.waited, Duration::from_millis(600));
    }

    #[test]
    fn settled_signal_short_circuits_size_check() {
        let clock = ManualClock::default();
        let probe = FakeProbe::new(vec![Dimensions::new(400, 300)])
            .rendered_after(u32::MAX)
            .settled();
        let report = block_on(wait_for_charts(&probe, &clock, &clock, &config())).unwrap();
        assert_eq!(report.polls, 1);
    }

    #[test]
    fn times_out_with_typed_error() {
        let clock = ManualClock::default();
        let probe = FakeProbe::new(vec![Dimensions::new(400, 300), Dimensions::new(10, 10)])
            .rendered_after(u32::MAX);
        let err = block_on(wait_for_charts(&probe, &clock, &clock, &config())).unwrap_err();
        match err {
            PipelineError::ChartsNotReady {
                waited,
                pending,
                total,
            } => {
                assert_eq!(waited, Duration::from_secs(2));
                assert_eq!(pending, 2);
                assert_eq!(total, 2);
            }
            other => panic!("expected ChartsNotReady, got {other:?}"),
        }
    }

    #[test]
    fn deadline_is_not_overshot_by_long_interval() {
        let clock = ManualClock::default();
        let probe = FakeProbe::new(vec![Dimensions::new(1, 1)]).rendered_after(u32::MAX);
        let cfg = ReadinessConfig {
            grace_delay: Duration::ZERO,
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
        };
        let err = block_on(wait_for_charts(&probe, &clock, &clock, &cfg)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ChartsNotReady { waited, .. } if waited == Duration::from_secs(1)
        ));
    }

    #[test]
    fn system_clock_elapsed_is_monotonic() {
        let clock = SystemClock;
        let start = clock.now();
        let a = clock.elapsed(&start);
        let b = clock.elapsed(&start);
        assert!(b >= a);
    }
}
