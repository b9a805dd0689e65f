//! Restoration guard: undo every live-DOM mutation made for a capture.
//!
//! The preparator routes each live change through a
//! [`RestorationGuard`], which records the original inline value before
//! writing the new one. Temporary off-screen containers are adopted by
//! the guard as well. Reverting happens in reverse order, either
//! explicitly through [`RestorationGuard::restore`] or in `Drop`, so an
//! early `?` return or a dropped future still leaves the page as it was.

use std::fmt;

use crate::host::CaptureHost;
use crate::types::HostError;

/// One recorded mutation.
enum Entry<N, C> {
    /// An inline style property and the value it had before capture.
    Style {
        node: N,
        property: String,
        original: String,
    },
    /// A temporary container mounted for capture.
    Container(C),
}

/// Ordered log of live mutations, reverted last-in first-out.
pub struct RestorationRecord<N, C> {
    entries: Vec<Entry<N, C>>,
}

impl<N, C> RestorationRecord<N, C> {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of entries not yet reverted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether every entry has been reverted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of style entries not yet reverted.
    #[must_use]
    pub fn style_entries(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Style { .. }))
            .count()
    }

    /// Number of containers not yet removed.
    #[must_use]
    pub fn containers(&self) -> usize {
        self.entries.len() - self.style_entries()
    }
}

impl<N, C> fmt::Debug for RestorationRecord<N, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestorationRecord")
            .field("styles", &self.style_entries())
            .field("containers", &self.containers())
            .finish()
    }
}

/// Outcome of reverting a [`RestorationRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Style entries written back.
    pub styles_reverted: usize,
    /// Temporary containers removed.
    pub containers_removed: usize,
    /// Entries whose revert failed. Failures are logged, never raised.
    pub failures: usize,
}

impl RestoreReport {
    /// Total entries processed, successful or not.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.styles_reverted + self.containers_removed + self.failures
    }

    fn merge(&mut self, other: Self) {
        self.styles_reverted += other.styles_reverted;
        self.containers_removed += other.containers_removed;
        self.failures += other.failures;
    }
}

/// Exclusive owner of the live-DOM mutations made during one capture.
pub struct RestorationGuard<'h, H: CaptureHost> {
    host: &'h H,
    record: RestorationRecord<H::Node, H::Container>,
    report: RestoreReport,
}

impl<'h, H: CaptureHost> RestorationGuard<'h, H> {
    /// Start an empty record against `host`.
    #[must_use]
    pub const fn new(host: &'h H) -> Self {
        Self {
            host,
            record: RestorationRecord::new(),
            report: RestoreReport {
                styles_reverted: 0,
                containers_removed: 0,
                failures: 0,
            },
        }
    }

    /// The host this guard mutates.
    #[must_use]
    pub const fn host(&self) -> &'h H {
        self.host
    }

    /// Mutations still pending reversal.
    #[must_use]
    pub const fn record(&self) -> &RestorationRecord<H::Node, H::Container> {
        &self.record
    }

    /// Record the current inline value of `property` on `node`, then
    /// overwrite it with `value`.
    ///
    /// # Errors
    ///
    /// Returns the host's error if the write is rejected. The original
    /// value stays recorded, so reverting is still safe.
    pub fn set_style(
        &mut self,
        node: &H::Node,
        property: &str,
        value: &str,
    ) -> Result<(), HostError> {
        let original = self.host.inline_style(node, property);
        self.record.entries.push(Entry::Style {
            node: node.clone(),
            property: property.to_owned(),
            original,
        });
        self.host.set_inline_style(node, property, value)
    }

    /// Hide `node` with `display: none`.
    ///
    /// # Errors
    ///
    /// See [`set_style`](Self::set_style).
    pub fn hide(&mut self, node: &H::Node) -> Result<(), HostError> {
        self.set_style(node, crate::host::style::DISPLAY, "none")
    }

    /// Take ownership of a temporary container so it is removed on
    /// restore.
    pub fn adopt_container(&mut self, container: H::Container) {
        self.record.entries.push(Entry::Container(container));
    }

    /// Revert every pending entry now and report what happened.
    ///
    /// Also covers anything reverted by earlier calls, so the report
    /// describes the guard's whole lifetime.
    pub fn restore(mut self) -> RestoreReport {
        self.revert_pending();
        self.report
    }

    fn revert_pending(&mut self) {
        let mut pass = RestoreReport::default();
        while let Some(entry) = self.record.entries.pop() {
            let result = match entry {
                Entry::Style {
                    node,
                    property,
                    original,
                } => self
                    .host
                    .set_inline_style(&node, &property, &original)
                    .map(|()| pass.styles_reverted += 1)
                    .map_err(|e| format!("{property}: {e}")),
                Entry::Container(container) => self
                    .host
                    .unmount(container)
                    .map(|()| pass.containers_removed += 1)
                    .map_err(|e| format!("container: {e}")),
            };
            if let Err(msg) = result {
                pass.failures += 1;
                log::error!("failed to restore {msg}");
            }
        }
        if pass.total() > 0 {
            log::debug!(
                "restored {} styles, removed {} containers, {} failures",
                pass.styles_reverted,
                pass.containers_removed,
                pass.failures
            );
        }
        self.report.merge(pass);
    }
}

impl<H: CaptureHost> Drop for RestorationGuard<'_, H> {
    fn drop(&mut self) {
        self.revert_pending();
    }
}

impl<H: CaptureHost> fmt::Debug for RestorationGuard<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestorationGuard")
            .field("record", &self.record)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::style;
    use crate::testing::FakeHost;
    use crate::types::Dimensions;

    #[test]
    fn restore_reverts_in_reverse_order() {
        let host = FakeHost::new();
        let node = host.append(&host.body(), "div.panel");
        host.set_inline_style(&node, style::DISPLAY, "flex").unwrap();

        let mut guard = RestorationGuard::new(&host);
        guard.set_style(&node, style::DISPLAY, "block").unwrap();
        guard.hide(&node).unwrap();
        assert_eq!(host.inline_style(&node, style::DISPLAY), "none");

        let report = guard.restore();
        assert_eq!(host.inline_style(&node, style::DISPLAY), "flex");
        assert_eq!(report.styles_reverted, 2);
        assert_eq!(report.failures, 0);
    }

    #[test]
    fn unset_properties_are_removed_again() {
        let host = FakeHost::new();
        let node = host.append(&host.body(), "div");
        let mut guard = RestorationGuard::new(&host);
        guard.set_style(&node, style::OVERFLOW, "visible").unwrap();
        drop(guard);
        assert_eq!(host.inline_style(&node, style::OVERFLOW), "");
    }

    #[test]
    fn drop_restores_and_removes_containers() {
        let host = FakeHost::new();
        let node = host.append(&host.body(), "section");
        let clone = host.deep_clone(&node).unwrap();
        {
            let mut guard = RestorationGuard::new(&host);
            guard.hide(&node).unwrap();
            let container = host
                .mount_offscreen(&clone, Dimensions::new(800, 600))
                .unwrap();
            guard.adopt_container(container);
            assert_eq!(guard.record().containers(), 1);
            assert_eq!(host.live_containers(), 1);
        }
        assert_eq!(host.live_containers(), 0);
        assert_eq!(host.inline_style(&node, style::DISPLAY), "");
    }

    #[test]
    fn restore_is_idempotent() {
        let host = FakeHost::new();
        let node = host.append(&host.body(), "div");
        let mut guard = RestorationGuard::new(&host);
        guard.hide(&node).unwrap();
        guard.revert_pending();
        guard.revert_pending();
        let report = guard.restore();
        assert_eq!(report.styles_reverted, 1);
        assert!(report.total() == 1);
    }

    #[test]
    fn revert_failures_are_counted_not_raised() {
        let host = FakeHost::new();
        let a = host.append(&host.body(), "div.a");
        let b = host.append(&host.body(), "div.b");
        let mut guard = RestorationGuard::new(&host);
        guard.hide(&a).unwrap();
        guard.hide(&b).unwrap();
        host.reject_styles(&a);

        let report = guard.restore();
        assert_eq!(report.styles_reverted, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(host.inline_style(&b, style::DISPLAY), "");
    }
}
