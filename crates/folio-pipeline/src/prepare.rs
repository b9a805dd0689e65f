//! Snapshot preparation: isolate the report subtree and force a layout
//! that rasterizes without clipping.
//!
//! Two strategies are supported (see [`PrepareStrategy`]). The detached
//! clone never touches the live report; its only live mutation is the
//! off-screen container it is mounted in. The in-place strategy mutates
//! the live subtree, with every original value held by the
//! [`RestorationGuard`] returned inside [`PreparedSnapshot`].

use std::fmt;

use crate::config::{PrepareConfig, PrepareStrategy};
use crate::host::{style, CaptureHost};
use crate::restore::RestorationGuard;
use crate::types::{Dimensions, HostError, PipelineError};

/// What to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget<N> {
    /// Root of the report subtree, if the caller has one.
    pub root: Option<N>,
    /// Selectors for descendants excluded from the capture.
    pub exclude: Vec<String>,
    /// Minimum forced size, applied per axis.
    pub size_override: Option<Dimensions>,
}

impl<N> CaptureTarget<N> {
    /// Target `root` with no exclusions or overrides.
    #[must_use]
    pub const fn new(root: Option<N>) -> Self {
        Self {
            root,
            exclude: Vec::new(),
            size_override: None,
        }
    }

    /// Add exclusion selectors.
    #[must_use]
    pub fn excluding<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(selectors.into_iter().map(Into::into));
        self
    }

    /// Set the size override.
    #[must_use]
    pub const fn with_size_override(mut self, size: Option<Dimensions>) -> Self {
        self.size_override = size;
        self
    }
}

/// A subtree ready to hand to the rasterizer.
///
/// Dropping it restores the live document.
#[must_use = "dropping a prepared snapshot immediately restores the page"]
pub struct PreparedSnapshot<'h, H: CaptureHost> {
    /// Owner of every live mutation made during preparation.
    pub guard: RestorationGuard<'h, H>,
    /// The node to rasterize: the clone, or the live root in place.
    pub node: H::Node,
    /// Forced layout size in CSS pixels.
    pub size: Dimensions,
    /// Number of excluded nodes removed or hidden.
    pub excluded: usize,
}

impl<H: CaptureHost> fmt::Debug for PreparedSnapshot<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedSnapshot")
            .field("guard", &self.guard)
            .field("size", &self.size)
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}

/// Size the capture is forced to: the largest of the measured scroll
/// size, the caller's override and the configured minimum, per axis.
#[must_use]
pub fn forced_size(scroll: Dimensions, size_override: Option<Dimensions>, min: Dimensions) -> Dimensions {
    scroll.max(size_override.unwrap_or_default()).max(min)
}

fn capture_failure(context: &str, err: &HostError) -> PipelineError {
    PipelineError::CaptureFailure(format!("{context}: {err}"))
}

/// Every node matching any of `selectors`, deduplicated in match order.
fn matching<H: CaptureHost>(
    host: &H,
    root: &H::Node,
    selectors: &[String],
) -> Result<Vec<H::Node>, PipelineError> {
    let mut found: Vec<H::Node> = Vec::new();
    for selector in selectors {
        let nodes = host
            .query_all(root, selector)
            .map_err(|e| capture_failure(&format!("selector {selector:?}"), &e))?;
        for node in nodes {
            if !found.contains(&node) {
                found.push(node);
            }
        }
    }
    Ok(found)
}

/// Strip effects and force a flat, unclipped layout under `root`.
///
/// Writes go through `set` so the in-place strategy can record them.
fn force_layout<H, F>(host: &H, root: &H::Node, size: Dimensions, mut set: F) -> Result<(), HostError>
where
    H: CaptureHost,
    F: FnMut(&H::Node, &str, &str) -> Result<(), HostError>,
{
    for property in style::EFFECTS {
        set(root, property, "none")?;
    }
    set(root, style::WIDTH, &format!("{}px", size.width))?;
    set(root, style::HEIGHT, &format!("{}px", size.height))?;
    set(root, style::MAX_WIDTH, "none")?;
    set(root, style::OVERFLOW, "visible")?;

    for node in host.descendants(root) {
        for property in style::EFFECTS {
            set(&node, property, "none")?;
        }
        set(&node, style::POSITION, "static")?;
        if host.inline_style(&node, style::DISPLAY) != "none" {
            set(&node, style::DISPLAY, "block")?;
        }
    }
    Ok(())
}

/// Prepare `target` for rasterization.
///
/// # Errors
///
/// Returns [`PipelineError::MissingTarget`] if the root is absent or
/// detached; nothing has been touched in that case. Returns
/// [`PipelineError::CaptureFailure`] if a selector is invalid or the
/// host rejects a mutation; anything already changed has been restored
/// by the time the error is returned.
pub fn prepare<'h, H>(
    host: &'h H,
    target: &CaptureTarget<H::Node>,
    config: &PrepareConfig,
) -> Result<PreparedSnapshot<'h, H>, PipelineError>
where
    H: CaptureHost,
{
    let root = target
        .root
        .as_ref()
        .filter(|root| host.is_attached(root))
        .ok_or(PipelineError::MissingTarget)?;

    let scroll = host.scroll_size(root);
    let size = forced_size(
        scroll,
        target.size_override.or(config.size_override),
        config.min_size,
    );
    log::debug!(
        "preparing snapshot ({:?}): scroll size {scroll}, forced to {size}",
        config.strategy
    );

    let mut guard = RestorationGuard::new(host);
    let (node, excluded) = match config.strategy {
        PrepareStrategy::DetachedClone => {
            let clone = host
                .deep_clone(root)
                .map_err(|e| capture_failure("clone", &e))?;
            let drawings = host
                .copy_drawings(root, &clone)
                .map_err(|e| capture_failure("copy drawings", &e))?;
            log::debug!("copied {drawings} drawn surfaces onto the clone");
            let excluded = matching(host, &clone, &target.exclude)?;
            for node in &excluded {
                host.remove(node);
            }
            force_layout(host, &clone, size, |node, property, value| {
                host.set_inline_style(node, property, value)
            })
            .map_err(|e| capture_failure("layout", &e))?;
            let container = host
                .mount_offscreen(&clone, size)
                .map_err(|e| capture_failure("mount", &e))?;
            guard.adopt_container(container);
            (clone, excluded.len())
        }
        PrepareStrategy::InPlace => {
            let excluded = matching(host, root, &target.exclude)?;
            for node in &excluded {
                guard.hide(node).map_err(|e| capture_failure("hide", &e))?;
            }
            force_layout(host, root, size, |node, property, value| {
                guard.set_style(node, property, value)
            })
            .map_err(|e| capture_failure("layout", &e))?;
            (root.clone(), excluded.len())
        }
    };

    Ok(PreparedSnapshot {
        guard,
        node,
        size,
        excluded,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, NodeId};

    /// A report with a header, a filter bar, two buttons and a chart.
    fn report(host: &FakeHost) -> NodeId {
        let root = host.append(&host.body(), "main.report");
        host.set_scroll_size(&root, Dimensions::new(1200, 3000));
        host.append(&root, "div.report-header");
        let filters = host.append(&root, "div.report-filters");
        host.append(&filters, "select");
        host.append(&root, "button");
        host.append(&root, "button.no-print");
        let chart = host.append(&root, "div.chart");
        host.append(&chart, "canvas");
        root
    }

    fn target(root: NodeId) -> CaptureTarget<NodeId> {
        CaptureTarget::new(Some(root)).excluding(["button", ".report-filters"])
    }

    fn in_place() -> PrepareConfig {
        PrepareConfig {
            strategy: PrepareStrategy::InPlace,
            ..PrepareConfig::default()
        }
    }

    #[test]
    fn forced_size_takes_per_axis_maximum() {
        let size = forced_size(
            Dimensions::new(900, 3000),
            Some(Dimensions::new(1000, 0)),
            Dimensions::new(1400, 0),
        );
        assert_eq!(size, Dimensions::new(1400, 3000));
    }

    #[test]
    fn missing_root_fails_without_mutation() {
        let host = FakeHost::new();
        report(&host);
        let err = prepare(&host, &CaptureTarget::new(None), &PrepareConfig::default()).unwrap_err();
        assert_eq!(err, PipelineError::MissingTarget);
        assert_eq!(host.live_mutations(), 0);
    }

    #[test]
    fn detached_root_is_missing() {
        let host = FakeHost::new();
        let orphan = host.detached("main");
        let err = prepare(&host, &CaptureTarget::new(Some(orphan)), &in_place()).unwrap_err();
        assert_eq!(err, PipelineError::MissingTarget);
        assert_eq!(host.live_mutations(), 0);
    }

    #[test]
    fn clone_strategy_leaves_live_report_untouched() {
        let host = FakeHost::new();
        let root = report(&host);
        let before = host.subtree_styles(&host.body());

        let snapshot = prepare(&host, &target(root), &PrepareConfig::default()).unwrap();
        assert_ne!(snapshot.node, root);
        assert_eq!(snapshot.size, Dimensions::new(1400, 3000));
        assert_eq!(snapshot.excluded, 3);
        assert_eq!(host.live_containers(), 1);
        // Only the container is new; the report itself is unchanged.
        assert_eq!(host.subtree_styles(&root).len(), before.len() - 1);
        assert!(host
            .subtree_styles(&root)
            .iter()
            .all(|(id, styles)| before.get(id) == Some(styles)));

        let clone = snapshot.node;
        assert_eq!(host.query_all(&clone, "button").unwrap().len(), 0);
        assert_eq!(host.query_all(&clone, "canvas").unwrap().len(), 1);
        assert_eq!(host.inline_style(&clone, style::WIDTH), "1400px");
        assert_eq!(host.inline_style(&clone, style::OVERFLOW), "visible");

        let report = snapshot.guard.restore();
        assert_eq!(report.containers_removed, 1);
        assert_eq!(host.live_containers(), 0);
        assert_eq!(host.subtree_styles(&host.body()), before);
    }

    #[test]
    fn clone_keeps_drawn_chart_contents() {
        let host = FakeHost::new();
        let root = report(&host);
        let second = host.append(&root, "canvas");
        let first = host.query_all(&root, "canvas").unwrap()[0];
        host.paint(&first, "bar chart");
        host.paint(&second, "pie chart");

        let snapshot = prepare(&host, &target(root), &PrepareConfig::default()).unwrap();
        let drawn: Vec<_> = host
            .query_all(&snapshot.node, "canvas")
            .unwrap()
            .iter()
            .map(|canvas| host.drawing(canvas))
            .collect();
        assert_eq!(
            drawn,
            [Some("bar chart".to_owned()), Some("pie chart".to_owned())]
        );
        assert_eq!(host.drawing(&first).as_deref(), Some("bar chart"));
    }

    #[test]
    fn snapshot_debug_shows_size_and_exclusions() {
        let host = FakeHost::new();
        let root = report(&host);
        let snapshot = prepare(&host, &target(root), &PrepareConfig::default()).unwrap();
        let shown = format!("{snapshot:?}");
        assert!(shown.starts_with("PreparedSnapshot"));
        assert!(shown.contains("excluded: 3"));
    }

    #[test]
    fn in_place_strategy_records_and_reverts_everything() {
        let host = FakeHost::new();
        let root = report(&host);
        let header = host.query_all(&root, ".report-header").unwrap()[0];
        host.set_inline_style(&header, style::DISPLAY, "flex").unwrap();
        let before = host.subtree_styles(&host.body());

        let snapshot = prepare(&host, &target(root), &in_place()).unwrap();
        assert_eq!(snapshot.node, root);
        assert_eq!(snapshot.excluded, 3);
        for button in host.query_all(&root, "button").unwrap() {
            assert_eq!(host.inline_style(&button, style::DISPLAY), "none");
        }
        assert_eq!(host.inline_style(&header, style::DISPLAY), "block");
        assert_eq!(host.inline_style(&header, style::POSITION), "static");
        assert_eq!(host.inline_style(&root, style::FILTER), "none");

        drop(snapshot);
        assert_eq!(host.subtree_styles(&host.body()), before);
    }

    #[test]
    fn invalid_selector_restores_before_failing() {
        let host = FakeHost::new();
        let root = report(&host);
        let before = host.subtree_styles(&host.body());
        let bad = CaptureTarget::new(Some(root)).excluding(["button", "[[nope"]);

        let err = prepare(&host, &bad, &in_place()).unwrap_err();
        assert!(matches!(err, PipelineError::CaptureFailure(_)));
        assert_eq!(host.subtree_styles(&host.body()), before);
        assert_eq!(host.live_containers(), 0);
    }

    #[test]
    fn hidden_descendants_stay_hidden() {
        let host = FakeHost::new();
        let root = report(&host);
        let snapshot = prepare(&host, &target(root), &in_place()).unwrap();
        let select = host.query_all(&root, "select").unwrap()[0];
        let filters = host.query_all(&root, ".report-filters").unwrap()[0];
        assert_eq!(host.inline_style(&filters, style::DISPLAY), "none");
        // Inside a hidden subtree, so forcing it to block is harmless.
        assert_eq!(host.inline_style(&select, style::DISPLAY), "block");
        drop(snapshot);
    }
}
