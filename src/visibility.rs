//! Viewport visibility tracking driven by per-row intersection observers.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

pub const ROOT_MARGIN_PX: f64 = 100.0;
pub const INTERSECTION_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub u64);

/// Vertical box of a mounted row and of the scroll viewport, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionGeometry {
    pub row_top: f64,
    pub row_height: f64,
    pub viewport_top: f64,
    pub viewport_height: f64,
}

impl IntersectionGeometry {
    /// Fraction of the row inside the viewport grown by the root margin.
    pub fn intersection_ratio(&self) -> f64 {
        if self.row_height <= 0.0 {
            return 0.0;
        }
        let root_top = self.viewport_top - ROOT_MARGIN_PX;
        let root_bottom = self.viewport_top + self.viewport_height + ROOT_MARGIN_PX;
        let row_bottom = self.row_top + self.row_height;

        let overlap = row_bottom.min(root_bottom) - self.row_top.max(root_top);
        (overlap.max(0.0) / self.row_height).min(1.0)
    }

    pub fn entry(&self) -> IntersectionEntry {
        IntersectionEntry::from_ratio(self.intersection_ratio())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionEntry {
    pub intersection_ratio: f64,
    pub is_intersecting: bool,
}

impl IntersectionEntry {
    pub fn from_ratio(ratio: f64) -> Self {
        Self {
            intersection_ratio: ratio,
            is_intersecting: ratio >= INTERSECTION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VisibilityTracker {
    observers: HashMap<ObserverId, String>,
    visible: BTreeSet<String>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self) -> &BTreeSet<String> {
        &self.visible
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Attaches an observer for a mounted row. Re-observing an id rebinds it.
    pub fn observe(&mut self, id: ObserverId, pair_address: impl Into<String>) -> bool {
        let pair_address = pair_address.into();
        match self.observers.insert(id, pair_address.clone()) {
            Some(previous) if previous != pair_address => self.drop_if_unobserved(&previous),
            _ => false,
        }
    }

    /// Applies an observer callback. Reports from unknown or disconnected
    /// observers are ignored.
    pub fn report(&mut self, id: ObserverId, entry: IntersectionEntry) -> bool {
        self.report_within(id, entry, |_| true)
    }

    /// Like [`report`](Self::report), but an entering report only counts when
    /// `admit` accepts the observer's key. Observers of rows evicted from the
    /// table stay bound so the row can come back, they just cannot re-enter
    /// the visible set meanwhile.
    pub fn report_within(
        &mut self,
        id: ObserverId,
        entry: IntersectionEntry,
        admit: impl FnOnce(&str) -> bool,
    ) -> bool {
        let Some(pair_address) = self.observers.get(&id) else {
            return false;
        };
        if entry.is_intersecting {
            if !admit(pair_address) {
                return false;
            }
            self.visible.insert(pair_address.clone())
        } else {
            self.visible.remove(pair_address)
        }
    }

    /// Row unmount. The key leaves the visible set once no observer remains.
    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        match self.observers.remove(&id) {
            Some(pair_address) => self.drop_if_unobserved(&pair_address),
            None => false,
        }
    }

    /// Drops visible keys the predicate rejects; returns the evicted keys.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let evicted: Vec<String> = self
            .visible
            .iter()
            .filter(|key| !keep(key.as_str()))
            .cloned()
            .collect();
        for key in &evicted {
            self.visible.remove(key);
        }
        evicted
    }

    fn drop_if_unobserved(&mut self, pair_address: &str) -> bool {
        let still_observed = self.observers.values().any(|key| key == pair_address);
        !still_observed && self.visible.remove(pair_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter() -> IntersectionEntry {
        IntersectionEntry::from_ratio(1.0)
    }

    fn exit() -> IntersectionEntry {
        IntersectionEntry::from_ratio(0.0)
    }

    #[test]
    fn enter_and_exit_toggle_membership() {
        let mut tracker = VisibilityTracker::new();
        tracker.observe(ObserverId(1), "A");
        tracker.observe(ObserverId(2), "B");

        assert!(tracker.report(ObserverId(1), enter()));
        assert!(tracker.report(ObserverId(2), enter()));
        assert!(!tracker.report(ObserverId(2), enter()));
        assert!(tracker.report(ObserverId(1), exit()));

        assert_eq!(tracker.visible().iter().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn disconnected_observer_stops_reporting_and_releases_key() {
        let mut tracker = VisibilityTracker::new();
        tracker.observe(ObserverId(7), "A");
        tracker.report(ObserverId(7), enter());

        assert!(tracker.disconnect(ObserverId(7)));
        assert!(tracker.visible().is_empty());
        assert!(!tracker.report(ObserverId(7), enter()));
        assert_eq!(tracker.observer_count(), 0);
    }

    #[test]
    fn key_stays_visible_while_another_observer_holds_it() {
        let mut tracker = VisibilityTracker::new();
        tracker.observe(ObserverId(1), "A");
        tracker.observe(ObserverId(2), "A");
        tracker.report(ObserverId(1), enter());

        assert!(!tracker.disconnect(ObserverId(1)));
        assert!(tracker.visible().contains("A"));
    }

    #[test]
    fn ratio_respects_root_margin_and_threshold() {
        // Row sits 50px below the viewport bottom: fully inside the margin.
        let inside_margin = IntersectionGeometry {
            row_top: 650.0,
            row_height: 40.0,
            viewport_top: 0.0,
            viewport_height: 600.0,
        };
        assert_eq!(inside_margin.intersection_ratio(), 1.0);
        assert!(inside_margin.entry().is_intersecting);

        // Only 2px of 40 inside the margin: 5%, below the 10% threshold.
        let sliver = IntersectionGeometry {
            row_top: 698.0,
            ..inside_margin
        };
        assert!(!sliver.entry().is_intersecting);

        let far = IntersectionGeometry {
            row_top: 2_000.0,
            ..inside_margin
        };
        assert_eq!(far.intersection_ratio(), 0.0);
    }

    #[test]
    fn retain_reports_evicted_keys() {
        let mut tracker = VisibilityTracker::new();
        for (id, key) in [(1, "A"), (2, "B"), (3, "C")] {
            tracker.observe(ObserverId(id), key);
            tracker.report(ObserverId(id), enter());
        }

        let evicted = tracker.retain(|key| key != "B");
        assert_eq!(evicted, vec!["B".to_string()]);
        assert_eq!(tracker.visible().len(), 2);
    }

    #[test]
    fn evicted_key_cannot_reenter_through_its_old_observer() {
        let mut tracker = VisibilityTracker::new();
        tracker.observe(ObserverId(1), "A");
        tracker.report(ObserverId(1), enter());
        tracker.retain(|key| key != "A");

        assert!(!tracker.report_within(ObserverId(1), enter(), |key| key != "A"));
        assert!(tracker.visible().is_empty());
        assert_eq!(tracker.observer_count(), 1);

        // Back in the table: the same observer works again.
        assert!(tracker.report_within(ObserverId(1), enter(), |_| true));
        assert!(tracker.report_within(ObserverId(1), exit(), |_| false));
    }
}
