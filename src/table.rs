//! Table state core: one profile's pages, filters, canonical rows, visibility
//! and subscriptions, advanced by an explicit step function.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::StreamTransport;
use crate::filter::{apply_filters, FilterCriteria, FilterUpdate};
use crate::paginator::{PageCache, ScrollPosition};
use crate::profile::{QueryProfile, SortColumn, SortState};
use crate::reducer::{reduce, ReduceOutcome};
use crate::row::{normalize_rows, parse_numeric, RowSet, ScannerRow};
use crate::scanner_api::{FetchError, ScannerPage};
use crate::stream::{InboundEvent, ScannerFilterParams, SnapshotFilter};
use crate::subscription::{ReconcileReport, SubscriptionManager};
use crate::visibility::{IntersectionEntry, ObserverId, VisibilityTracker};

#[derive(Debug, Clone, PartialEq)]
pub enum TableInput {
    PageLoaded(ScannerPage),
    PageFailed { page_index: u32, error: FetchError },
    SetFilters(FilterCriteria),
    UpdateFilter(FilterUpdate),
    ClearFilters,
    RowMounted { observer: ObserverId, pair_address: String },
    Intersection { observer: ObserverId, entry: IntersectionEntry },
    RowUnmounted { observer: ObserverId },
    Scrolled(ScrollPosition),
    Stream(InboundEvent),
    RetryFetch,
    /// Header click: cycles first direction, opposite direction, unsorted.
    ToggleSort(SortColumn),
    SetSort(Option<SortState>),
    /// The shared connection opened. `resync` forgets the subscribed set so
    /// visible rows are subscribed again.
    StreamOpened { resync: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Page index the caller should fetch next.
    pub fetch_page: Option<u32>,
    pub changed: bool,
    pub subscriptions: ReconcileReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatus {
    pub loading: bool,
    pub fetching_next: bool,
    pub error: Option<String>,
    pub has_more: bool,
    pub total_rows: Option<u64>,
    pub loaded_rows: usize,
    pub row_count: usize,
    pub visible_count: usize,
    pub subscribed_count: usize,
    pub active_filters: usize,
    pub sort: Option<SortState>,
}

#[derive(Debug, Clone)]
pub struct TableState {
    profile: QueryProfile,
    pages: PageCache,
    filters: FilterCriteria,
    rows: RowSet,
    visibility: VisibilityTracker,
    subscriptions: SubscriptionManager,
    sort: Option<SortState>,
    live_priced: HashSet<String>,
    live_audited: HashSet<String>,
    last_scanner_filter: Option<ScannerFilterParams>,
}

impl TableState {
    pub fn new(profile: QueryProfile) -> Self {
        let sort = profile.default_sort;
        Self {
            profile,
            pages: PageCache::new(),
            filters: FilterCriteria::default(),
            rows: RowSet::default(),
            visibility: VisibilityTracker::new(),
            subscriptions: SubscriptionManager::new(),
            sort,
            live_priced: HashSet::new(),
            live_audited: HashSet::new(),
            last_scanner_filter: None,
        }
    }

    pub fn profile(&self) -> &QueryProfile {
        &self.profile
    }

    pub fn pages(&self) -> &PageCache {
        &self.pages
    }

    pub fn filters(&self) -> &FilterCriteria {
        &self.filters
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn visible(&self) -> &BTreeSet<String> {
        self.visibility.visible()
    }

    pub fn subscribed(&self) -> &BTreeSet<String> {
        self.subscriptions.subscribed()
    }

    pub fn sort(&self) -> Option<SortState> {
        self.sort
    }

    pub fn last_scanner_filter(&self) -> Option<&ScannerFilterParams> {
        self.last_scanner_filter.as_ref()
    }

    /// Claims the first page. Returns `None` once anything is cached or in
    /// flight.
    pub fn start(&mut self) -> Option<u32> {
        if self.pages.page_count() > 0 {
            return None;
        }
        self.pages.begin_fetch()
    }

    /// Whether a stream snapshot belongs to this table. Unscoped snapshots
    /// go to every table.
    pub fn accepts_snapshot(&self, filter: Option<&SnapshotFilter>) -> bool {
        match (filter, &self.last_scanner_filter) {
            (None, _) => true,
            (Some(filter), Some(issued)) => filter.matches(issued),
            (Some(_), None) => false,
        }
    }

    pub fn step(
        &mut self,
        input: TableInput,
        transport: &mut dyn StreamTransport,
        now: DateTime<Utc>,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        match input {
            TableInput::PageLoaded(page) => {
                self.pages.complete(page);
                outcome.subscriptions = self.rebuild(transport, now);
                outcome.changed = true;
            }
            TableInput::PageFailed { page_index, error } => {
                self.pages.fail(page_index, error);
                outcome.changed = true;
            }
            TableInput::SetFilters(criteria) => {
                self.filters = criteria;
                outcome.subscriptions = self.rebuild(transport, now);
                outcome.changed = true;
            }
            TableInput::UpdateFilter(update) => {
                self.filters.apply_update(update);
                outcome.subscriptions = self.rebuild(transport, now);
                outcome.changed = true;
            }
            TableInput::ClearFilters => {
                self.filters.clear();
                outcome.subscriptions = self.rebuild(transport, now);
                outcome.changed = true;
            }
            TableInput::RowMounted {
                observer,
                pair_address,
            } => {
                if self.visibility.observe(observer, pair_address) {
                    outcome.subscriptions = self.reconcile(transport);
                    outcome.changed = true;
                }
            }
            TableInput::Intersection { observer, entry } => {
                let rows = &self.rows;
                if self
                    .visibility
                    .report_within(observer, entry, |key| rows.contains(key))
                {
                    outcome.subscriptions = self.reconcile(transport);
                    outcome.changed = true;
                }
            }
            TableInput::RowUnmounted { observer } => {
                if self.visibility.disconnect(observer) {
                    outcome.subscriptions = self.reconcile(transport);
                    outcome.changed = true;
                }
            }
            TableInput::Scrolled(position) => {
                if position.near_bottom() {
                    outcome.fetch_page = self.pages.begin_fetch();
                    outcome.changed = outcome.fetch_page.is_some();
                }
            }
            TableInput::Stream(event) => {
                let reduced = reduce(&mut self.rows, &event);
                match &event {
                    InboundEvent::Tick(tick) if reduced.changed => {
                        self.live_priced.insert(tick.pair.pair.clone());
                    }
                    InboundEvent::PairStats(stats)
                        if self.rows.contains(&stats.pair.pair_address) =>
                    {
                        self.live_audited.insert(stats.pair.pair_address.clone());
                    }
                    InboundEvent::ScannerPairs(_) if reduced.changed => {
                        outcome.subscriptions = self.after_replace(&reduced, transport);
                    }
                    _ => {}
                }
                outcome.changed = reduced.changed;
            }
            TableInput::RetryFetch => {
                if self.pages.clear_error() {
                    outcome.fetch_page = self.pages.begin_fetch();
                    outcome.changed = true;
                }
            }
            TableInput::ToggleSort(column) => {
                self.sort = next_sort(self.sort, column);
                outcome.changed = true;
            }
            TableInput::SetSort(sort) => {
                outcome.changed = self.sort != sort;
                self.sort = sort;
            }
            TableInput::StreamOpened { resync } => {
                if resync {
                    self.subscriptions = SubscriptionManager::new();
                }
                if let Some(params) = self
                    .subscriptions
                    .issue_scanner_filter(&self.rows, transport)
                {
                    self.last_scanner_filter = Some(params);
                }
                outcome.subscriptions = self.reconcile(transport);
                outcome.changed = !outcome.subscriptions.is_empty();
            }
        }

        outcome
    }

    /// Re-filter, re-normalize and replace the canonical rows from the page
    /// cache, then run the post-replace steps.
    fn rebuild(&mut self, transport: &mut dyn StreamTransport, now: DateTime<Utc>) -> ReconcileReport {
        let accumulated = self.pages.accumulate();
        let filtered = apply_filters(&accumulated, &self.filters, now);
        let previous = &self.rows;
        let live_priced = &self.live_priced;
        let live_audited = &self.live_audited;

        let next: Vec<ScannerRow> = normalize_rows(filtered)
            .into_iter()
            .map(|mut row| {
                let Some(existing) = previous.get(&row.pair_address) else {
                    return row;
                };
                if live_priced.contains(&row.pair_address) {
                    row.price = existing.price.clone();
                    row.current_mcap = existing.current_mcap.clone();
                }
                if live_audited.contains(&row.pair_address) {
                    carry_audit_flags(&mut row, existing);
                }
                row
            })
            .collect();
        let next = RowSet::from_rows(next);

        let evicted: Vec<ScannerRow> = self
            .rows
            .rows()
            .iter()
            .filter(|row| !next.contains(&row.pair_address))
            .cloned()
            .collect();
        let changed = next != self.rows;
        self.rows = next;

        debug!(
            component = "table",
            event = "table.rebuild",
            profile = self.profile.kind.as_str(),
            accumulated = accumulated.len(),
            rows = self.rows.len(),
            evicted = evicted.len()
        );

        let replaced = ReduceOutcome {
            changed,
            inserted: Vec::new(),
            evicted,
        };
        self.after_replace(&replaced, transport)
    }

    fn after_replace(
        &mut self,
        replaced: &ReduceOutcome,
        transport: &mut dyn StreamTransport,
    ) -> ReconcileReport {
        let rows = &self.rows;
        self.visibility.retain(|key| rows.contains(key));
        self.live_priced.retain(|key| rows.contains(key));
        self.live_audited.retain(|key| rows.contains(key));

        let evicted_keys = replaced.evicted_keys();
        let evicted_rows = RowSet::from_rows(replaced.evicted.iter().cloned());
        let mut report = ReconcileReport {
            unsubscribed: self
                .subscriptions
                .evict(&evicted_keys, &evicted_rows, transport),
            ..ReconcileReport::default()
        };

        if let Some(params) = self
            .subscriptions
            .issue_scanner_filter(&self.rows, transport)
        {
            self.last_scanner_filter = Some(params);
        }

        let pass = self.reconcile(transport);
        report.subscribed.extend(pass.subscribed);
        report.unsubscribed.extend(pass.unsubscribed);
        report.unresolved.extend(pass.unresolved);
        report
    }

    fn reconcile(&mut self, transport: &mut dyn StreamTransport) -> ReconcileReport {
        self.subscriptions
            .reconcile(self.visibility.visible(), &self.rows, transport)
    }

    /// Canonical rows in display order. Stable for equal keys.
    pub fn sorted_rows(&self) -> Vec<&ScannerRow> {
        let mut out: Vec<&ScannerRow> = self.rows.rows().iter().collect();
        if let Some(sort) = self.sort {
            out.sort_by(|a, b| {
                let ordering = compare_rows(a, b, sort.column);
                if sort.desc {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        out
    }

    pub fn status(&self) -> TableStatus {
        TableStatus {
            loading: self.pages.page_count() == 0 && self.pages.is_fetching(),
            fetching_next: self.pages.page_count() > 0 && self.pages.is_fetching(),
            error: self.pages.error().map(ToString::to_string),
            has_more: self.pages.has_more(),
            total_rows: self.pages.total_rows(),
            loaded_rows: self.pages.accumulated_len(),
            row_count: self.rows.len(),
            visible_count: self.visibility.visible().len(),
            subscribed_count: self.subscriptions.subscribed().len(),
            active_filters: self.filters.active_count(),
            sort: self.sort,
        }
    }
}

fn first_direction_desc(column: SortColumn) -> bool {
    column != SortColumn::Token
}

fn next_sort(current: Option<SortState>, column: SortColumn) -> Option<SortState> {
    let first_desc = first_direction_desc(column);
    match current {
        Some(state) if state.column == column && state.desc == first_desc => Some(SortState {
            column,
            desc: !first_desc,
        }),
        Some(state) if state.column == column => None,
        _ => Some(SortState {
            column,
            desc: first_desc,
        }),
    }
}

fn numeric_key(row: &ScannerRow, column: SortColumn) -> f64 {
    match column {
        SortColumn::Price => parse_numeric(&row.price),
        SortColumn::Age => row
            .created_at()
            .map(|created| created.timestamp_millis() as f64)
            .unwrap_or(f64::NEG_INFINITY),
        SortColumn::Volume => parse_numeric(&row.volume),
        SortColumn::Txns => row.txns.unwrap_or(0) as f64,
        SortColumn::MarketCap => parse_numeric(&row.current_mcap),
        SortColumn::Liquidity => parse_numeric(&row.liquidity),
        SortColumn::Diff5m => parse_numeric(&row.diff_5m),
        SortColumn::Diff1h => parse_numeric(&row.diff_1h),
        SortColumn::Diff6h => parse_numeric(&row.diff_6h),
        SortColumn::Diff24h => parse_numeric(&row.diff_24h),
        SortColumn::Token => 0.0,
    }
}

/// Pair-stats flags streamed onto `existing` win over the page values.
fn carry_audit_flags(row: &mut ScannerRow, existing: &ScannerRow) {
    row.contract_verified = existing.contract_verified;
    row.contract_renounced = existing.contract_renounced;
    row.honey_pot = existing.honey_pot;
    row.mintable = existing.mintable;
    row.freezable = existing.freezable;
    row.burned = existing.burned;
}

fn compare_rows(a: &ScannerRow, b: &ScannerRow, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Token => a
            .token1_symbol
            .to_lowercase()
            .cmp(&b.token1_symbol.to_lowercase()),
        _ => numeric_key(a, column).total_cmp(&numeric_key(b, column)),
    }
}
