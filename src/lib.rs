//! Pair scanner core crate.
//!
//! Two paginated token-pair tables (trending and new) fed by the scanner REST
//! endpoint, kept live over one shared WebSocket stream, and served as an
//! HTML/JSON dashboard.

mod chain;
mod config;
mod connection;
mod dashboard;
mod filter;
mod format;
mod observability;
mod paginator;
mod profile;
mod reducer;
mod row;
mod runtime;
mod scanner_api;
mod stream;
mod subscription;
mod table;
mod visibility;
mod ws;

pub use chain::{chain_from_id, parse_chain, Chain, ChainError, ALL_CHAINS};
pub use config::{
    scanner_config_from_env, ConfigError, ScannerConfig, DEFAULT_API_BASE_URL,
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_WS_URL,
};
pub use connection::{
    ConnectionState, FrameSink, ResubscribePolicy, StreamConnection, StreamError, StreamTransport,
};
pub use dashboard::{
    build_display_snapshot, build_table_view, dashboard_router, format_row_for_display,
    render_dashboard_html, table_title, AuditFlags, DashboardRow, DashboardSnapshot,
    DashboardSnapshotSource, DashboardTable, InMemorySnapshotSource, RowReport, SocialLinks,
    SortRequest, StreamView, DASHBOARD_HEADERS, DASHBOARD_SORT_KEYS,
};
pub use filter::{apply_filters, FilterCriteria, FilterUpdate};
pub use format::{
    format_age, format_count, format_delta, format_large_number, format_large_str, format_price,
    format_tax, txn_ratio,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_stream_selected, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError, StreamSelection,
};
pub use paginator::{PageCache, ScrollPosition, SCROLL_PROXIMITY_PX};
pub use profile::{
    parse_profile, OrderBy, ProfileKind, QueryProfile, RankBy, SortColumn, SortState,
    UnknownProfile, ALL_PROFILES,
};
pub use reducer::{apply_pair_stats, apply_tick, reduce, replace_snapshot, ReduceOutcome};
pub use row::{
    effective_market_cap, format_decimal, normalize, normalize_rows, parse_numeric, RowSet,
    ScannerRow,
};
pub use runtime::{
    ControlCommand, ControlError, DashboardControl, DashboardRuntime, FetchResult, RuntimeEvent,
};
pub use scanner_api::{
    decode_scanner_page, scanner_url, FetchError, ReqwestScannerApi, ScannerApi, ScannerPage,
};
pub use stream::{
    decode_inbound, InboundEvent, OutboundMessage, PairStats, PairStatsPayload,
    ScannerFilterParams, ScannerPairsPayload, ScannerPairsResults, SnapshotFilter,
    StreamDecodeError, SubscriptionTarget, Swap, TickPair, TickPayload,
};
pub use subscription::{
    scanner_filter_for, subscription_target, ReconcileReport, SubscriptionManager,
};
pub use table::{StepOutcome, TableInput, TableState, TableStatus};
pub use visibility::{
    IntersectionEntry, IntersectionGeometry, ObserverId, VisibilityTracker,
    INTERSECTION_THRESHOLD, ROOT_MARGIN_PX,
};
#[cfg(feature = "stream")]
pub use ws::spawn_stream_driver;
pub use ws::StreamSignal;
