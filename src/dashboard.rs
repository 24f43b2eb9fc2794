//! Dashboard snapshot types, HTML rendering and HTTP routes.

use std::sync::{Arc, RwLock};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::{chain_from_id, ALL_CHAINS};
use crate::connection::ConnectionState;
use crate::filter::FilterCriteria;
use crate::format::{
    format_age, format_count, format_delta, format_large_str, format_price, format_tax, txn_ratio,
};
use crate::paginator::ScrollPosition;
use crate::profile::{parse_profile, ProfileKind, SortColumn, SortState};
use crate::row::ScannerRow;
use crate::runtime::{ControlCommand, ControlError, DashboardControl};
use crate::table::{TableInput, TableState, TableStatus};
use crate::visibility::{
    IntersectionEntry, IntersectionGeometry, ObserverId, INTERSECTION_THRESHOLD, ROOT_MARGIN_PX,
};

pub const DASHBOARD_HEADERS: [&str; 13] = [
    "Token",
    "Price",
    "Age",
    "Volume",
    "Transactions",
    "Tax",
    "Marketcap",
    "Liquidity",
    "5M",
    "1H",
    "6H",
    "24H",
    "Audit",
];

/// Sort column behind each header; `None` for unsortable columns.
pub const DASHBOARD_SORT_KEYS: [Option<SortColumn>; 13] = [
    Some(SortColumn::Token),
    Some(SortColumn::Price),
    Some(SortColumn::Age),
    Some(SortColumn::Volume),
    Some(SortColumn::Txns),
    None,
    Some(SortColumn::MarketCap),
    Some(SortColumn::Liquidity),
    Some(SortColumn::Diff5m),
    Some(SortColumn::Diff1h),
    Some(SortColumn::Diff6h),
    Some(SortColumn::Diff24h),
    None,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFlags {
    pub verified: bool,
    pub renounced: bool,
    pub mintable: bool,
    pub freezable: bool,
    pub burned: bool,
    pub honeypot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLinks {
    pub discord: Option<String>,
    pub telegram: Option<String>,
    pub twitter: Option<String>,
    pub web: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRow {
    pub pair_address: String,
    pub chain: String,
    pub token_symbol: String,
    pub quote_symbol: String,
    pub token_name: String,
    pub image_uri: Option<String>,
    pub price: String,
    pub age: String,
    pub volume: String,
    pub txns: String,
    pub buys: String,
    pub sells: String,
    pub buy_share: Option<f64>,
    pub sell_share: Option<f64>,
    pub tax: String,
    pub market_cap: String,
    pub liquidity: String,
    pub diff_5m: String,
    pub diff_1h: String,
    pub diff_6h: String,
    pub diff_24h: String,
    pub audit: AuditFlags,
    pub links: SocialLinks,
    pub visible: bool,
    pub subscribed: bool,
}

impl DashboardRow {
    pub fn to_cell_text_values(&self) -> Vec<String> {
        vec![
            format!("{}/{}", self.token_symbol, self.quote_symbol),
            self.price.clone(),
            self.age.clone(),
            self.volume.clone(),
            format!("{} ({}/{})", self.txns, self.buys, self.sells),
            self.tax.clone(),
            self.market_cap.clone(),
            self.liquidity.clone(),
            self.diff_5m.clone(),
            self.diff_1h.clone(),
            self.diff_6h.clone(),
            self.diff_24h.clone(),
            audit_summary(&self.audit),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTable {
    pub profile: ProfileKind,
    pub title: String,
    pub status: TableStatus,
    pub filters: FilterCriteria,
    pub rows: Vec<DashboardRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamView {
    pub state: ConnectionState,
    pub enabled: bool,
    pub active_subscriptions: usize,
}

impl Default for StreamView {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            enabled: false,
            active_subscriptions: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub generated_at: String,
    pub stream: StreamView,
    pub tables: Vec<DashboardTable>,
}

impl DashboardSnapshot {
    pub fn table(&self, profile: ProfileKind) -> Option<&DashboardTable> {
        self.tables.iter().find(|table| table.profile == profile)
    }
}

pub fn table_title(profile: ProfileKind) -> &'static str {
    match profile {
        ProfileKind::Trending => "Trending Tokens",
        ProfileKind::New => "New Tokens",
    }
}

pub fn format_row_for_display(
    row: &ScannerRow,
    visible: bool,
    subscribed: bool,
    now: DateTime<Utc>,
) -> DashboardRow {
    let (buy_share, sell_share) = match txn_ratio(row) {
        Some((buy, sell)) => (Some(buy), Some(sell)),
        None => (None, None),
    };

    DashboardRow {
        pair_address: row.pair_address.clone(),
        chain: chain_from_id(row.chain_id)
            .map(|chain| chain.as_str().to_string())
            .unwrap_or_else(|_| format!("#{}", row.chain_id)),
        token_symbol: row.token1_symbol.clone(),
        quote_symbol: row.token0_symbol.clone(),
        token_name: row.token1_name.clone(),
        image_uri: row.token1_image_uri.clone(),
        price: format_price(&row.price),
        age: format_age(row, now),
        volume: format_large_str(&row.volume, "$"),
        txns: format_count(row.txns),
        buys: format_count(row.buys),
        sells: format_count(row.sells),
        buy_share,
        sell_share,
        tax: format_tax(&row.buy_fee, &row.sell_fee),
        market_cap: format_large_str(&row.current_mcap, "$"),
        liquidity: format_large_str(&row.liquidity, "$"),
        diff_5m: format_delta(&row.diff_5m),
        diff_1h: format_delta(&row.diff_1h),
        diff_6h: format_delta(&row.diff_6h),
        diff_24h: format_delta(&row.diff_24h),
        audit: AuditFlags {
            verified: row.contract_verified.unwrap_or(false),
            renounced: row.contract_renounced.unwrap_or(false),
            mintable: row.mintable.unwrap_or(false),
            freezable: row.freezable.unwrap_or(false),
            burned: row.burned.unwrap_or(false),
            honeypot: row.is_honeypot(),
        },
        links: SocialLinks {
            discord: row.discord_link.clone(),
            telegram: row.telegram_link.clone(),
            twitter: row.twitter_link.clone(),
            web: row.web_link.clone(),
        },
        visible,
        subscribed,
    }
}

pub fn build_table_view(table: &TableState, now: DateTime<Utc>) -> DashboardTable {
    let profile = table.profile().kind;
    let rows = table
        .sorted_rows()
        .into_iter()
        .map(|row| {
            format_row_for_display(
                row,
                table.visible().contains(&row.pair_address),
                table.subscribed().contains(&row.pair_address),
                now,
            )
        })
        .collect();

    DashboardTable {
        profile,
        title: table_title(profile).to_string(),
        status: table.status(),
        filters: table.filters().clone(),
        rows,
    }
}

pub fn build_display_snapshot(
    tables: &[TableState],
    stream: StreamView,
    now: DateTime<Utc>,
) -> DashboardSnapshot {
    DashboardSnapshot {
        generated_at: now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        stream,
        tables: tables
            .iter()
            .map(|table| build_table_view(table, now))
            .collect(),
    }
}

pub trait DashboardSnapshotSource: Send + Sync + 'static {
    fn snapshot(&self) -> DashboardSnapshot;
}

/// Last published snapshot, shared between the runtime and the HTTP routes.
#[derive(Clone, Default)]
pub struct InMemorySnapshotSource {
    inner: Arc<RwLock<DashboardSnapshot>>,
}

impl InMemorySnapshotSource {
    pub fn new(snapshot: DashboardSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn replace_snapshot(&self, snapshot: DashboardSnapshot) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot;
    }
}

impl DashboardSnapshotSource for InMemorySnapshotSource {
    fn snapshot(&self) -> DashboardSnapshot {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// One visibility report from a rendered row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RowReport {
    #[serde(rename_all = "camelCase")]
    Mounted { observer: u64, pair_address: String },
    Intersection {
        observer: u64,
        entry: IntersectionEntry,
    },
    Geometry {
        observer: u64,
        geometry: IntersectionGeometry,
    },
    Unmounted { observer: u64 },
}

impl RowReport {
    pub fn into_input(self) -> TableInput {
        match self {
            Self::Mounted {
                observer,
                pair_address,
            } => TableInput::RowMounted {
                observer: ObserverId(observer),
                pair_address,
            },
            Self::Intersection { observer, entry } => TableInput::Intersection {
                observer: ObserverId(observer),
                entry,
            },
            Self::Geometry { observer, geometry } => TableInput::Intersection {
                observer: ObserverId(observer),
                entry: geometry.entry(),
            },
            Self::Unmounted { observer } => TableInput::RowUnmounted {
                observer: ObserverId(observer),
            },
        }
    }
}

/// `column` alone toggles; `column` with `desc` sets; neither clears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortRequest {
    #[serde(default)]
    pub column: Option<SortColumn>,
    #[serde(default)]
    pub desc: Option<bool>,
}

impl SortRequest {
    pub fn into_input(self) -> TableInput {
        match (self.column, self.desc) {
            (Some(column), Some(desc)) => TableInput::SetSort(Some(SortState { column, desc })),
            (Some(column), None) => TableInput::ToggleSort(column),
            (None, _) => TableInput::SetSort(None),
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::UnknownProfile(_) => StatusCode::NOT_FOUND,
            ControlError::RuntimeStopped => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn dashboard_router(
    source: Arc<dyn DashboardSnapshotSource>,
    control: Arc<dyn DashboardControl>,
) -> Router {
    Router::new()
        .route("/dashboard", get(get_dashboard_html))
        .route("/dashboard/snapshot", get(get_dashboard_snapshot))
        .route("/dashboard/stream/reconnect", post(post_stream_reconnect))
        .route("/dashboard/{profile}/filters", post(post_filters))
        .route("/dashboard/{profile}/filters/clear", post(post_clear_filters))
        .route("/dashboard/{profile}/rows", post(post_rows))
        .route("/dashboard/{profile}/scroll", post(post_scroll))
        .route("/dashboard/{profile}/sort", post(post_sort))
        .route("/dashboard/{profile}/retry", post(post_retry))
        .with_state(DashboardAppState { source, control })
}

pub fn render_dashboard_html(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Pair Scanner</title>\n");
    out.push_str("<style>:root{--bg:#101214;--card:#171a1d;--ink:#e8ecef;--muted:#8a949c;--line:#2a2f34;--head:#22262b;--up:#22c55e;--down:#ef4444;--ok:#2dd4bf}*{box-sizing:border-box}body{margin:0;color:var(--ink);background:var(--bg);font-family:\"Inter\",\"Segoe UI\",sans-serif}.shell{max-width:1600px;margin:0 auto;padding:18px}.hero{display:flex;gap:16px;align-items:baseline;flex-wrap:wrap}.hero h1{margin:0;font-size:1.4rem}.hero-meta{display:flex;gap:14px;color:var(--muted);font-size:.85rem}.card{margin-top:16px;background:var(--card);border:1px solid var(--line);border-radius:12px;overflow:hidden}.card-head{display:flex;justify-content:space-between;padding:10px 14px;border-bottom:1px solid var(--line)}.card-head h2{margin:0;font-size:1.1rem}.status{color:var(--muted);font-size:.82rem}.status.error{color:var(--down)}.table-wrap{overflow:auto;max-height:70vh}table{width:100%;border-collapse:collapse;min-width:1300px}thead th{position:sticky;top:0;background:var(--head);font-size:.8rem;padding:8px;border-bottom:1px solid var(--line);cursor:pointer;white-space:nowrap}tbody td{font-size:.84rem;padding:7px 8px;border-bottom:1px solid var(--line);white-space:nowrap;text-align:center}.token{text-align:left}.up{color:var(--up)}.down{color:var(--down)}.flat{color:var(--muted)}.live{box-shadow:inset 3px 0 0 var(--ok)}.flag{display:inline-block;width:10px;height:10px;border-radius:50%;margin:0 2px;background:var(--down)}.flag.on{background:var(--ok)}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");
    out.push_str("<section class=\"hero\"><h1>Pair Scanner</h1><div class=\"hero-meta\">");
    out.push_str(&format!(
        "<span>Stream: {}</span>",
        escape_html(&stream_label(&snapshot.stream))
    ));
    out.push_str(&format!(
        "<span>Subscriptions: {}</span>",
        snapshot.stream.active_subscriptions
    ));
    out.push_str(&format!(
        "<span>Generated: {}</span>",
        escape_html(&snapshot.generated_at)
    ));
    out.push_str(&format!(
        "<span>Chains: {}</span>",
        ALL_CHAINS
            .iter()
            .map(|chain| chain.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    out.push_str("</div></section>\n");

    for table in &snapshot.tables {
        render_table(&mut out, table);
    }

    out.push_str(&client_script());
    out.push_str("</main></body></html>\n");
    out
}

fn render_table(out: &mut String, table: &DashboardTable) {
    let profile = table.profile.as_str();
    out.push_str(&format!(
        "<section class=\"card\" data-profile=\"{profile}\"><div class=\"card-head\"><h2>{}</h2>",
        escape_html(&table.title)
    ));
    out.push_str(&format!(
        "<span class=\"status\">{} / {} rows",
        table.status.row_count,
        table.status.total_rows.unwrap_or(0)
    ));
    if table.status.active_filters > 0 {
        out.push_str(&format!(" &middot; {} active", table.status.active_filters));
    }
    out.push_str("</span></div>\n");

    if let Some(error) = &table.status.error {
        out.push_str(&format!(
            "<div class=\"status error\">Error loading data: {}</div>",
            escape_html(error)
        ));
    } else if table.status.loading {
        out.push_str("<div class=\"status\">Loading scanner data...</div>");
    }

    out.push_str("<div class=\"table-wrap\"><table><thead><tr>");
    for (idx, header) in DASHBOARD_HEADERS.iter().enumerate() {
        let marker = match (DASHBOARD_SORT_KEYS[idx], table.status.sort) {
            (Some(column), Some(sort)) if sort.column == column => {
                if sort.desc {
                    " &#9660;"
                } else {
                    " &#9650;"
                }
            }
            _ => "",
        };
        let sort_attr = DASHBOARD_SORT_KEYS[idx]
            .and_then(|column| serde_json::to_string(&column).ok())
            .map(|json| format!(" data-sort='{}'", escape_html(&json)))
            .unwrap_or_default();
        out.push_str(&format!(
            "<th{sort_attr}>{}{marker}</th>",
            escape_html(header)
        ));
    }
    out.push_str("</tr></thead><tbody>\n");

    for row in &table.rows {
        let values = row.to_cell_text_values();
        let class = if row.subscribed { " class=\"live\"" } else { "" };
        out.push_str(&format!(
            "<tr data-pair=\"{}\"{class}>",
            escape_html(&row.pair_address)
        ));
        out.push_str(&format!(
            "<td class=\"token\">{} <small>{}</small></td>",
            escape_html(&values[0]),
            escape_html(&row.chain)
        ));
        for (col_idx, value) in values.iter().enumerate().skip(1) {
            if col_idx == values.len() - 1 {
                out.push_str("<td>");
                out.push_str(&audit_dots(&row.audit));
                out.push_str("</td>");
                continue;
            }
            let tone = if (8..=11).contains(&col_idx) {
                delta_class(value)
            } else {
                ""
            };
            out.push_str(&format!("<td class=\"{tone}\">"));
            out.push_str(&escape_html(value));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody></table></div></section>\n");
}

fn client_script() -> String {
    format!(
        "<script>(function(){{var seq=Date.now();function post(p,path,body){{return fetch('/dashboard/'+p+path,{{method:'POST',headers:{{'Content-Type':'application/json'}},body:JSON.stringify(body||{{}})}});}}\
document.querySelectorAll('section[data-profile]').forEach(function(card){{var p=card.dataset.profile;var wrap=card.querySelector('.table-wrap');var reports=[];\
var io=new IntersectionObserver(function(entries){{post(p,'/rows',entries.map(function(e){{return {{kind:'intersection',observer:+e.target.dataset.observer,entry:{{intersectionRatio:e.intersectionRatio,isIntersecting:e.intersectionRatio>={threshold}}}}};}}));}},{{root:wrap,rootMargin:'{margin}px',threshold:{threshold}}});\
card.querySelectorAll('tr[data-pair]').forEach(function(tr){{tr.dataset.observer=++seq;reports.push({{kind:'mounted',observer:seq,pairAddress:tr.dataset.pair}});}});\
post(p,'/rows',reports).then(function(){{card.querySelectorAll('tr[data-pair]').forEach(function(tr){{io.observe(tr);}});}});\
window.addEventListener('pagehide',function(){{navigator.sendBeacon('/dashboard/'+p+'/rows',new Blob([JSON.stringify(reports.map(function(r){{return {{kind:'unmounted',observer:r.observer}};}}))],{{type:'application/json'}}));}});\
wrap.addEventListener('scroll',function(){{post(p,'/scroll',{{scrollTop:wrap.scrollTop,clientHeight:wrap.clientHeight,scrollHeight:wrap.scrollHeight}});}});\
card.querySelectorAll('th[data-sort]').forEach(function(th){{th.addEventListener('click',function(){{post(p,'/sort',{{column:JSON.parse(th.dataset.sort)}}).then(function(){{location.reload();}});}});}});}});}})();</script>\n",
        threshold = INTERSECTION_THRESHOLD,
        margin = ROOT_MARGIN_PX,
    )
}

fn stream_label(stream: &StreamView) -> String {
    if !stream.enabled {
        return "disabled".to_string();
    }
    match stream.state {
        ConnectionState::Idle => "idle",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Open => "open",
        ConnectionState::Closed => "closed",
    }
    .to_string()
}

fn delta_class(value: &str) -> &'static str {
    if value.starts_with('+') {
        "up"
    } else if value.starts_with('-') {
        "down"
    } else {
        "flat"
    }
}

fn audit_summary(audit: &AuditFlags) -> String {
    [
        ("verified", audit.verified),
        ("renounced", audit.renounced),
        ("mintable", audit.mintable),
        ("freezable", audit.freezable),
        ("burned", audit.burned),
        ("honeypot", audit.honeypot),
    ]
    .iter()
    .filter(|(_, on)| *on)
    .map(|(label, _)| *label)
    .collect::<Vec<_>>()
    .join(",")
}

fn audit_dots(audit: &AuditFlags) -> String {
    [
        ("Verified", audit.verified),
        ("Renounced", audit.renounced),
        ("Mintable", audit.mintable),
        ("Freezable", audit.freezable),
        ("Burned", audit.burned),
        ("Honeypot", audit.honeypot),
    ]
    .iter()
    .map(|(label, on)| {
        let class = if *on { "flag on" } else { "flag" };
        format!("<span class=\"{class}\" title=\"{label}\"></span>")
    })
    .collect()
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Clone)]
struct DashboardAppState {
    source: Arc<dyn DashboardSnapshotSource>,
    control: Arc<dyn DashboardControl>,
}

impl DashboardAppState {
    fn submit_table(&self, profile: &str, inputs: Vec<TableInput>) -> Result<StatusCode, ControlError> {
        let profile = parse_profile(profile)
            .map_err(|err| ControlError::UnknownProfile(err.0))?;
        let count = inputs.len();
        for input in inputs {
            self.control.submit(ControlCommand::Table { profile, input })?;
        }
        debug!(
            component = "dashboard",
            event = "http.control.accepted",
            profile = profile.as_str(),
            inputs = count
        );
        Ok(StatusCode::ACCEPTED)
    }
}

async fn get_dashboard_html(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let snapshot = state.source.snapshot();
    Html(render_dashboard_html(&snapshot))
}

async fn get_dashboard_snapshot(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let snapshot = state.source.snapshot();
    info!(
        component = "dashboard",
        event = "http.snapshot.request",
        tables = snapshot.tables.len()
    );
    Json(snapshot)
}

async fn post_stream_reconnect(
    State(state): State<DashboardAppState>,
) -> Result<StatusCode, ControlError> {
    state.control.submit(ControlCommand::ReconnectStream)?;
    Ok(StatusCode::ACCEPTED)
}

async fn post_filters(
    State(state): State<DashboardAppState>,
    Path(profile): Path<String>,
    Json(criteria): Json<FilterCriteria>,
) -> Result<StatusCode, ControlError> {
    state.submit_table(&profile, vec![TableInput::SetFilters(criteria)])
}

async fn post_clear_filters(
    State(state): State<DashboardAppState>,
    Path(profile): Path<String>,
) -> Result<StatusCode, ControlError> {
    state.submit_table(&profile, vec![TableInput::ClearFilters])
}

async fn post_rows(
    State(state): State<DashboardAppState>,
    Path(profile): Path<String>,
    Json(reports): Json<Vec<RowReport>>,
) -> Result<StatusCode, ControlError> {
    state.submit_table(
        &profile,
        reports.into_iter().map(RowReport::into_input).collect(),
    )
}

async fn post_scroll(
    State(state): State<DashboardAppState>,
    Path(profile): Path<String>,
    Json(position): Json<ScrollPosition>,
) -> Result<StatusCode, ControlError> {
    state.submit_table(&profile, vec![TableInput::Scrolled(position)])
}

async fn post_sort(
    State(state): State<DashboardAppState>,
    Path(profile): Path<String>,
    Json(request): Json<SortRequest>,
) -> Result<StatusCode, ControlError> {
    state.submit_table(&profile, vec![request.into_input()])
}

async fn post_retry(
    State(state): State<DashboardAppState>,
    Path(profile): Path<String>,
) -> Result<StatusCode, ControlError> {
    state.submit_table(&profile, vec![TableInput::RetryFetch])
}
