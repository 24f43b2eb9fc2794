//! Event loop owning both tables and the shared stream connection.
//!
//! HTTP handlers, page fetches and the WebSocket driver all talk to the
//! runtime over channels; only the runtime mutates table state. After every
//! event it publishes a fresh [`DashboardSnapshot`](crate::dashboard::DashboardSnapshot).

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::connection::{StreamConnection, StreamTransport};
use crate::dashboard::{build_display_snapshot, InMemorySnapshotSource, StreamView};
use crate::profile::{ProfileKind, QueryProfile, ALL_PROFILES};
use crate::scanner_api::{FetchError, ScannerApi, ScannerPage};
use crate::stream::{decode_inbound, InboundEvent, ScannerFilterParams, SubscriptionTarget};
use crate::table::{StepOutcome, TableInput, TableState};
use crate::ws::StreamSignal;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Table {
        profile: ProfileKind,
        input: TableInput,
    },
    ReconnectStream,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("dashboard runtime is not running")]
    RuntimeStopped,
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
}

/// Entry point for user actions coming from the HTTP surface.
pub trait DashboardControl: Send + Sync + 'static {
    fn submit(&self, command: ControlCommand) -> Result<(), ControlError>;
}

impl DashboardControl for mpsc::UnboundedSender<ControlCommand> {
    fn submit(&self, command: ControlCommand) -> Result<(), ControlError> {
        self.send(command).map_err(|_| ControlError::RuntimeStopped)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub profile: ProfileKind,
    pub page_index: u32,
    pub result: Result<ScannerPage, FetchError>,
}

#[derive(Debug)]
pub enum RuntimeEvent {
    Control(ControlCommand),
    Fetched(FetchResult),
    Stream(StreamSignal),
}

/// Stand-in transport when streaming is disabled. Nothing is sent and
/// nothing is logged.
struct OfflineTransport;

impl StreamTransport for OfflineTransport {
    fn is_ready(&self) -> bool {
        false
    }
    fn subscribe_pair(&mut self, _target: &SubscriptionTarget) -> bool {
        false
    }
    fn unsubscribe_pair(&mut self, _target: &SubscriptionTarget) -> bool {
        false
    }
    fn subscribe_pair_stats(&mut self, _target: &SubscriptionTarget) -> bool {
        false
    }
    fn unsubscribe_pair_stats(&mut self, _target: &SubscriptionTarget) -> bool {
        false
    }
    fn scanner_filter(&mut self, _params: &ScannerFilterParams) -> bool {
        false
    }
}

pub struct DashboardRuntime {
    tables: Vec<TableState>,
    connection: StreamConnection,
    api: Option<Arc<dyn ScannerApi>>,
    publisher: InMemorySnapshotSource,
    ws_url: Option<String>,
    generation: u64,
    opened_once: bool,
    driver: Option<JoinHandle<()>>,
    control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    fetch_tx: mpsc::UnboundedSender<FetchResult>,
    fetch_rx: mpsc::UnboundedReceiver<FetchResult>,
    stream_tx: mpsc::UnboundedSender<StreamSignal>,
    stream_rx: mpsc::UnboundedReceiver<StreamSignal>,
}

impl DashboardRuntime {
    pub fn new(
        config: &ScannerConfig,
        api: Arc<dyn ScannerApi>,
        publisher: InMemorySnapshotSource,
    ) -> (Self, mpsc::UnboundedSender<ControlCommand>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();

        let ws_url = (cfg!(feature = "stream") && config.stream_enabled)
            .then(|| config.ws_url.clone());

        let runtime = Self {
            tables: ALL_PROFILES
                .iter()
                .map(|kind| TableState::new(QueryProfile::for_kind(*kind)))
                .collect(),
            connection: StreamConnection::new(config.resubscribe),
            api: Some(api),
            publisher,
            ws_url,
            generation: 0,
            opened_once: false,
            driver: None,
            control_rx,
            fetch_tx,
            fetch_rx,
            stream_tx,
            stream_rx,
        };
        (runtime, control_tx)
    }

    pub fn tables(&self) -> &[TableState] {
        &self.tables
    }

    pub fn table(&self, profile: ProfileKind) -> Option<&TableState> {
        self.tables
            .iter()
            .find(|table| table.profile().kind == profile)
    }

    pub fn connection(&self) -> &StreamConnection {
        &self.connection
    }

    /// Generation of the current connection attempt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stream_enabled(&self) -> bool {
        self.ws_url.is_some()
    }

    /// Mounts both tables: one stream user each, plus the first page fetch.
    pub fn start(&mut self) {
        let mut fetches = Vec::new();
        for idx in 0..self.tables.len() {
            if self.ws_url.is_some() && self.connection.acquire() {
                self.connect();
            }
            if let Some(page_index) = self.tables[idx].start() {
                fetches.push((self.tables[idx].profile().kind, page_index));
            }
        }
        for (profile, page_index) in fetches {
            self.spawn_fetch(profile, page_index);
        }
    }

    /// Waits for the next input. `None` once every control sender is gone.
    pub async fn next_event(&mut self) -> Option<RuntimeEvent> {
        tokio::select! {
            command = self.control_rx.recv() => command.map(RuntimeEvent::Control),
            Some(fetched) = self.fetch_rx.recv() => Some(RuntimeEvent::Fetched(fetched)),
            Some(signal) = self.stream_rx.recv() => Some(RuntimeEvent::Stream(signal)),
        }
    }

    pub fn apply(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Control(ControlCommand::Table { profile, input }) => {
                self.step_profile(profile, input);
            }
            RuntimeEvent::Control(ControlCommand::ReconnectStream) => {
                if self.ws_url.is_some() && self.connection.begin_reconnect() {
                    info!(
                        component = "runtime",
                        event = "stream.reconnect.requested",
                        generation = self.generation + 1
                    );
                    self.connect();
                }
            }
            RuntimeEvent::Fetched(fetched) => self.apply_fetch(fetched),
            RuntimeEvent::Stream(signal) => self.apply_signal(signal),
        }
    }

    pub async fn run(mut self) {
        self.start();
        self.publish();
        while let Some(event) = self.next_event().await {
            self.apply(event);
            self.publish();
        }
        self.shutdown().await;
    }

    pub fn publish(&self) {
        let stream = StreamView {
            state: self.connection.state(),
            enabled: self.ws_url.is_some(),
            active_subscriptions: self.connection.active_keys().count(),
        };
        self.publisher
            .replace_snapshot(build_display_snapshot(&self.tables, stream, Utc::now()));
    }

    /// Unmounts both tables. The scanner client is dropped on a blocking
    /// thread since the blocking HTTP client cannot be torn down inside the
    /// async runtime.
    pub async fn shutdown(&mut self) {
        if self.ws_url.is_some() {
            for _ in 0..self.tables.len() {
                self.connection.release();
            }
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        if let Some(api) = self.api.take() {
            let _ = tokio::task::spawn_blocking(move || drop(api)).await;
        }
        self.publish();
        info!(component = "runtime", event = "runtime.stopped");
    }

    fn step_profile(&mut self, profile: ProfileKind, input: TableInput) {
        let Some(idx) = self
            .tables
            .iter()
            .position(|table| table.profile().kind == profile)
        else {
            return;
        };
        let outcome = self.step_table(idx, input);
        if let Some(page_index) = outcome.fetch_page {
            self.spawn_fetch(profile, page_index);
        }
    }

    fn step_table(&mut self, idx: usize, input: TableInput) -> StepOutcome {
        let mut offline = OfflineTransport;
        let transport: &mut dyn StreamTransport = if self.ws_url.is_some() {
            &mut self.connection
        } else {
            &mut offline
        };
        self.tables[idx].step(input, transport, Utc::now())
    }

    fn apply_fetch(&mut self, fetched: FetchResult) {
        let FetchResult {
            profile,
            page_index,
            result,
        } = fetched;
        let input = match result {
            Ok(page) => {
                debug!(
                    component = "runtime",
                    event = "scanner.fetch.done",
                    profile = profile.as_str(),
                    page_index,
                    pairs = page.pairs.len(),
                    total_rows = page.total_rows
                );
                TableInput::PageLoaded(page)
            }
            Err(error) => {
                warn!(
                    component = "runtime",
                    event = "scanner.fetch.failed",
                    profile = profile.as_str(),
                    page_index,
                    error = %error,
                    "scanner page fetch failed"
                );
                TableInput::PageFailed { page_index, error }
            }
        };
        self.step_profile(profile, input);
    }

    fn apply_signal(&mut self, signal: StreamSignal) {
        if signal.generation() != self.generation {
            debug!(
                component = "runtime",
                event = "stream.signal.stale",
                generation = signal.generation(),
                current = self.generation
            );
            return;
        }

        match signal {
            StreamSignal::Opened { outbound, .. } => {
                self.connection.mark_open(Box::new(outbound));
                let resync = !self.opened_once;
                self.opened_once = true;
                for idx in 0..self.tables.len() {
                    self.step_table(idx, TableInput::StreamOpened { resync });
                }
            }
            StreamSignal::Frame { text, .. } => match decode_inbound(&text) {
                Ok(event) => self.route_stream_event(event),
                Err(err) => warn!(
                    component = "runtime",
                    event = "stream.decode.rejected",
                    error = %err,
                    bytes = text.len(),
                    "dropping undecodable stream frame"
                ),
            },
            StreamSignal::Closed { reason, .. } => {
                self.connection.mark_closed(&reason);
                self.driver = None;
            }
        }
    }

    /// Snapshots go to the tables whose scanner filter they answer; ticks and
    /// pair stats go to every table and are ignored where the key is absent.
    fn route_stream_event(&mut self, event: InboundEvent) {
        let targets: Vec<usize> = match &event {
            InboundEvent::ScannerPairs(payload) => self
                .tables
                .iter()
                .enumerate()
                .filter(|(_, table)| table.accepts_snapshot(payload.filter.as_ref()))
                .map(|(idx, _)| idx)
                .collect(),
            _ => (0..self.tables.len()).collect(),
        };
        debug!(
            component = "runtime",
            event = "stream.event.routed",
            kind = event.kind(),
            tables = targets.len()
        );
        for idx in targets {
            self.step_table(idx, TableInput::Stream(event.clone()));
        }
    }

    fn connect(&mut self) {
        let Some(ws_url) = self.ws_url.clone() else {
            return;
        };
        self.generation += 1;
        if let Some(previous) = self.driver.take() {
            previous.abort();
        }
        #[cfg(feature = "stream")]
        {
            self.driver = Some(crate::ws::spawn_stream_driver(
                ws_url,
                self.generation,
                self.stream_tx.clone(),
            ));
        }
        #[cfg(not(feature = "stream"))]
        {
            let _ = (ws_url, &self.stream_tx);
        }
    }

    fn spawn_fetch(&self, profile: ProfileKind, page_index: u32) {
        let Some(api) = self.api.clone() else {
            return;
        };
        let Some(query) = self.table(profile).map(|table| table.profile().clone()) else {
            return;
        };
        let results = self.fetch_tx.clone();
        debug!(
            component = "runtime",
            event = "scanner.fetch.scheduled",
            profile = profile.as_str(),
            page_index
        );
        tokio::task::spawn_blocking(move || {
            let result = api.fetch_page(&query, page_index);
            let _ = results.send(FetchResult {
                profile,
                page_index,
                result,
            });
        });
    }
}
