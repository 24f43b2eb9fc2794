use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use pairscan::{
    dashboard_router, log_app_bind, log_app_start, log_stream_selected, ControlCommand,
    ControlError, DashboardControl, DashboardSnapshot, InMemorySnapshotSource, LoggingConfig,
    ResubscribePolicy, ScannerRow, StreamConnection, StreamSelection, StreamTransport,
    SubscriptionTarget, Chain,
};
use tower::util::ServiceExt;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

struct NoopControl;

impl DashboardControl for NoopControl {
    fn submit(&self, _command: ControlCommand) -> Result<(), ControlError> {
        Ok(())
    }
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig {
            rejected: vec![("SCANNER_LOG_FORMAT", "yaml".to_string())],
            ..LoggingConfig::default()
        };
        log_app_start(&cfg);
        log_stream_selected(StreamSelection::Live {
            ws_url: "wss://stream.example/ws",
        });
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"stream.selected\""));
    assert!(logs.contains("\"mode\":\"live\""));
    assert!(logs.contains("\"event\":\"config.value.ignored\""));
    assert!(logs.contains("\"value\":\"yaml\""));
    assert!(logs.contains("\"event\":\"app.bind\""));
}

#[test]
fn subscribe_before_open_is_dropped_with_warning() {
    let logs = capture_logs(Level::INFO, || {
        let mut connection = StreamConnection::new(ResubscribePolicy::None);
        connection.acquire();
        let target = SubscriptionTarget {
            pair: "0xpair".to_string(),
            token: "0xtoken".to_string(),
            chain: Chain::Eth,
        };

        assert!(!connection.subscribe_pair(&target));
        assert_eq!(connection.active_keys().count(), 0);
    });

    assert!(logs.contains("\"event\":\"stream.subscribe.dropped\""));
    assert!(logs.contains("\"level\":\"WARN\""));
}

#[test]
fn unsubscribe_before_open_is_dropped_with_warning() {
    let logs = capture_logs(Level::INFO, || {
        let mut connection = StreamConnection::new(ResubscribePolicy::None);
        connection.acquire();
        let target = SubscriptionTarget {
            pair: "0xpair".to_string(),
            token: "0xtoken".to_string(),
            chain: Chain::Eth,
        };

        assert!(!connection.unsubscribe_pair_stats(&target));
    });

    assert!(logs.contains("\"event\":\"stream.unsubscribe.dropped\""));
    assert!(logs.contains("\"key\":\"pair-stats-0xpair-0xtoken\""));
}

#[test]
fn last_release_logs_teardown() {
    let logs = capture_logs(Level::INFO, || {
        let mut connection = StreamConnection::new(ResubscribePolicy::Replay);
        connection.acquire();
        connection.acquire();
        assert!(!connection.release());
        assert!(connection.release());
    });

    assert_eq!(logs.matches("\"event\":\"stream.teardown\"").count(), 1);
}

#[test]
fn snapshot_route_emits_http_snapshot_event() {
    let logs = capture_logs(Level::INFO, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("single-thread runtime should build");

        rt.block_on(async {
            let mut snapshot = DashboardSnapshot::default();
            snapshot.generated_at = "now".to_string();
            let source = Arc::new(InMemorySnapshotSource::new(snapshot));
            let app = dashboard_router(source, Arc::new(NoopControl));

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/dashboard/snapshot")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("snapshot request should succeed");

            assert_eq!(response.status(), StatusCode::OK);
        });
    });

    assert!(logs.contains("\"event\":\"http.snapshot.request\""));
}

#[test]
fn unmapped_chain_rows_are_reported() {
    let logs = capture_logs(Level::DEBUG, || {
        let mut row = ScannerRow::with_pair("0xodd");
        row.chain_id = 31337;
        assert!(pairscan::subscription_target(&row).is_err());
        let rows = pairscan::RowSet::from_rows(vec![row]);
        let visible: std::collections::BTreeSet<String> =
            ["0xodd".to_string()].into_iter().collect();
        let mut connection = StreamConnection::new(ResubscribePolicy::None);
        let mut manager = pairscan::SubscriptionManager::new();
        let report = manager.reconcile(&visible, &rows, &mut connection);
        assert_eq!(report.unresolved, vec!["0xodd".to_string()]);
    });

    assert!(logs.contains("\"event\":\"subscription.key.unmapped_chain\""));
}
