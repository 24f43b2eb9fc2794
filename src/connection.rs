//! Process-wide stream connection shared by every table.
//!
//! The connection owns the outbound sink, the keyed set of active
//! subscriptions and a reference count of the tables using it. The socket
//! itself lives in the `ws` driver task; this type only sees frames.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::stream::{OutboundMessage, ScannerFilterParams, SubscriptionTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// What to do with active subscriptions when the connection drops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResubscribePolicy {
    /// Forget them; nothing is re-sent after a reconnect.
    #[default]
    None,
    /// Re-send them as soon as the next connection opens.
    Replay,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream sink closed")]
    SinkClosed,
    #[error("failed to encode {event} frame: {message}")]
    Encode { event: &'static str, message: String },
    #[error("invalid stream url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("stream connect failed: {0}")]
    Connect(String),
    #[error("stream transport error: {0}")]
    Transport(String),
}

/// Where encoded text frames go once the socket is open.
pub trait FrameSink: Send {
    fn send_frame(&mut self, text: String) -> Result<(), StreamError>;
}

impl FrameSink for mpsc::UnboundedSender<String> {
    fn send_frame(&mut self, text: String) -> Result<(), StreamError> {
        self.send(text).map_err(|_| StreamError::SinkClosed)
    }
}

/// Subscription intents as seen by the reconciliation core.
///
/// Each call returns `true` only when a frame was actually sent.
///
/// Intents are multiplexed by key (`pair-` or `pair-stats-` plus pair and
/// token address), not by caller. When two tables share a connection, the second
/// subscribe for a key is a no-op and the first unsubscribe drops the key for
/// both; the server keeps no per-table refcount.
pub trait StreamTransport {
    fn is_ready(&self) -> bool;
    fn subscribe_pair(&mut self, target: &SubscriptionTarget) -> bool;
    fn unsubscribe_pair(&mut self, target: &SubscriptionTarget) -> bool;
    fn subscribe_pair_stats(&mut self, target: &SubscriptionTarget) -> bool;
    fn unsubscribe_pair_stats(&mut self, target: &SubscriptionTarget) -> bool;
    fn scanner_filter(&mut self, params: &ScannerFilterParams) -> bool;
}

pub struct StreamConnection {
    state: ConnectionState,
    policy: ResubscribePolicy,
    ref_count: usize,
    sink: Option<Box<dyn FrameSink>>,
    active: BTreeMap<String, OutboundMessage>,
    pending_replay: BTreeMap<String, OutboundMessage>,
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("ref_count", &self.ref_count)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StreamConnection {
    pub fn new(policy: ResubscribePolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            policy,
            ref_count: 0,
            sink: None,
            active: BTreeMap::new(),
            pending_replay: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.contains_key(key)
    }

    /// Registers a user. Returns `true` when the caller should start a
    /// connection attempt.
    pub fn acquire(&mut self) -> bool {
        self.ref_count += 1;
        if self.ref_count == 1 && self.state != ConnectionState::Open {
            self.state = ConnectionState::Connecting;
            return true;
        }
        false
    }

    /// Drops a user. The last release tears the connection down and returns
    /// `true`.
    pub fn release(&mut self) -> bool {
        if self.ref_count == 0 {
            return false;
        }
        self.ref_count -= 1;
        if self.ref_count > 0 {
            return false;
        }
        self.sink = None;
        self.active.clear();
        self.pending_replay.clear();
        self.state = ConnectionState::Idle;
        info!(
            component = "connection",
            event = "stream.teardown",
            "last user released the stream connection"
        );
        true
    }

    /// Manual reconnect request. Returns `true` when a new attempt should be
    /// started.
    pub fn begin_reconnect(&mut self) -> bool {
        if self.ref_count == 0 || self.state == ConnectionState::Open {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// Socket is up. Returns the number of subscriptions replayed.
    pub fn mark_open(&mut self, sink: Box<dyn FrameSink>) -> usize {
        self.sink = Some(sink);
        self.state = ConnectionState::Open;

        let replay = std::mem::take(&mut self.pending_replay);
        let mut replayed = 0;
        for (key, message) in replay {
            if self.send(&message) {
                self.active.insert(key, message);
                replayed += 1;
            }
        }
        info!(
            component = "connection",
            event = "stream.open",
            replayed,
            "stream connection open"
        );
        replayed
    }

    /// Socket closed or errored. Active subscriptions are cleared, or kept
    /// for replay under [`ResubscribePolicy::Replay`].
    pub fn mark_closed(&mut self, reason: &str) {
        self.sink = None;
        self.state = ConnectionState::Closed;
        let active = std::mem::take(&mut self.active);
        if self.policy == ResubscribePolicy::Replay {
            self.pending_replay.extend(active);
        }
        warn!(
            component = "connection",
            event = "stream.closed",
            reason,
            pending_replay = self.pending_replay.len(),
            "stream connection closed"
        );
    }

    fn send(&mut self, message: &OutboundMessage) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    component = "connection",
                    event = "stream.send.encode_failed",
                    frame = message.event_name(),
                    error = %err,
                    "failed to encode outbound frame"
                );
                return false;
            }
        };
        match sink.send_frame(text) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    component = "connection",
                    event = "stream.send.failed",
                    frame = message.event_name(),
                    error = %err,
                    "failed to send outbound frame"
                );
                false
            }
        }
    }

    fn subscribe_keyed(&mut self, key: String, message: OutboundMessage) -> bool {
        if !self.is_ready() {
            warn!(
                component = "connection",
                event = "stream.subscribe.dropped",
                key = %key,
                "stream not connected, cannot subscribe"
            );
            return false;
        }
        if self.active.contains_key(&key) {
            debug!(
                component = "connection",
                event = "stream.subscribe.deduplicated",
                key = %key
            );
            return false;
        }
        if !self.send(&message) {
            return false;
        }
        self.active.insert(key, message);
        true
    }

    fn unsubscribe_keyed(&mut self, key: &str, message: OutboundMessage) -> bool {
        if !self.is_ready() {
            warn!(
                component = "connection",
                event = "stream.unsubscribe.dropped",
                key = %key,
                "stream not connected, cannot unsubscribe"
            );
            return false;
        }
        if !self.active.contains_key(key) {
            return false;
        }
        if !self.send(&message) {
            return false;
        }
        self.active.remove(key);
        true
    }
}

impl StreamTransport for StreamConnection {
    fn is_ready(&self) -> bool {
        self.state == ConnectionState::Open && self.sink.is_some()
    }

    fn subscribe_pair(&mut self, target: &SubscriptionTarget) -> bool {
        self.subscribe_keyed(
            target.pair_key(),
            OutboundMessage::SubscribePair(target.clone()),
        )
    }

    fn unsubscribe_pair(&mut self, target: &SubscriptionTarget) -> bool {
        self.unsubscribe_keyed(
            &target.pair_key(),
            OutboundMessage::UnsubscribePair(target.clone()),
        )
    }

    fn subscribe_pair_stats(&mut self, target: &SubscriptionTarget) -> bool {
        self.subscribe_keyed(
            target.pair_stats_key(),
            OutboundMessage::SubscribePairStats(target.clone()),
        )
    }

    fn unsubscribe_pair_stats(&mut self, target: &SubscriptionTarget) -> bool {
        self.unsubscribe_keyed(
            &target.pair_stats_key(),
            OutboundMessage::UnsubscribePairStats(target.clone()),
        )
    }

    fn scanner_filter(&mut self, params: &ScannerFilterParams) -> bool {
        if !self.is_ready() {
            warn!(
                component = "connection",
                event = "stream.scanner_filter.dropped",
                chain = params.chain.as_str(),
                "stream not connected, cannot subscribe to scanner-filter"
            );
            return false;
        }
        self.send(&OutboundMessage::ScannerFilter(params.clone()))
    }
}
