//! WebSocket driver task for the market-data stream.
//!
//! One task per connection attempt. It reports back to the runtime through
//! [`StreamSignal`]s tagged with the attempt's generation, so signals from a
//! superseded socket can be told apart.

use tokio::sync::mpsc;

#[cfg(feature = "stream")]
use crate::connection::StreamError;

#[derive(Debug)]
pub enum StreamSignal {
    /// Socket is open; text frames sent here go out on it.
    Opened {
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    Frame { generation: u64, text: String },
    Closed { generation: u64, reason: String },
}

impl StreamSignal {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Opened { generation, .. }
            | Self::Frame { generation, .. }
            | Self::Closed { generation, .. } => *generation,
        }
    }
}

#[cfg(feature = "stream")]
pub fn spawn_stream_driver(
    ws_url: String,
    generation: u64,
    signals: mpsc::UnboundedSender<StreamSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let reason = match run_stream(&ws_url, generation, &signals).await {
            Ok(reason) => reason,
            Err(err) => {
                tracing::warn!(
                    component = "ws",
                    event = "stream.driver.error",
                    generation,
                    error = %err,
                    "stream driver stopped with error"
                );
                err.to_string()
            }
        };
        let _ = signals.send(StreamSignal::Closed { generation, reason });
    })
}

#[cfg(feature = "stream")]
async fn run_stream(
    ws_url: &str,
    generation: u64,
    signals: &mpsc::UnboundedSender<StreamSignal>,
) -> Result<String, StreamError> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::{connect_async, tungstenite::Message};
    use tracing::{debug, info};

    let url = url::Url::parse(ws_url).map_err(|err| StreamError::InvalidUrl {
        url: ws_url.to_string(),
        message: err.to_string(),
    })?;

    info!(
        component = "ws",
        event = "stream.connect.start",
        generation,
        url = %url
    );
    let (mut socket, _) = connect_async(url.as_str())
        .await
        .map_err(|err| StreamError::Connect(err.to_string()))?;

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    if signals
        .send(StreamSignal::Opened {
            generation,
            outbound: outbound_tx,
        })
        .is_err()
    {
        return Ok("runtime stopped".to_string());
    }

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(text) = outbound else {
                    let _ = socket.close(None).await;
                    return Ok("closed by runtime".to_string());
                };
                debug!(component = "ws", event = "stream.frame.sent", generation, bytes = text.len());
                socket
                    .send(Message::Text(text))
                    .await
                    .map_err(|err| StreamError::Transport(err.to_string()))?;
            }
            inbound = socket.next() => {
                let Some(message) = inbound else {
                    return Ok("closed by peer".to_string());
                };
                let message = message.map_err(|err| StreamError::Transport(err.to_string()))?;
                match message {
                    Message::Text(text) => {
                        if signals.send(StreamSignal::Frame { generation, text }).is_err() {
                            return Ok("runtime stopped".to_string());
                        }
                    }
                    Message::Ping(payload) => {
                        socket
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|err| StreamError::Transport(err.to_string()))?;
                    }
                    Message::Close(frame) => {
                        return Ok(frame
                            .map(|frame| frame.reason.to_string())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "closed by peer".to_string()));
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_carry_their_generation() {
        let (outbound, _rx) = mpsc::unbounded_channel();
        assert_eq!(
            StreamSignal::Opened {
                generation: 3,
                outbound
            }
            .generation(),
            3
        );
        assert_eq!(
            StreamSignal::Closed {
                generation: 4,
                reason: "bye".to_string()
            }
            .generation(),
            4
        );
    }
}
