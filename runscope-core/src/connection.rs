//! WebSocket channel to the trace server
//!
//! A [`ConnectionManager`] runs as one tokio task that owns the socket. It
//! forwards every inbound text frame to a single consumer over an unbounded
//! channel and reconnects with jittered exponential backoff whenever the
//! socket closes.
//!
//! Outbound requests go through a [`ConnectionHandle`]. `send` is
//! synchronous and fails with [`Error::NotConnected`] while no socket is
//! open; nothing is queued for later.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::protocol::OutboundRequest;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OutboundSlot = Arc<Mutex<Option<UnboundedSender<String>>>>;

/// What the connection task reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A socket opened. Any earlier subscription is gone.
    Connected,
    /// One inbound text frame, in arrival order.
    Frame(String),
    /// An open socket closed.
    Disconnected { reason: String },
    /// A connect attempt failed; the next one starts after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The retry cap was hit; the task has stopped.
    GaveUp { attempts: u32 },
}

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter_ratio: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter_ratio: f64) -> Self {
        Self {
            initial,
            max,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
            current: initial,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.jitter_ratio,
        )
    }

    /// Next delay, jittered by `sample` in `[-1, 1]`.
    pub fn next_delay_with(&mut self, sample: f64) -> Duration {
        let base = self.current;
        self.current = base.saturating_mul(2).min(self.max);
        let factor = (1.0 + self.jitter_ratio * sample.clamp(-1.0, 1.0)).max(0.0);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    pub fn next_delay(&mut self) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.next_delay_with(sample)
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Owns the reconnecting socket until spawned.
#[derive(Debug)]
pub struct ConnectionManager {
    url: Url,
    backoff: Backoff,
    max_retries: Option<u32>,
}

impl ConnectionManager {
    /// The URL fragment, if any, is a deep link for the viewer and is not
    /// sent to the server.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let mut url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("invalid connection.url {:?}: {}", config.url, e)))?;
        url.set_fragment(None);

        Ok(Self {
            url,
            backoff: Backoff::from_config(config),
            max_retries: config.max_retries,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Start the connection task on `runtime`.
    pub fn spawn(
        self,
        runtime: &tokio::runtime::Handle,
    ) -> (ConnectionHandle, UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let outbound: OutboundSlot = Arc::new(Mutex::new(None));

        let task = runtime.spawn(self.run(Arc::clone(&outbound), events_tx));

        let handle = ConnectionHandle {
            outbound,
            abort: task.abort_handle(),
        };
        (handle, events_rx)
    }

    async fn run(self, outbound: OutboundSlot, events: UnboundedSender<ConnectionEvent>) {
        let ConnectionManager {
            url,
            mut backoff,
            max_retries,
        } = self;
        let mut failures: u32 = 0;

        loop {
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    backoff.reset();
                    failures = 0;

                    let (tx, rx) = mpsc::unbounded_channel();
                    *lock(&outbound) = Some(tx);
                    tracing::info!(url = %url, "Connected");
                    if events.send(ConnectionEvent::Connected).is_err() {
                        return;
                    }

                    let reason = serve(ws, rx, &events).await;
                    *lock(&outbound) = None;
                    tracing::warn!(reason = %reason, "Connection closed");
                    if events.send(ConnectionEvent::Disconnected { reason }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(url = %url, error = %e, attempt = failures, "Connect failed");
                    if max_retries.is_some_and(|max| failures > max) {
                        tracing::error!(attempts = failures, "Giving up on connection");
                        let _ = events.send(ConnectionEvent::GaveUp { attempts: failures });
                        return;
                    }
                }
            }

            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting");
            let event = ConnectionEvent::Reconnecting {
                attempt: failures + 1,
                delay,
            };
            if events.send(event).is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
        }
    }
}

/// Pump one open socket until it closes. Returns the close reason.
async fn serve(
    mut ws: Socket,
    mut outbound: UnboundedReceiver<String>,
    events: &UnboundedSender<ConnectionEvent>,
) -> String {
    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if events.send(ConnectionEvent::Frame(text)).is_err() {
                        let _ = ws.close(None).await;
                        return "consumer dropped".to_string();
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) if !frame.reason.is_empty() => {
                            format!("closed by server: {}", frame.reason)
                        }
                        _ => "closed by server".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return e.to_string(),
                None => return "stream ended".to_string(),
            },
            Some(text) = outbound.recv() => {
                if let Err(e) = ws.send(Message::Text(text)).await {
                    return e.to_string();
                }
            }
        }
    }
}

fn lock(slot: &OutboundSlot) -> MutexGuard<'_, Option<UnboundedSender<String>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where subscription requests go.
pub trait RequestSink {
    fn send_request(&self, request: &OutboundRequest) -> Result<()>;
}

/// Cheap handle for sending requests and stopping the task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    outbound: OutboundSlot,
    abort: AbortHandle,
}

impl ConnectionHandle {
    /// Queue a request on the open socket.
    pub fn send(&self, request: &OutboundRequest) -> Result<()> {
        let text = request.to_frame_text()?;
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx.send(text).map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.outbound).is_some()
    }

    pub fn shutdown(&self) {
        self.abort.abort();
        lock(&self.outbound).take();
    }
}

impl RequestSink for ConnectionHandle {
    fn send_request(&self, request: &OutboundRequest) -> Result<()> {
        self.send(request)
    }
}
