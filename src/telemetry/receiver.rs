use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::channels::SensorRecord;
use crate::error::{MonitorError, MonitorResult};

use super::decoder::{StreamDecoder, DEFAULT_MAX_FRAME_BYTES};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The stream failed mid-read. Treated as disconnected; reconnecting is
    /// up to the user.
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Everything the receive loop reports, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Record(SensorRecord),
    Error(MonitorError),
    StateChanged(ConnectionState),
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub connect_timeout: Duration,
    pub max_frame_bytes: usize,
    pub read_chunk_bytes: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            read_chunk_bytes: 1024,
        }
    }
}

/// Shared between the receiver and its loop so both can publish transitions.
#[derive(Clone)]
struct StateReporter {
    state: Arc<watch::Sender<ConnectionState>>,
    events: mpsc::UnboundedSender<TelemetryEvent>,
}

impl StateReporter {
    fn set(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            self.emit(TelemetryEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: TelemetryEvent) {
        // The consumer going away just means nobody is listening anymore.
        let _ = self.events.send(event);
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// Owns the device connection and the task that reads from it.
///
/// Decoded records, decode and I/O errors and state transitions all go out
/// through the event channel returned by [`TelemetryReceiver::new`]; the
/// receive task never touches consumer state.
pub struct TelemetryReceiver {
    config: ReceiverConfig,
    reporter: StateReporter,
    stream: Option<TcpStream>,
    peer: Option<String>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl TelemetryReceiver {
    pub fn new(config: ReceiverConfig) -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let receiver = Self {
            config,
            reporter: StateReporter {
                state: Arc::new(state_tx),
                events: events_tx,
            },
            stream: None,
            peer: None,
            handle: None,
            cancel_token: None,
        };
        (receiver, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.reporter.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.reporter.state.subscribe()
    }

    /// True while the receive task is alive.
    pub fn is_receiving(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Open a single TCP connection, bounded by the configured timeout.
    ///
    /// Any previous connection is stopped first. Failure is reported as an
    /// event as well as returned, and leaves the receiver disconnected.
    pub async fn connect(&mut self, host: &str, port: u16) -> MonitorResult<()> {
        if self.stream.is_some() || self.handle.is_some() {
            // Joining the old loop only fails if it panicked; the new
            // connection does not depend on it.
            if let Err(err) = self.stop().await {
                log_warn!("previous receive loop ended badly: {err:?}");
            }
        }

        let addr = format!("{host}:{port}");
        self.reporter.set(ConnectionState::Connecting);
        log_info!("connecting to {}", addr);

        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await;

        let failure = match attempt {
            Ok(Ok(stream)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    log_warn!("could not disable Nagle on {}: {err}", addr);
                }
                log_info!("connected to {}", addr);
                self.stream = Some(stream);
                self.peer = Some(addr);
                self.reporter.set(ConnectionState::Connected);
                return Ok(());
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!(
                "timed out after {}ms",
                self.config.connect_timeout.as_millis()
            ),
        };

        log_error!("connection to {} failed: {}", addr, failure);
        let err = MonitorError::Connection {
            addr,
            reason: failure,
        };
        self.reporter.emit(TelemetryEvent::Error(err.clone()));
        self.reporter.set(ConnectionState::Disconnected);
        Err(err)
    }

    /// Spawn the receive loop on the connected socket.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("receiver already running");
        }
        let Some(stream) = self.stream.take() else {
            bail!("receiver is not connected");
        };

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(receive_loop(
            stream,
            StreamDecoder::new(self.config.max_frame_bytes),
            self.config.read_chunk_bytes.max(1),
            self.reporter.clone(),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Halt the receive loop and close the socket. Safe to call repeatedly.
    ///
    /// A read blocked inside the loop is abandoned as soon as the token fires,
    /// so this returns promptly even when the peer has gone silent.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        // Connected but never started.
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }

        let joined = match self.handle.take() {
            Some(handle) => handle
                .await
                .context("telemetry receive loop failed to join"),
            None => Ok(()),
        };

        if let Some(peer) = self.peer.take() {
            log_info!("receiver stopped ({})", peer);
        }
        self.reporter.set(ConnectionState::Disconnected);
        joined
    }
}

impl Drop for TelemetryReceiver {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn receive_loop(
    mut stream: TcpStream,
    mut decoder: StreamDecoder,
    chunk_bytes: usize,
    reporter: StateReporter,
    cancel_token: CancellationToken,
) {
    let mut buf = vec![0u8; chunk_bytes];
    let mut failed = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("receive loop cancelled");
                break;
            }
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    log_info!("peer closed the telemetry stream");
                    break;
                }
                Ok(n) => {
                    for frame in decoder.feed(&buf[..n]) {
                        match frame {
                            Ok(record) => reporter.emit(TelemetryEvent::Record(record)),
                            Err(err) => {
                                log_warn!("dropping frame: {err}");
                                reporter.emit(TelemetryEvent::Error(err));
                            }
                        }
                    }
                }
                Err(err) => {
                    log_error!("telemetry read failed: {err}");
                    reporter.emit(TelemetryEvent::Error(MonitorError::Io(err.to_string())));
                    failed = true;
                    break;
                }
            }
        }
    }

    if decoder.pending() > 0 {
        log_warn!("discarding {} bytes of unterminated frame", decoder.pending());
    }
    let _ = stream.shutdown().await;

    reporter.set(if failed {
        ConnectionState::Error
    } else {
        ConnectionState::Disconnected
    });
}
