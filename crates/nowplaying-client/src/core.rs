//! Live-status client: keeps a near-real-time view of what is playing.
//!
//! One driver task per client owns the connection and both timers.  The
//! service is poll-driven even though the transport is a persistent socket:
//! the driver sends a status request on open and again on every refresh tick,
//! and the service answers once per request.
//!
//! ```text
//!   start() ─► Connecting ──open──► AwaitingResponse ──status──► Steady
//!                  ▲                        │                       │
//!                  └──── close / error / failed send (immediate) ───┘
//!                  └──── failed connect: retried on next refresh tick
//! ```
//!
//! Everything the outside world sees goes through a single `watch` channel
//! of [`LiveStatus`].  `stop()` halts that channel before cancelling the
//! driver, so nothing changes after it returns.  The only way in is the
//! command channel, which carries the embed's ready event.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use nowplaying_proto::config::Config;
use nowplaying_proto::protocol::{DecodeError, Inbound, Request, RequestStyle};
use nowplaying_proto::track::ChangeTracker;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::status::{LiveStatus, Phase, StatusCell};
use crate::transport::{Connection, Connector, Frame, TransportError, WsConnector};

// ── settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub url: String,
    pub request_style: RequestStyle,
    pub refresh_interval: Duration,
    pub startup_timeout: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.endpoint.url(),
            request_style: config.endpoint.request_style,
            refresh_interval: Duration::from_millis(config.polling.refresh_interval_ms.max(1)),
            startup_timeout: Duration::from_millis(config.polling.startup_timeout_ms),
        }
    }
}

// ── commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverCommand {
    /// The embedded player finished loading the current track.
    EmbedReady,
}

/// Cloneable handle for reporting the embed's ready event from outside the
/// client, e.g. the HTTP API.
#[derive(Debug, Clone)]
pub struct EmbedReadySignal {
    tx: mpsc::UnboundedSender<DriverCommand>,
}

impl EmbedReadySignal {
    /// Returns false once the client is gone.
    pub fn signal(&self) -> bool {
        self.tx.send(DriverCommand::EmbedReady).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<DriverCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

// ── client handle ─────────────────────────────────────────────────────────────

pub struct LiveStatusClient {
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    cell: Arc<StatusCell>,
    cancel: CancellationToken,
    cmd_tx: mpsc::UnboundedSender<DriverCommand>,
    /// Handed to the driver on `start()`.
    cmd_rx: Option<mpsc::UnboundedReceiver<DriverCommand>>,
    task: Option<JoinHandle<()>>,
}

impl LiveStatusClient {
    pub fn new(settings: ClientSettings, connector: impl Connector) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            connector: Arc::new(connector),
            cell: Arc::new(StatusCell::new()),
            cancel: CancellationToken::new(),
            cmd_tx,
            cmd_rx: Some(cmd_rx),
            task: None,
        }
    }

    /// Websocket-backed client for the configured endpoint.
    pub fn from_config(config: &Config) -> Self {
        let connector =
            WsConnector::new(Duration::from_millis(config.endpoint.connect_timeout_ms));
        Self::new(ClientSettings::from_config(config), connector)
    }

    /// Spawn the driver.  Must be called from within a tokio runtime.
    /// A second call, or a call after `stop()`, does nothing.
    pub fn start(&mut self) {
        if self.task.is_some() {
            debug!("[live] start: already running");
            return;
        }
        if self.cell.is_halted() {
            warn!("[live] start: client was stopped, ignoring");
            return;
        }
        let Some(commands) = self.cmd_rx.take() else {
            return;
        };

        let request = match Request::GetCurrentlyPlaying.encode(self.settings.request_style) {
            Ok(r) => r,
            Err(e) => {
                warn!("[live] cannot encode status request: {}", e);
                return;
            }
        };

        info!("[live] starting, endpoint {}", self.settings.url);
        let driver = Driver {
            settings: self.settings.clone(),
            connector: Arc::clone(&self.connector),
            cell: Arc::clone(&self.cell),
            cancel: self.cancel.clone(),
            commands,
            conn: None,
            request,
            changes: ChangeTracker::new(),
            attempts: 0,
        };
        self.task = Some(tokio::spawn(driver.run()));
    }

    /// Release the connection and cancel both timers.  Idempotent.
    pub fn stop(&mut self) {
        if !self.cell.halt() {
            return;
        }
        self.cancel.cancel();
        info!("[live] stopped");
    }

    /// The transition channel: one notification per observable change.
    pub fn subscribe(&self) -> watch::Receiver<LiveStatus> {
        self.cell.subscribe()
    }

    pub fn status(&self) -> LiveStatus {
        self.cell.snapshot()
    }

    /// The embedded player finished loading; clears `refreshing`.
    /// Signals sent before `start()` are applied once the driver runs.
    pub fn mark_embed_ready(&self) {
        self.embed_ready().signal();
    }

    pub fn embed_ready(&self) -> EmbedReadySignal {
        EmbedReadySignal {
            tx: self.cmd_tx.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop and wait for the driver to finish closing its connection.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("[live] driver task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for LiveStatusClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

struct Driver {
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    cell: Arc<StatusCell>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    conn: Option<Box<dyn Connection>>,
    /// Pre-encoded status request.
    request: String,
    changes: ChangeTracker,
    /// Connect attempts so far; every one after the first is a reconnect.
    attempts: u64,
}

type ConnectFuture = BoxFuture<'static, Result<Box<dyn Connection>, TransportError>>;

async fn connect_result(
    pending: &mut Option<ConnectFuture>,
) -> Result<Box<dyn Connection>, TransportError> {
    match pending {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    conn: &mut Option<Box<dyn Connection>>,
) -> Option<Result<Frame, TransportError>> {
    match conn {
        Some(c) => c.recv().await,
        None => std::future::pending().await,
    }
}

impl Driver {
    async fn run(mut self) {
        let startup = tokio::time::sleep(self.settings.startup_timeout);
        tokio::pin!(startup);
        let mut startup_armed = true;

        let period = self.settings.refresh_interval;
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // At most one attempt in flight.  It is polled by the same select
        // as the timers so the startup deadline holds during a slow connect.
        let mut connecting: Option<ConnectFuture> = None;
        let mut connect_now = true;

        loop {
            if connect_now {
                connect_now = false;
                self.attempts += 1;
                if self.attempts > 1 {
                    self.cell.publish(|s| {
                        s.reconnects += 1;
                        true
                    });
                }
                connecting = Some(self.begin_connect());
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = &mut startup, if startup_armed => {
                    startup_armed = false;
                    self.on_startup_timeout();
                }
                Some(cmd) = self.commands.recv() => self.on_command(cmd),
                result = connect_result(&mut connecting) => {
                    connecting = None;
                    connect_now = match result {
                        Ok(conn) => self.on_open(conn).await,
                        Err(e) => {
                            warn!("[live] connect to {} failed: {}", self.settings.url, e);
                            self.mark_disconnected();
                            false
                        }
                    };
                }
                _ = refresh.tick() => {
                    if connecting.is_some() {
                        debug!("[live] refresh: connect still pending");
                    } else {
                        connect_now = self.on_refresh().await;
                    }
                }
                frame = next_frame(&mut self.conn) => {
                    connect_now = self.on_frame(frame).await;
                }
            }
        }

        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
        debug!("[live] driver exited");
    }

    fn begin_connect(&self) -> ConnectFuture {
        let connector = Arc::clone(&self.connector);
        let url = self.settings.url.clone();
        Box::pin(async move { connector.connect(&url).await })
    }

    // ── connection events ─────────────────────────────────────────────────────

    /// Returns true when the connection has to be re-established right away.
    async fn on_open(&mut self, conn: Box<dyn Connection>) -> bool {
        info!("[live] connected to {}", self.settings.url);
        self.conn = Some(conn);
        self.cell.publish(|s| {
            s.connected = true;
            s.phase = Phase::AwaitingResponse;
            true
        });
        self.send_request().await
    }

    /// Returns true when a reconnect is needed.
    async fn on_refresh(&mut self) -> bool {
        if self.conn.is_some() {
            return self.send_request().await;
        }
        debug!("[live] refresh: not connected, reconnecting");
        true
    }

    async fn on_frame(&mut self, frame: Option<Result<Frame, TransportError>>) -> bool {
        match frame {
            Some(Ok(Frame::Text(text))) => {
                self.on_text(&text);
                false
            }
            Some(Ok(Frame::Binary(bytes))) => {
                self.on_malformed(DecodeError::Binary(bytes.len()));
                false
            }
            Some(Ok(Frame::Close)) | None => {
                info!("[live] connection closed by remote");
                self.drop_connection().await;
                true
            }
            Some(Err(e)) => {
                warn!("[live] connection error: {}", e);
                self.drop_connection().await;
                true
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        match Inbound::decode(text) {
            Ok(Inbound::CurrentlyPlaying(track)) => {
                let changed = self.changes.observe(&track);
                let refreshing = self.changes.is_refreshing();
                if changed {
                    info!(
                        "[live] now {}: {:?}",
                        if track.is_playing { "playing" } else { "idle" },
                        track.active_id()
                    );
                }
                self.cell.publish(move |s| {
                    s.track = track;
                    s.loading = false;
                    s.has_responded = true;
                    s.phase = Phase::Steady;
                    s.track_changed = changed;
                    s.refreshing = refreshing;
                    s.updated_at = Some(Utc::now());
                    true
                });
            }
            Ok(Inbound::Other(kind)) => {
                debug!("[live] ignoring message of type {:?}", kind);
            }
            Err(e) => self.on_malformed(e),
        }
    }

    /// Malformed payloads end the wait for this attempt but keep the
    /// connection; the next refresh asks again.
    fn on_malformed(&mut self, err: DecodeError) {
        warn!("[live] malformed status message: {}", err);
        self.cell.publish(|s| s.settle());
    }

    fn on_command(&mut self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::EmbedReady => {
                self.changes.mark_ready();
                if self.cell.publish(|s| std::mem::replace(&mut s.refreshing, false)) {
                    debug!("[live] embed ready");
                }
            }
        }
    }

    fn on_startup_timeout(&mut self) {
        let settled = self.cell.publish(|s| s.settle());
        if settled {
            info!(
                "[live] no status within {:?}, showing not playing",
                self.settings.startup_timeout
            );
        }
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    /// Returns true when the send failed and the connection was dropped.
    async fn send_request(&mut self) -> bool {
        let Some(conn) = self.conn.as_mut() else {
            return true;
        };
        match conn.send_text(self.request.clone()).await {
            Ok(()) => {
                debug!("[live] status requested");
                false
            }
            Err(e) => {
                warn!("[live] status request failed: {}", e);
                self.drop_connection().await;
                true
            }
        }
    }

    async fn drop_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
        self.mark_disconnected();
    }

    fn mark_disconnected(&mut self) {
        self.cell.publish(|s| {
            let settled = s.settle();
            let was = s.connected || s.phase != Phase::Connecting;
            s.connected = false;
            s.phase = Phase::Connecting;
            settled || was
        });
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────
