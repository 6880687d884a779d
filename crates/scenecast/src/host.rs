//! The host endpoint: owns the live scene and serves any number of
//! spectators.
//!
//! Each [`Host::tick`] runs the same fixed sequence:
//!
//!   1. Drain transport events and dispatch inbound commands
//!   2. Broadcast the frame's camera pose and scene delta
//!   3. Send one bundle chunk to every recipient with a transfer in flight
//!   4. Heartbeat, then telemetry if a report is due
//!
//! Nothing here blocks. A send failure is logged and the tick carries on;
//! the transport reports the disconnect through the event queue and the
//! connection is dropped when that event is drained.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use scenecast_assets::{AssetSender, BundleCatalog};
use scenecast_protocol::{
    CameraPose, CommandPayload, CommandRouter, Dispatch, PerfDiagnostics, ProtocolError,
    RequestBundleDownload, RequestBundleInfo, SceneDelta, command,
};
use scenecast_transport::{Connection, ConnectionEvent, ConnectionId, EventQueue, EventSender, event_queue};
use tracing::{debug, info, trace, warn};

use crate::{ScenecastError, decode_or_warn};
use crate::config::HostConfig;
use crate::heartbeat::Heartbeat;
use crate::telemetry::PerfMonitor;

/// What the application captured this frame.
#[derive(Debug, Clone, Default)]
pub struct HostFrame {
    /// Seconds on the host's clock.
    pub timestamp: f32,
    pub camera: Option<CameraPose>,
    /// Serialized per-object changes, opaque to the host.
    pub scene_delta: Option<Bytes>,
}

impl HostFrame {
    pub fn new(timestamp: f32) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn with_camera(mut self, position: [f32; 3], rotation: [f32; 4]) -> Self {
        self.camera = Some(CameraPose {
            timestamp: self.timestamp,
            position,
            rotation,
        });
        self
    }

    pub fn with_scene_delta(mut self, data: impl Into<Bytes>) -> Self {
        self.scene_delta = Some(data.into());
        self
    }
}

/// Host state reachable from command handlers.
///
/// Handlers receive it as `&mut HostContext` together with the payload.
/// [`origin`](Self::origin) names the connection the message came from.
pub struct HostContext<C> {
    connections: BTreeMap<ConnectionId, C>,
    assets: AssetSender,
    perf: PerfMonitor,
    origin: Option<ConnectionId>,
}

impl<C: Connection> HostContext<C> {
    /// The connection whose message is being dispatched.
    pub fn origin(&self) -> Option<ConnectionId> {
        self.origin
    }

    pub fn assets(&self) -> &AssetSender {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetSender {
        &mut self.assets
    }

    pub fn perf_mut(&mut self) -> &mut PerfMonitor {
        &mut self.perf
    }

    /// Sends `message` back to the connection being dispatched.
    pub fn reply(&self, message: &[u8]) {
        match self.origin {
            Some(to) => self.send_logged(to, message),
            None => debug!("reply outside dispatch, dropping"),
        }
    }

    fn send_logged(&self, to: ConnectionId, message: &[u8]) {
        let Some(conn) = self.connections.get(&to) else {
            debug!(%to, "send to unknown connection, dropping");
            return;
        };
        if let Err(e) = conn.send(message) {
            warn!(%to, error = %e, "send failed");
        }
    }

    fn broadcast(&self, message: &[u8]) {
        for (&to, conn) in &self.connections {
            if let Err(e) = conn.send(message) {
                warn!(%to, error = %e, "broadcast send failed");
            }
        }
    }
}

/// The endpoint that owns the scene.
///
/// `C` is the transport's connection handle; the host never opens or
/// accepts connections itself. Hand the transport the sender from
/// [`events_sender`](Self::events_sender) and tick the host once per frame.
pub struct Host<C> {
    config: HostConfig,
    events: EventQueue<C>,
    event_tx: EventSender<C>,
    router: CommandRouter<HostContext<C>>,
    ctx: HostContext<C>,
    heartbeat: Heartbeat,
}

impl<C: Connection> Host<C> {
    /// Creates a host serving bundles from `catalog`.
    ///
    /// # Errors
    /// Fails only if the built-in handlers cannot be registered.
    pub fn new(config: HostConfig, catalog: BundleCatalog) -> Result<Self, ScenecastError> {
        let config = config.validated();
        let (event_tx, events) = event_queue();
        let router = CommandRouter::new();
        register_handlers(&router)?;

        Ok(Self {
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            ctx: HostContext {
                connections: BTreeMap::new(),
                assets: AssetSender::new(catalog, config.max_chunk_size),
                perf: PerfMonitor::new(config.telemetry_interval),
                origin: None,
            },
            config,
            events,
            event_tx,
            router,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Producer half of the event queue, for the transport.
    pub fn events_sender(&self) -> EventSender<C> {
        self.event_tx.clone()
    }

    /// The command router. Application handlers registered here see the
    /// same [`HostContext`] the built-in ones do.
    pub fn router(&self) -> &CommandRouter<HostContext<C>> {
        &self.router
    }

    pub fn connection_count(&self) -> usize {
        self.ctx.connections.len()
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.ctx.connections.keys().copied()
    }

    pub fn assets(&self) -> &AssetSender {
        &self.ctx.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetSender {
        &mut self.ctx.assets
    }

    pub fn perf(&self) -> &PerfMonitor {
        &self.ctx.perf
    }

    pub fn perf_mut(&mut self) -> &mut PerfMonitor {
        &mut self.ctx.perf
    }

    /// Sends an application-defined message to one spectator.
    ///
    /// # Errors
    /// [`ScenecastError::NotConnected`] if `to` is not connected, or the
    /// transport's send error.
    pub fn send_to(&self, to: ConnectionId, message: &[u8]) -> Result<(), ScenecastError> {
        let conn = self
            .ctx
            .connections
            .get(&to)
            .ok_or(ScenecastError::NotConnected)?;
        conn.send(message)?;
        Ok(())
    }

    /// Sends an application-defined message to every spectator.
    pub fn broadcast(&self, message: &[u8]) {
        self.ctx.broadcast(message);
    }

    /// Runs one host frame. `dt` is the real time since the previous tick.
    pub fn tick(&mut self, dt: Duration, frame: &HostFrame) {
        let started = Instant::now();

        let inbound = self.process_events();
        let dispatched = started.elapsed();

        self.broadcast_frame(frame);

        let chunks = self.ctx.assets.next_chunks();
        for (to, msg) in &chunks {
            self.ctx.send_logged(*to, msg);
        }

        let connected = !self.ctx.connections.is_empty();
        if let Some(msg) = self.heartbeat.tick(dt, connected) {
            self.ctx.broadcast(&msg);
        }

        let perf = &mut self.ctx.perf;
        perf.record_frame();
        perf.record_duration("dispatch", dispatched);
        perf.record_duration("tick", started.elapsed());
        perf.record_event("messages_received", inbound as u64);
        perf.record_event("bundle_chunks_sent", chunks.len() as u64);
        perf.record_memory(
            "bundle_catalog",
            self.ctx.assets.catalog().total_bytes() as u64,
        );
        if let Some(report) = perf.poll(dt) {
            match report.to_message() {
                Ok(msg) => self.ctx.broadcast(&msg),
                Err(e) => warn!(error = %e, "failed to encode telemetry report"),
            }
        }
    }

    /// Drains the event queue. Returns the number of messages dispatched.
    fn process_events(&mut self) -> usize {
        let mut dispatched = 0;
        for event in self.events.drain() {
            match event {
                ConnectionEvent::Connected(conn) => {
                    let id = conn.id();
                    info!(conn = %id, remote = conn.remote(), "spectator connected");
                    self.ctx.connections.insert(id, conn);
                }
                ConnectionEvent::Data(from, bytes) => {
                    if !self.ctx.connections.contains_key(&from) {
                        trace!(%from, "data from unknown connection, dropping");
                        continue;
                    }
                    self.ctx.origin = Some(from);
                    match self.router.dispatch(&mut self.ctx, &bytes) {
                        Ok(Dispatch::Handled) => dispatched += 1,
                        Ok(Dispatch::Unhandled) => {}
                        Err(e) => warn!(%from, error = %e, "malformed message, dropping"),
                    }
                    self.ctx.origin = None;
                }
                ConnectionEvent::Disconnected(id) => {
                    if self.ctx.connections.remove(&id).is_some() {
                        info!(conn = %id, "spectator disconnected");
                    }
                    self.ctx.assets.on_disconnected(id);
                    if self.ctx.connections.is_empty() && self.ctx.perf.is_enabled() {
                        debug!("last spectator left, disabling telemetry");
                        self.ctx.perf.set_enabled(false);
                    }
                }
            }
        }
        dispatched
    }

    fn broadcast_frame(&self, frame: &HostFrame) {
        if self.ctx.connections.is_empty() {
            return;
        }
        if let Some(pose) = &frame.camera {
            match pose.to_message() {
                Ok(msg) => self.ctx.broadcast(&msg),
                Err(e) => warn!(error = %e, "failed to encode camera pose"),
            }
        }
        if let Some(data) = &frame.scene_delta {
            let delta = SceneDelta {
                timestamp: frame.timestamp,
                data: data.clone(),
            };
            match delta.to_message() {
                Ok(msg) => self.ctx.broadcast(&msg),
                Err(e) => warn!(error = %e, "failed to encode scene delta"),
            }
        }
    }
}

fn register_handlers<C: Connection>(
    router: &CommandRouter<HostContext<C>>,
) -> Result<(), ProtocolError> {
    router.register(command::REQUEST_ASSET_BUNDLE_INFO, |ctx: &mut HostContext<C>, payload| {
        let (Some(from), Some(req)) = (ctx.origin, decode_or_warn::<RequestBundleInfo>(payload))
        else {
            return;
        };
        match ctx.assets.handle_info_request(from, req) {
            Ok(msg) => ctx.reply(&msg),
            Err(e) => warn!(%from, error = %e, "failed to answer bundle info request"),
        }
    })?;

    router.register(
        command::REQUEST_ASSET_BUNDLE_DOWNLOAD,
        |ctx: &mut HostContext<C>, payload| {
            let (Some(from), Some(req)) =
                (ctx.origin, decode_or_warn::<RequestBundleDownload>(payload))
            else {
                return;
            };
            match ctx.assets.handle_download_request(from, req) {
                Ok(Some(msg)) => ctx.reply(&msg),
                Ok(None) => {}
                Err(e) => warn!(%from, error = %e, "failed to start bundle transfer"),
            }
        },
    )?;

    router.register(command::ASSET_LOAD_COMPLETED, |ctx: &mut HostContext<C>, _| {
        if let Some(from) = ctx.origin {
            ctx.assets.handle_load_completed(from);
        }
    })?;

    router.register(command::PERF_DIAGNOSTICS, |ctx: &mut HostContext<C>, payload| {
        if let Some(PerfDiagnostics { enabled }) = decode_or_warn(payload) {
            info!(from = ?ctx.origin, enabled, "telemetry toggled by spectator");
            ctx.perf.set_enabled(enabled);
        }
    })?;

    Ok(())
}
