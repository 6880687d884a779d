//! The spectator endpoint: mirrors a host's scene over one connection.
//!
//! Inbound bytes are only ever touched inside [`Spectator::tick`]. The
//! tick drains the event queue through the router, which feeds the two
//! frame synchronizers and the asset receiver, then asks each
//! synchronizer what is due and returns that as a [`SpectatorFrame`].

use std::time::Duration;

use bytes::Bytes;
use scenecast_assets::{AssetCache, AssetReceiver, AssetState, AssetStatus};
use scenecast_protocol::{
    BundleInfoReport, CameraPose, CommandPayload, CommandRouter, DownloadStart, PerfDiagnostics,
    PerfReport, ProtocolError, SceneDelta, command,
};
use scenecast_sync::{FrameSample, FrameSynchronizer, SyncStats};
use scenecast_transport::{Connection, ConnectionEvent, EventQueue, EventSender, event_queue};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::{ScenecastError, decode_or_warn};
use crate::config::SpectatorConfig;
use crate::heartbeat::Heartbeat;
use crate::telemetry::PerfSnapshot;

/// Samples that came due during one spectator tick, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SpectatorFrame {
    pub scene_deltas: Vec<FrameSample<Bytes>>,
    pub camera: Vec<FrameSample<CameraPose>>,
}

impl SpectatorFrame {
    /// The newest camera pose applied this tick.
    pub fn latest_camera(&self) -> Option<&CameraPose> {
        self.camera.last().map(|s| &s.payload)
    }

    pub fn is_empty(&self) -> bool {
        self.scene_deltas.is_empty() && self.camera.is_empty()
    }
}

/// Spectator state reachable from command handlers.
pub struct SpectatorContext<C, A> {
    connection: Option<C>,
    assets: AssetReceiver<A>,
    scene: FrameSynchronizer<Bytes>,
    camera: FrameSynchronizer<CameraPose>,
    perf: Option<PerfSnapshot>,
}

impl<C: Connection, A: AssetCache> SpectatorContext<C, A> {
    pub fn assets(&self) -> &AssetReceiver<A> {
        &self.assets
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Sends `message` to the host, logging instead of failing.
    pub fn send_logged(&self, message: &[u8]) {
        let Some(conn) = &self.connection else {
            debug!("not connected, dropping outbound message");
            return;
        };
        if let Err(e) = conn.send(message) {
            warn!(conn = %conn.id(), error = %e, "send failed");
        }
    }

    fn reset_session(&mut self) {
        self.scene.reset();
        self.camera.reset();
        self.perf = None;
    }
}

/// The endpoint that mirrors a host.
///
/// `A` is the local asset cache the negotiated bundle loads into.
pub struct Spectator<C, A> {
    config: SpectatorConfig,
    events: EventQueue<C>,
    event_tx: EventSender<C>,
    router: CommandRouter<SpectatorContext<C, A>>,
    ctx: SpectatorContext<C, A>,
    heartbeat: Heartbeat,
    perf_diagnostics: bool,
    latest_camera: Option<CameraPose>,
}

impl<C: Connection, A: AssetCache> Spectator<C, A> {
    /// Creates a disconnected spectator loading bundles into `cache`.
    ///
    /// # Errors
    /// Fails only if the built-in handlers cannot be registered.
    pub fn new(config: SpectatorConfig, cache: A) -> Result<Self, ScenecastError> {
        let config = config.validated();
        let (event_tx, events) = event_queue();
        let router = CommandRouter::new();
        register_handlers(&router)?;

        Ok(Self {
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            ctx: SpectatorContext {
                connection: None,
                assets: AssetReceiver::new(config.platform, cache),
                scene: FrameSynchronizer::new(config.sync.clone()),
                camera: FrameSynchronizer::new(config.sync.clone()),
                perf: None,
            },
            config,
            events,
            event_tx,
            router,
            perf_diagnostics: false,
            latest_camera: None,
        })
    }

    pub fn config(&self) -> &SpectatorConfig {
        &self.config
    }

    /// Producer half of the event queue, for the transport.
    pub fn events_sender(&self) -> EventSender<C> {
        self.event_tx.clone()
    }

    pub fn router(&self) -> &CommandRouter<SpectatorContext<C, A>> {
        &self.router
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_connected()
    }

    pub fn asset_state(&self) -> AssetState {
        self.ctx.assets.state()
    }

    pub fn asset_status(&self) -> AssetStatus {
        self.ctx.assets.status()
    }

    /// A receiver woken on every asset state replacement.
    pub fn subscribe(&self) -> watch::Receiver<AssetState> {
        self.ctx.assets.subscribe()
    }

    pub fn assets(&self) -> &AssetReceiver<A> {
        &self.ctx.assets
    }

    /// Mutates the local cache outside a negotiation.
    pub fn update_cache(&mut self, f: impl FnOnce(&mut A)) {
        self.ctx.assets.update_cache(f);
    }

    /// The latest telemetry record from the host.
    pub fn perf(&self) -> Option<&PerfSnapshot> {
        self.ctx.perf.as_ref()
    }

    /// The newest camera pose applied in this session.
    pub fn latest_camera(&self) -> Option<CameraPose> {
        self.latest_camera
    }

    pub fn scene_stats(&self) -> SyncStats {
        self.ctx.scene.stats()
    }

    pub fn camera_stats(&self) -> SyncStats {
        self.ctx.camera.stats()
    }

    /// Asks the host to start or stop telemetry aggregation.
    ///
    /// The choice is remembered and re-sent on every new connection.
    ///
    /// # Errors
    /// The transport's send error, if connected and the send fails.
    pub fn set_perf_diagnostics(&mut self, enabled: bool) -> Result<(), ScenecastError> {
        self.perf_diagnostics = enabled;
        if !enabled {
            self.ctx.perf = None;
        }
        match &self.ctx.connection {
            Some(conn) => {
                conn.send(&PerfDiagnostics { enabled }.to_message()?)?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Sends an application-defined message to the host.
    ///
    /// # Errors
    /// [`ScenecastError::NotConnected`] without a connection, or the
    /// transport's send error.
    pub fn send(&self, message: &[u8]) -> Result<(), ScenecastError> {
        let conn = self
            .ctx
            .connection
            .as_ref()
            .ok_or(ScenecastError::NotConnected)?;
        conn.send(message)?;
        Ok(())
    }

    /// Runs one spectator frame. `dt` is the real time since the previous
    /// tick; it drives playback.
    pub fn tick(&mut self, dt: Duration) -> SpectatorFrame {
        self.process_events();

        if let Some(msg) = self.heartbeat.tick(dt, self.ctx.is_connected()) {
            self.ctx.send_logged(&msg);
        }

        let frame = SpectatorFrame {
            scene_deltas: self.ctx.scene.tick(dt),
            camera: self.ctx.camera.tick(dt),
        };
        if let Some(pose) = frame.latest_camera() {
            self.latest_camera = Some(*pose);
        }
        if !frame.is_empty() {
            trace!(
                scene = frame.scene_deltas.len(),
                camera = frame.camera.len(),
                "samples applied"
            );
        }
        frame
    }

    fn process_events(&mut self) {
        for event in self.events.drain() {
            match event {
                ConnectionEvent::Connected(conn) => {
                    if let Some(old) = self.ctx.connection.take() {
                        warn!(old = %old.id(), new = %conn.id(), "new connection replaces a live one");
                    }
                    info!(conn = %conn.id(), remote = conn.remote(), "connected to host");
                    self.ctx.connection = Some(conn);
                    self.ctx.reset_session();
                    self.latest_camera = None;

                    if let Some(request) = self.ctx.assets.on_connected() {
                        self.ctx.send_logged(&request);
                    }
                    if self.perf_diagnostics {
                        match (PerfDiagnostics { enabled: true }).to_message() {
                            Ok(msg) => self.ctx.send_logged(&msg),
                            Err(e) => warn!(error = %e, "failed to encode telemetry toggle"),
                        }
                    }
                }
                ConnectionEvent::Data(from, bytes) => {
                    let current = self.ctx.connection.as_ref().map(Connection::id);
                    if current != Some(from) {
                        trace!(%from, "data from stale connection, dropping");
                        continue;
                    }
                    if let Err(e) = self.router.dispatch(&mut self.ctx, &bytes) {
                        warn!(%from, error = %e, "malformed message, dropping");
                    }
                }
                ConnectionEvent::Disconnected(id) => {
                    let current = self.ctx.connection.as_ref().map(Connection::id);
                    if current != Some(id) {
                        trace!(conn = %id, "disconnect for stale connection, ignoring");
                        continue;
                    }
                    info!(conn = %id, "disconnected from host");
                    self.ctx.connection = None;
                    self.ctx.assets.on_disconnected();
                    self.ctx.reset_session();
                    self.latest_camera = None;
                }
            }
        }
    }
}

fn register_handlers<C: Connection, A: AssetCache>(
    router: &CommandRouter<SpectatorContext<C, A>>,
) -> Result<(), ProtocolError> {
    router.register(command::SYNC, |ctx: &mut SpectatorContext<C, A>, payload| {
        if let Some(SceneDelta { timestamp, data }) = decode_or_warn(payload) {
            if !ctx.scene.push(FrameSample::new(timestamp, data)) {
                trace!(timestamp, "scene delta rejected");
            }
        }
    })?;

    router.register(command::CAMERA, |ctx: &mut SpectatorContext<C, A>, payload| {
        if let Some(pose) = decode_or_warn::<CameraPose>(payload) {
            if !ctx.camera.push(FrameSample::new(pose.timestamp, pose)) {
                trace!(timestamp = pose.timestamp, "camera pose rejected");
            }
        }
    })?;

    router.register(command::PERF, |ctx: &mut SpectatorContext<C, A>, payload| {
        if let Some(report) = decode_or_warn::<PerfReport>(payload) {
            trace!(frames = report.frame_count, "telemetry report");
            ctx.perf = Some(PerfSnapshot::new(report));
        }
    })?;

    router.register(
        command::REPORT_ASSET_BUNDLE_INFO,
        |ctx: &mut SpectatorContext<C, A>, payload| {
            if let Some(report) = decode_or_warn::<BundleInfoReport>(payload) {
                if let Some(reply) = ctx.assets.handle_info_report(report) {
                    ctx.send_logged(&reply);
                }
            }
        },
    )?;

    router.register(
        command::REPORT_ASSET_BUNDLE_DOWNLOAD_START,
        |ctx: &mut SpectatorContext<C, A>, payload| {
            if let Some(start) = decode_or_warn::<DownloadStart>(payload) {
                if let Some(reply) = ctx.assets.handle_download_start(start) {
                    ctx.send_logged(&reply);
                }
            }
        },
    )?;

    router.register(
        command::REPORT_ASSET_BUNDLE_DOWNLOAD_DATA,
        |ctx: &mut SpectatorContext<C, A>, payload| {
            if let Some(reply) = ctx.assets.handle_chunk(payload) {
                ctx.send_logged(&reply);
            }
        },
    )?;

    Ok(())
}
