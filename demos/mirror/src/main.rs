//! Runs a host and a spectator in one process over a real WebSocket.
//!
//! The host orbits its camera and emits a small scene delta every frame;
//! the spectator downloads the host's bundle, then logs what it plays
//! back. `RUST_LOG=debug` shows the negotiation and transfer.

use std::time::Duration;

use bytes::Bytes;
use scenecast::prelude::*;
use scenecast::init_tracing;
use scenecast_protocol::DEFAULT_PORT;
use scenecast_transport::{WebSocketConnection, WebSocketListener, connect};
use tracing::{info, warn};

const RUN_FOR: Duration = Duration::from_secs(10);

fn demo_bundle() -> Bundle {
    let mesh: Vec<u8> = (0..600_000u32).map(|i| (i % 251) as u8).collect();
    let mut writer = BundleWriter::new();
    writer
        .add("text", "title", b"Orbit Room")
        .add("blob", "mesh/floor", &mesh);
    writer.finish("Orbit Room")
}

fn orbit(t: f32) -> HostFrame {
    let (sin, cos) = (t * 0.5).sin_cos();
    let half = t * 0.25;
    HostFrame::new(t)
        .with_camera(
            [cos * 3.0, 1.5, sin * 3.0],
            [0.0, half.sin(), 0.0, half.cos()],
        )
        .with_scene_delta(Bytes::copy_from_slice(&t.to_le_bytes()))
}

#[tokio::main]
async fn main() -> Result<(), ScenecastError> {
    init_tracing();

    let mut catalog = BundleCatalog::new();
    catalog.insert(Platform::StandaloneWindows, demo_bundle())?;
    let mut host: Host<WebSocketConnection> = Host::new(HostConfig::default(), catalog)?;
    let mut spectator: Spectator<WebSocketConnection, RegistryCache> = Spectator::new(
        SpectatorConfig::for_platform(Platform::StandaloneWindows),
        RegistryCache::new(CodecRegistry::with_builtin()),
    )?;
    spectator.set_perf_diagnostics(true)?;

    let addr = format!("127.0.0.1:{}", host.config().port);
    let listener = WebSocketListener::bind(&addr).await?;
    let host_events = host.events_sender();
    tokio::spawn(async move {
        if let Err(e) = listener.run(host_events).await {
            warn!(error = %e, "listener stopped");
        }
    });
    connect(&format!("ws://127.0.0.1:{DEFAULT_PORT}"), spectator.events_sender()).await?;

    let mut states = spectator.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state.progress {
                Some(p) => info!(status = %state.status, received = p.received, total = p.total, "asset state"),
                None => info!(status = %state.status, name = ?state.display_name, error = ?state.error, "asset state"),
            }
        }
    });

    let mut scheduler = TickScheduler::new(TickConfig::default());
    let mut applied = 0usize;
    loop {
        let tick = scheduler.wait_for_tick().await;
        if tick.elapsed >= RUN_FOR {
            break;
        }

        host.tick(tick.dt, &orbit(tick.elapsed.as_secs_f32()));
        let frame = spectator.tick(tick.dt);
        applied += frame.scene_deltas.len();

        if let Some(frame_time) = scheduler.record_tick_end() {
            host.perf_mut().record_duration("frame", frame_time);
        }

        if tick.tick % 60 == 0 {
            if let Some(pose) = spectator.latest_camera() {
                info!(
                    t = pose.timestamp,
                    x = pose.position[0],
                    z = pose.position[2],
                    applied,
                    "spectator camera"
                );
            }
            if let Some(perf) = spectator.perf() {
                info!(
                    frames = perf.frame_count(),
                    tick_ms = ?perf.average_millis("tick"),
                    "host telemetry"
                );
            }
        }
    }

    let stats = spectator.scene_stats();
    info!(
        applied = stats.applied,
        discarded = stats.discarded,
        fast_forwards = stats.fast_forwards,
        metrics = ?scheduler.metrics(),
        "demo finished"
    );
    Ok(())
}
