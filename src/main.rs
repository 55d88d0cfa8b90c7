//! Kart Server Demo
//!
//! Runs an authority session with two clients over the in-process loopback
//! hub: one drives a kart (including one out-of-range steering command), the
//! other only watches. Verifies the observer reproduces the authority's
//! published pose exactly and that the recorded inputs replay to the same
//! final state.

use std::time::Duration;

use anyhow::{bail, Context};
use glam::Vec3;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kart_replication::{
    core::hash::{pose_hash, short_hex},
    network::{AuthoritySession, ClientReplica, LoopbackHub, PoseSnapshot},
    vehicle::{Plane, PlaneWorld},
    ControlAxis, Pose, Settings, VehicleId, NETWORK_UPDATE_RATE, TICK_RATE, VERSION,
};

/// Demo length in ticks (8 seconds at 60 Hz).
const DEMO_TICKS: u32 = 480;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Kart Server v{}", VERSION);
    info!("Tick Rate: {} Hz, Network Rate: {} Hz (default)", TICK_RATE, NETWORK_UPDATE_RATE);

    let settings = Settings::from_env().context("failed to load settings")?;
    let vehicle_config = settings.vehicle_config().context("invalid vehicle settings")?;
    info!(
        tick_rate = settings.session.tick_rate,
        network_update_rate = settings.session.network_update_rate,
        steering = ?vehicle_config.steering,
        "Settings loaded"
    );

    // A wall 60 m ahead of the start line
    let world = PlaneWorld::new(vec![Plane::through(Vec3::new(6000.0, 0.0, 0.0), Vec3::NEG_X)]);

    let (hub, endpoint) = LoopbackHub::new(256);
    let mut session = AuthoritySession::new(settings.session, vehicle_config, endpoint);

    let driven_id = VehicleId::new([0xD1; 16]);
    let parked_id = VehicleId::new([0x9A; 16]);
    let driven_spawn = Pose::IDENTITY;
    let parked_spawn = Pose::with_yaw(Vec3::new(0.0, 800.0, 0.0), std::f32::consts::FRAC_PI_2);

    let mut driver = ClientReplica::new(hub.connect(), vehicle_config);
    let mut observer = ClientReplica::new(hub.connect(), vehicle_config);
    session.spawn(driven_id, driver.connection_id(), driven_spawn)?;
    // The observer owns the parked kart but never drives it
    session.spawn(parked_id, observer.connection_id(), parked_spawn)?;

    driver.possess(driven_id, driven_spawn);
    driver.observe(parked_id, parked_spawn)?;

    observer.observe(driven_id, driven_spawn)?;
    observer.observe(parked_id, parked_spawn)?;

    demo_drive(&mut session, &mut driver, &mut observer, &world, driven_id)?;
    verify_replay(&session, &world, driven_id)?;
    demo_run_loop(session, &mut observer, world).await?;

    Ok(())
}

/// Drive one kart for a few seconds, tick by tick.
fn demo_drive(
    session: &mut AuthoritySession,
    driver: &mut ClientReplica,
    observer: &mut ClientReplica,
    world: &PlaneWorld,
    driven_id: VehicleId,
) -> anyhow::Result<()> {
    info!("=== Driving Demo ===");

    let dt = session.config().dt();
    let mut last_published: Option<PoseSnapshot> = None;
    let mut total_rejected = 0;

    for t in 0..DEMO_TICKS {
        // Scripted driver: accelerate, turn left, send an illegal steering
        // value, straighten out.
        match t {
            0 => driver.set_input(ControlAxis::Throttle, 1.0)?,
            120 => driver.set_input(ControlAxis::Steering, -0.4)?,
            200 => driver.set_input(ControlAxis::Steering, 5.0)?,
            230 => driver.set_input(ControlAxis::Steering, 0.0)?,
            _ => {}
        }

        let result = session.run_tick(world);
        total_rejected += result.inputs_rejected;
        if let Some(snapshot) = result.published.iter().find(|s| s.vehicle_id == driven_id) {
            last_published = Some(*snapshot);
        }

        driver.frame(dt, world);
        observer.frame(dt, world);

        if t % TICK_RATE == 0 {
            if let Some(vehicle) = session.vehicle(&driven_id) {
                let state = vehicle.state();
                info!(
                    "Tick {}: pos=({:.0}, {:.0}) speed={:.2} m/s hash={}",
                    t,
                    state.pose.position.x,
                    state.pose.position.y,
                    state.speed(),
                    short_hex(&state.compute_hash())
                );
            }
        }
    }
    observer.process_messages();

    let authority = session
        .vehicle(&driven_id)
        .context("driven vehicle missing from session")?;
    info!("=== Results ===");
    info!("Final State Hash: {}", hex::encode(authority.state().compute_hash()));
    info!(
        "Rejected inputs: {} this run, {} steering on the vehicle",
        total_rejected,
        authority.rejection_count(ControlAxis::Steering)
    );

    let published = last_published.context("authority never published a pose")?;
    let watched = observer
        .observed(&driven_id)
        .context("observer lost the driven vehicle")?;
    let published_hash = published.pose_hash();
    let observed_hash = pose_hash(&watched.pose());
    info!("Published Pose Hash: {}", hex::encode(published_hash));
    info!("Observed Pose Hash:  {}", hex::encode(observed_hash));
    if published_hash != observed_hash {
        bail!("observer pose differs from last published pose");
    }
    info!("REPLICATION VERIFIED: observer matches the authority's last snapshot");

    if let Some(local) = driver.driven() {
        let drift = local.pose().position.distance(authority.pose().position);
        info!("Driver prediction drift: {:.3} units", drift);
    }

    Ok(())
}

/// Re-simulate the driven kart from its input log.
fn verify_replay(session: &AuthoritySession, world: &PlaneWorld, driven_id: VehicleId) -> anyhow::Result<()> {
    info!("=== Verifying Determinism ===");

    let Some(replayed) = session.replay_vehicle(&driven_id, world)? else {
        warn!("Input recording disabled, skipping replay check");
        return Ok(());
    };
    let live = session
        .vehicle(&driven_id)
        .context("driven vehicle missing from session")?
        .state()
        .compute_hash();
    let replay = replayed.compute_hash();

    info!("Replay State Hash: {}", hex::encode(replay));
    if live != replay {
        bail!("DETERMINISM FAILURE: hashes differ");
    }
    info!("DETERMINISM VERIFIED: Hashes match!");
    Ok(())
}

/// Run the session on its real-time loop briefly, then shut it down.
async fn demo_run_loop(
    session: AuthoritySession,
    observer: &mut ClientReplica,
    world: PlaneWorld,
) -> anyhow::Result<()> {
    info!("=== Real-Time Loop ===");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let start_tick = session.tick();
    let handle = tokio::spawn(session.run(world, shutdown_rx));

    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(()).context("session loop already stopped")?;
    let session = handle.await.context("session task panicked")?;

    let handled = observer.process_messages();
    info!(
        "Ran {} ticks in real time, observer handled {} messages, authority gone: {}",
        session.tick() - start_tick,
        handled,
        observer.server_gone()
    );
    Ok(())
}
