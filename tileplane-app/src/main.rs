use anyhow::{Context, Result};
use tileplane::{
    prelude::{Instant, LatLng, Point, TileLayerOptions},
    rendering::Camera,
    runtime::{self, spawners::tokio_impl::TokioSpawner},
    TileLayer,
};

const FRAME: std::time::Duration = std::time::Duration::from_millis(16);
const FRAMES: u64 = 1_800;

/// Camera pose for a frame of the scripted flight: a descent from orbit,
/// a tilt, then a pan eastwards.
fn flight_pose(frame: u64) -> (Point, f64, f64) {
    let t = frame as f64;
    if frame < 600 {
        let height = 2_000_000.0 * (1_500.0f64 / 2_000_000.0).powf(t / 600.0);
        (Point::new(0.0, 0.0), height, 0.0)
    } else if frame < 900 {
        let pitch = 55.0 * (t - 600.0) / 300.0;
        (Point::new(0.0, 0.0), 1_500.0, pitch)
    } else {
        let east = (t - 900.0) * 12.0;
        (Point::new(east, 0.0), 1_500.0, 55.0)
    }
}

fn parse_origin() -> Result<LatLng> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => Ok(LatLng::new(47.3769, 8.5417)),
        [lat, lng] => Ok(LatLng::new(
            lat.parse().context("latitude is not a number")?,
            lng.parse().context("longitude is not a number")?,
        )),
        _ => anyhow::bail!("usage: tileplane-app [<lat> <lng>]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    runtime::init_runtime(Box::new(TokioSpawner::new(tokio::runtime::Handle::current())));

    let origin = parse_origin()?;
    let options = TileLayerOptions {
        origin,
        debug_overlay: true,
        ..TileLayerOptions::openstreetmap()
    };
    let mut layer = TileLayer::http(options).context("building tile layer")?;
    log::info!("streaming tiles around {:?}", origin);

    let mut ticker = tokio::time::interval(FRAME);
    for frame in 0..FRAMES {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
                break;
            }
        }

        let (focus, height, pitch) = flight_pose(frame);
        let mut camera = Camera::looking_at_ground(focus, height, pitch, 60.0, 16.0 / 9.0);
        layer.update(&camera.frame_input(), Instant::now());

        if frame % 60 == 0 {
            let telemetry = serde_json::to_string(layer.telemetry())?;
            log::info!("frame {}: {}", frame, telemetry);
            if let Some(overlay) = layer.debug_overlay() {
                log::debug!(
                    "overlay: {} desired rects, viewport {:?}",
                    overlay.desired.len(),
                    overlay.viewport
                );
            }
        }
    }

    let telemetry = layer.telemetry();
    log::info!(
        "done: {} tiles cached, {} ready, {} fetched, {} failed, {} stale",
        telemetry.tile_count,
        telemetry.ready_count,
        telemetry.fetches_dispatched,
        telemetry.fetches_failed,
        telemetry.stale_responses
    );
    Ok(())
}
