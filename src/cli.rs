// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Taking photos
//! - Recording videos
//!
//! All commands run against the simulated camera platform.

use camera_engine::backends::camera::sim::SimPlatform;
use camera_engine::backends::camera::types::{CameraBackendType, SensorOrientation};
use camera_engine::backends::camera::{CameraListener, select_backend_type};
use camera_engine::config::Config;
use camera_engine::errors::CameraError;
use camera_engine::flow::{CaptureFlow, Product};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Preview view size used by the CLI, a landscape 1080p window
const VIEW_WIDTH: u32 = 1920;
const VIEW_HEIGHT: u32 = 1080;

/// Prints session events to the terminal
struct ConsoleListener;

impl CameraListener for ConsoleListener {
    fn on_flash_support(&self, supported: bool) {
        info!(supported, "Flash support");
    }

    fn on_sensor_orientation_changed(&self, old: SensorOrientation, new: SensorOrientation) {
        info!(%old, %new, "Orientation changed");
    }

    fn on_error(&self, error: CameraError) {
        error!(error = %error, "Camera error");
        eprintln!("Camera error: {}", error);
    }

    fn on_picture_taken(&self, picture: &Path, _thumbnail: &Path) {
        info!(path = %picture.display(), "Picture taken");
    }

    fn on_video_recorded(&self, video: &Path, _thumbnail: &Path) {
        info!(path = %video.display(), "Video recorded");
    }
}

/// List all available cameras
pub fn list_cameras(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let sim = SimPlatform::standard();
    let platform = sim.full_platform();

    let Some(hal) = platform.modern.as_ref() else {
        println!("No cameras found.");
        return Ok(());
    };
    let ids = hal.camera_ids()?;
    if ids.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for id in &ids {
        let c = hal.characteristics(id)?;
        let facing = c
            .lens_facing
            .map(|f| f.to_string())
            .unwrap_or_else(|| "external".to_string());
        println!("  [{}] {} camera, sensor at {}°", id, facing, c.sensor_orientation);

        if let Some(sizes) = &c.output_sizes {
            // Show top 3 resolutions
            let res_strs: Vec<String> = sizes.iter().take(3).map(|s| s.to_string()).collect();
            println!("      Sizes: {}", res_strs.join(", "));
        }
        println!(
            "      Flash: {}, auto-focus modes: {}, max zoom: {}",
            if c.flash_available { "yes" } else { "no" },
            c.af_available_modes.len(),
            c.max_digital_zoom
                .map(|z| format!("{:.1}x", z))
                .unwrap_or_else(|| "none".to_string())
        );
        println!("      Hardware level: {:?}", c.hardware_level);

        if let Some(facing) = c.lens_facing {
            let backend = select_backend_type(&platform, config.only_legacy_api, facing)?;
            let api = match backend {
                CameraBackendType::Legacy => "legacy API",
                CameraBackendType::Modern => "session API",
            };
            println!("      Driven through the {}", api);
        }
        println!();
    }

    Ok(())
}

/// Take a photo with the configured camera
pub fn take_photo(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let sim = SimPlatform::standard();
    let (flow, result) = CaptureFlow::new(sim.full_platform(), config, Arc::new(ConsoleListener))?;
    println!("Using the {} camera", flow.engine().options().facing);

    flow.resume()?;
    flow.open(VIEW_WIDTH, VIEW_HEIGHT);
    flow.engine().wait_idle();

    println!("Capturing...");
    flow.click();
    flow.engine().wait_idle();

    flow.confirm();
    print_products(&result.blocking_recv()?);
    Ok(())
}

/// Record a video with the configured camera
pub fn record_video(
    config: Config,
    duration: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let target_duration = duration
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.max_video_record_duration());

    let sim = SimPlatform::standard();
    let (mut flow, result) =
        CaptureFlow::new(sim.full_platform(), config, Arc::new(ConsoleListener))?;
    println!("Using the {} camera", flow.engine().options().facing);
    println!("Duration: {} seconds", target_duration.as_secs());

    flow.resume()?;
    flow.open(VIEW_WIDTH, VIEW_HEIGHT);
    flow.engine().wait_idle();

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");
    if !flow.long_press_start()? {
        println!("The camera is busy, nothing was recorded.");
        return Ok(());
    }

    // Wait for duration, the configured maximum or Ctrl+C
    let start = Instant::now();
    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if flow.enforce_max_duration()? {
            println!();
            println!("Maximum recording length reached.");
            break;
        }

        // Print progress
        let elapsed = start.elapsed().as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    flow.long_press_stop()?;
    flow.engine().wait_idle();

    flow.confirm();
    print_products(&result.blocking_recv()?);
    Ok(())
}

fn print_products(products: &[Product]) {
    if products.is_empty() {
        println!("Nothing was captured.");
        return;
    }
    for product in products {
        let kind = if product.is_video { "Video" } else { "Photo" };
        println!("{} saved: {}", kind, product.file.display());
        println!("  Thumbnail: {}", product.thumbnail.display());
    }
}
