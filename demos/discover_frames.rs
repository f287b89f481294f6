//! Basic demo: Discover all nearby InkPoster frames
//!
//! Run with: cargo run --example discover_frames

use inkposter_ble::{DeviceManager, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inkposter_ble=debug".parse().unwrap()),
        )
        .init();

    println!("Starting InkPoster frame discovery...");
    println!("Frames advertise while idle; tap the frame if it is asleep.\n");

    let manager = DeviceManager::new().await?;

    let _handle = manager.on_frame_discovered(|frame| {
        println!("\nDiscovered frame:");
        println!("  Name: {}", frame.name);
        println!("  Address: {}", frame.address);
        println!("  RSSI: {:?} dBm", frame.rssi);

        match frame.status() {
            Ok(status) => {
                println!("  Model: {}", status.model);
                println!("  Firmware: {}", status.firmware);
                println!("  Battery: {}%", status.battery_percent);
                println!("  Wi-Fi quality: {}", status.wifi_quality);
                println!("  Counter: {}", status.freshness_counter);
                println!("  Secure mode: {}", status.secure_mode());
                println!("  Ready for commands: {}", status.launcher_cmd_ready());
            }
            Err(e) => println!("  Status: unreadable ({})", e),
        }
    });

    manager.start_scanning().await?;

    println!("Scanning for 30 seconds...");
    println!("Press Ctrl+C to exit early.\n");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(30)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
        }
    }

    let frames = manager.candidates();
    println!("\n--- Scan Complete ---");
    println!("Total frames found: {}", frames.len());

    for (address, frame) in frames {
        println!("  {} - {} (RSSI: {:?})", frame.name, address, frame.rssi);
    }

    manager.shutdown().await?;
    println!("\nDone!");

    Ok(())
}
