//! Send a single command to the nearest InkPoster frame
//!
//! Run with: cargo run --example send_command -- fetch [ADDRESS]
//!
//! Set `INKPOSTER_KEY` to the frame's 32-character hex key for frames in
//! secure mode.

use inkposter_ble::{Command, DeviceManager, Error, Result, SessionConfig};
use std::time::Duration;

fn parse_command(name: &str) -> Result<Command> {
    match name {
        "hello" => Ok(Command::Hello),
        "fetch" => Ok(Command::Fetch),
        "reboot" => Ok(Command::Reboot),
        "scan-networks" => Ok(Command::ScanNetworks),
        "ghosting-cleaner" => Ok(Command::GhostingCleaner),
        other => Err(Error::InvalidParameter {
            name: "command".to_string(),
            value: other.to_string(),
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inkposter_ble=debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let command = parse_command(args.next().as_deref().unwrap_or("hello"))?;
    let address = args.next();

    let mut config = SessionConfig::default();
    if let Ok(key) = std::env::var("INKPOSTER_KEY") {
        config = config.with_device_key(key);
    }

    let manager = DeviceManager::new().await?;

    // Peripherals are only resolvable once the adapter has seen them.
    manager.start_scanning().await?;
    println!("Looking for a frame...");

    let address = match address {
        Some(address) => {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
            while !manager
                .candidates()
                .keys()
                .any(|seen| seen.eq_ignore_ascii_case(&address))
            {
                if tokio::time::Instant::now() >= deadline {
                    return Err(Error::DeviceNotFound { address });
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            address
        }
        None => {
            let frame = manager.find_frame(Duration::from_secs(15)).await?;
            println!("Found {} ({})", frame.name, frame.address);
            frame.address
        }
    };
    manager.stop_scanning().await?;

    let mut session = manager.session(&address, config)?;
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  [{}] {}", event.address, event.state);
        }
    });

    let status = session.connect().await?;
    println!(
        "{} running {} at {}% battery, counter {}",
        status.model, status.firmware, status.battery_percent, status.freshness_counter
    );

    match session.send(&command).await {
        Ok(outcome) if outcome.is_confirmed() => println!("{} confirmed: {:?}", command, outcome),
        Ok(outcome) => println!("{} not confirmed: {:?}", command, outcome),
        Err(Error::DeviceNotReady { .. }) => {
            println!("Frame is busy; try again once it finishes refreshing");
        }
        Err(e) => return Err(e),
    }

    session.disconnect().await?;
    manager.shutdown().await?;
    Ok(())
}
