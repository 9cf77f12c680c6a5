//! Device control example

use std::time::Duration;

use chrono::Local;
use tokio::time::sleep;
use zkwire::Device;

#[tokio::main]
async fn main() -> zkwire::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());

    let mut device = Device::new(ip, 4370);
    device.connect().await?;

    println!("Device connected!");

    // Disable device (show "Working...")
    println!("Disabling device...");
    device.disable_device().await?;
    device.write_lcd(1, "Syncing...").await?;
    sleep(Duration::from_secs(3)).await;

    println!("Device clock: {}", device.get_time().await?);
    device.set_time(&Local::now().naive_local()).await?;

    // Enable device (resume normal operation)
    println!("Enabling device...");
    device.clear_lcd().await?;
    device.enable_device().await?;

    device.unlock_door(Duration::from_secs(3)).await?;

    println!("Done!");

    device.disconnect().await?;

    Ok(())
}
