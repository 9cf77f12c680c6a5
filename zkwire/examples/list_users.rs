//! Download users and attendance over UDP
//!
//! Set `DEVICE_CONFIG` to a TOML file, or `DEVICE_IP` for a quick run.

use tracing_subscriber::EnvFilter;
use zkwire::{Device, DeviceConfig, TransportKind};

#[tokio::main]
async fn main() -> zkwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("DEVICE_CONFIG") {
        Ok(path) => DeviceConfig::load(path)?,
        Err(_) => {
            let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());
            DeviceConfig::new(ip, 4370, TransportKind::Udp)
        }
    };

    println!("Connecting to {}:{} via {}...", config.address, config.port, config.transport);

    let mut device = Device::from_config(config);
    device.connect().await?;

    let info = device.get_device_info().await?;
    println!("✓ Device: {}", info);

    let capacity = device.read_capacity().await?;
    println!(
        "✓ Users {}/{}, records {}/{}",
        capacity.users, capacity.users_cap, capacity.records, capacity.records_cap
    );

    for user in device.list_users().await? {
        println!("  {}", user);
    }

    for record in device.list_attendance().await? {
        println!("  {}", record);
    }

    device.disconnect().await?;
    println!("✓ Disconnected");

    Ok(())
}
