use std::time::Duration;

use smartbus_g4::{Config, DeviceAddress, SmartBus};
use tokio::time::sleep;

/// Switches one channel on and off while polling its module.
///
/// Usage: relay_control [SUBNET DEVICE CHANNEL] [CONFIG.json]
#[tokio::main]
async fn main() -> smartbus_g4::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let number = |i: usize, default: u32| -> u32 {
        args.get(i).and_then(|s| s.parse().ok()).unwrap_or(default)
    };
    let address = DeviceAddress::try_new(number(0, 1), number(1, 27))?;
    let channel = number(2, 7);

    let config = match args.get(3) {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| smartbus_g4::Error::config(e.to_string()))?
        }
        None => Config {
            request_interval: Duration::from_secs(2),
            ..Default::default()
        },
    };

    println!("Smart-Bus G4 relay control");
    println!("- Device: {}", address);
    println!("- Channel: {}", channel);
    println!("- Broadcast: {}", config.broadcast_addr);

    let bus = SmartBus::connect(config).await?;
    let polling = bus.spawn_polling([address]);

    for round in 0..3 {
        println!("\nRound {}: on", round + 1);
        bus.set_relay(address, channel, 100).await?;
        sleep(Duration::from_secs(3)).await;
        report(&bus, address, channel);

        println!("Round {}: off", round + 1);
        bus.set_relay(address, channel, 0).await?;
        sleep(Duration::from_secs(3)).await;
        report(&bus, address, channel);
    }

    polling.shutdown().await?;
    println!("\nDone");
    Ok(())
}

fn report(bus: &SmartBus, address: DeviceAddress, channel: u32) {
    let state = u8::try_from(channel)
        .ok()
        .and_then(|channel| bus.read_last_known_state(address, channel));
    match state {
        Some(state) => println!("  state: on={} level={}", state.on, state.level),
        None => println!("  state: unknown"),
    }
}
