//! Example: Setpoint and Wait
//!
//! Connects to a Volcano, turns the heater on, writes a setpoint, and
//! blocks until the chamber reports the target reached.
//!
//! Run with: `cargo run --example set_temperature -- <DEVICE_ADDRESS> <CELSIUS>`

use std::env;
use std::time::Duration;

use volcano_core::{Coordinator, CoordinatorConfig, Error};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let (address, celsius) = match args.as_slice() {
        [_, address, celsius] => (address.clone(), celsius.parse::<f32>()?),
        _ => {
            eprintln!("Usage: {} <DEVICE_ADDRESS> <CELSIUS>", args[0]);
            eprintln!();
            eprintln!("Example:");
            eprintln!("  {} CE:9E:A6:43:25:F3 180", args[0]);
            std::process::exit(1);
        }
    };

    let coordinator = Coordinator::new(CoordinatorConfig::new(&address))?;

    println!("Connecting to {}...", address);
    coordinator.connect_wait().await?;

    println!("Heating to {:.1} °C...", celsius);
    coordinator.heat_on().await?;

    match coordinator
        .set_temperature_wait_with_timeout(celsius, Duration::from_secs(300))
        .await
    {
        Ok(()) => {
            let state = coordinator.state();
            println!(
                "Target reached: chamber at {:.1} °C",
                state.current_temperature.unwrap_or(celsius)
            );
        }
        Err(Error::Timeout { .. }) => {
            eprintln!("Gave up waiting; the heater keeps ramping in the background.");
        }
        Err(e) => return Err(e.into()),
    }

    coordinator.stop().await;
    Ok(())
}
