//! Example: Live State Monitoring
//!
//! Connects to a Volcano, subscribes to state changes, and prints every
//! update until interrupted. The coordinator keeps reconnecting on its own
//! if the device goes away.
//!
//! Run with: `cargo run --example monitor -- <DEVICE_ADDRESS>`

use std::env;

use volcano_core::{Coordinator, CoordinatorConfig, Field};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Get the device address from the command line
    let args: Vec<String> = env::args().collect();
    let address = if args.len() > 1 {
        args[1].clone()
    } else {
        eprintln!("Usage: {} <DEVICE_ADDRESS>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} CE:9E:A6:43:25:F3", args[0]);
        std::process::exit(1);
    };

    let coordinator = Coordinator::new(CoordinatorConfig::new(&address))?;
    let mut changes = coordinator.subscribe();

    println!("Connecting to {}...", address);
    coordinator.connect_wait().await?;
    println!("Connected. Watching for changes (Ctrl-C to quit).");
    println!();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => {
                let Ok(change) = change else { break };
                let state = &change.state;

                if change.changed.contains(&Field::ConnectionStatus) {
                    println!("link: {}", state.connection_status);
                }
                if change.changed.contains(&Field::CurrentTemperature) {
                    if let Some(celsius) = state.current_temperature {
                        println!(
                            "chamber: {:.1} °C (target {:?})",
                            celsius, state.target_temperature
                        );
                    }
                }
                if change.changed.contains(&Field::Heat)
                    || change.changed.contains(&Field::Pump)
                {
                    println!("heat: {} / pump: {}", state.heat, state.pump);
                }
                if change.changed.contains(&Field::SignalStrength) {
                    if let Some(dbm) = state.signal_strength_dbm {
                        println!("signal: {} dBm", dbm);
                    }
                }
            }
        }
    }

    println!("Shutting down...");
    coordinator.stop().await;
    Ok(())
}
