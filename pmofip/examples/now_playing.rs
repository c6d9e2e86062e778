//! Example: Follow the track playing on a FIP channel
//!
//! Run with: cargo run -p pmofip --example now_playing
//! Or with a specific channel: cargo run -p pmofip --example now_playing -- fip_jazz
//! A config file can be given as second argument (default: config.yaml).

use std::env;

use pmofip::{ChannelTracker, TrackerConfig, ALL_CHANNELS};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pmofip=info")),
        )
        .init();

    let channel = env::args().nth(1).unwrap_or_else(|| "fip".to_string());
    let config_path = env::args()
        .nth(2)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config = TrackerConfig::load(&config_path)?;
    let tracker = ChannelTracker::with_http(&config)?;

    tracker.subscribe(|track| match track {
        Some(track) => println!("♪ {}", track.display()),
        None => println!("♪ (nothing playing)"),
    });

    if let Err(e) = tracker.set_active_channel(channel.as_str()) {
        eprintln!("{}", e);
        eprintln!("Known channels:");
        for descriptor in ALL_CHANNELS.iter() {
            eprintln!("  {:<16} {}", descriptor.slug, descriptor.display_name);
        }
        return Ok(());
    }

    println!("Following {} (Ctrl-C to quit)\n", channel);
    tokio::signal::ctrl_c().await?;

    tracker.stop();
    Ok(())
}
