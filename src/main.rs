use anyhow::Result;
use clap::Parser;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

mod capture;
mod config;
mod conntrack;
mod forward;
mod logging;
mod packet;
mod relay;
mod shaper;

use conntrack::ConnectionTable;
use forward::Forwarder;
use relay::Relay;

#[derive(Parser, Debug)]
#[command(name = "console-udp-relay")]
#[command(about = "Transparent UDP relay that routes a game console's traffic through a traffic shaper")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// List available capture interfaces and exit
    #[arg(long)]
    list_interfaces: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_interfaces {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .init();
        capture::list_interfaces();
        return Ok(());
    }

    let config = config::load(&args.config)?;
    logging::init(&config)?;
    info!("console UDP relay starting");
    capture::list_interfaces();

    // Both capture sources must open before anything else runs; a bad
    // interface name is fatal and gets the listing repeated next to the
    // error for the operator.
    let console_capture = match capture::open(&config.console_interface) {
        Ok(capture) => capture,
        Err(e) => {
            error!("failed to open console-side capture: {:#}", e);
            capture::list_interfaces();
            return Err(e);
        }
    };
    let internet_capture = match capture::open(&config.internet_interface) {
        Ok(capture) => capture,
        Err(e) => {
            error!("failed to open internet-side capture: {:#}", e);
            capture::list_interfaces();
            return Err(e);
        }
    };

    let mut shaper_child = match shaper::launch(&config.shaper_path) {
        Ok(child) => child,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };
    info!("traffic shaper started: {}", config.shaper_path);

    let table = Arc::new(ConnectionTable::new());
    let forwarder = Arc::new(Forwarder::new(
        config.worker_count(),
        config.forward_queue_capacity,
    ));
    let relay = Arc::new(Relay::new(table, forwarder.clone()));

    {
        let relay = relay.clone();
        thread::spawn(move || relay.run_outbound(console_capture));
    }
    {
        let relay = relay.clone();
        thread::spawn(move || relay.run_inbound(internet_capture));
    }

    let stats_task = {
        let relay = relay.clone();
        let forwarder = forwarder.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            interval.tick().await;
            loop {
                interval.tick().await;
                let stats = forwarder.stats();
                info!(
                    "stats: {} console frames, {} response frames ({} unmatched), {} tracked flows, {} datagrams forwarded ({} bytes), {} dropped, {} errors",
                    relay.stats().outbound_frames.load(Ordering::Relaxed),
                    relay.stats().inbound_frames.load(Ordering::Relaxed),
                    relay.stats().unmatched_responses.load(Ordering::Relaxed),
                    relay.table().len(),
                    stats.sent_packets.load(Ordering::Relaxed),
                    stats.sent_bytes.load(Ordering::Relaxed),
                    stats.dropped.load(Ordering::Relaxed),
                    stats.errors.load(Ordering::Relaxed),
                );
            }
        })
    };

    // The shaper's lifetime bounds ours: when it exits, the relay is done.
    tokio::select! {
        status = shaper_child.wait() => match status {
            Ok(status) => info!("traffic shaper exited ({}), shutting down relay", status),
            Err(e) => error!("failed to wait on traffic shaper: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down relay");
            let _ = shaper_child.start_kill();
        }
    }

    stats_task.abort();
    forwarder.shutdown();

    let stats = forwarder.stats();
    info!(
        "final stats: {} datagrams forwarded ({} bytes), {} dropped, {} errors, {} flows tracked",
        stats.sent_packets.load(Ordering::Relaxed),
        stats.sent_bytes.load(Ordering::Relaxed),
        stats.dropped.load(Ordering::Relaxed),
        stats.errors.load(Ordering::Relaxed),
        relay.table().len(),
    );

    Ok(())
}
