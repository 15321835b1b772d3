//! Preamp Remote CLI
//!
//! Command-line front end for the preamp's WebSocket remote.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use preamp_remote::{
    load_config, AdjustSeparator, ClientHandle, Config, FixedCommand, MemoryPanel, SyncClient,
    SyncEvent,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn, Level};

#[derive(Parser)]
#[command(name = "preamp-remote")]
#[command(about = "Live state sync client for the VxD preamp web remote")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Preamp host (overrides config file)
    #[arg(long)]
    host: Option<String>,

    /// Preamp HTTP port (overrides config file)
    #[arg(long)]
    port: Option<u16>,

    /// Adjust command separator: colon or letter_s (overrides config file)
    #[arg(long)]
    separator: Option<AdjustSeparator>,

    /// Seconds to wait for the preamp's state before giving up
    #[arg(long, default_value = "10")]
    wait_seconds: u64,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = parse_log_level)]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay connected and print every state update
    Monitor,

    /// Toggle power
    Power,

    /// Step volume up
    VolumeUp,

    /// Step volume down
    VolumeDown,

    /// Select the next input
    InputUp,

    /// Select the previous input
    InputDown,

    /// Move a control to a value
    Set {
        /// Control id, e.g. Volume
        control: String,

        /// New value
        value: String,
    },
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid log level: {}. Use: trace, debug, info, warn, error",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    debug!(
        "Parsed command line arguments: config={:?}, host={:?}, port={:?}, separator={:?}, log_level={:?}",
        args.config, args.host, args.port, args.separator, args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        debug!("Using default configuration");
        Config::default()
    };

    if let Some(host) = args.host {
        config.gateway.host = host;
    }
    if args.port.is_some() {
        config.gateway.port = args.port;
    }
    if let Some(separator) = args.separator {
        config.commands.separator = separator;
    }

    let panel = MemoryPanel::new(config.panel.elements.iter().cloned());
    let client = SyncClient::new(&config, panel)?;
    let wait = Duration::from_secs(args.wait_seconds);

    info!("Preamp gateway: {}", client.url());

    let handle = client.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(client.run());

    match args.command {
        Commands::Monitor => monitor(&handle, &mut events).await,
        Commands::Power => send_fixed(&handle, &mut events, FixedCommand::PowerToggle, wait).await?,
        Commands::VolumeUp => send_fixed(&handle, &mut events, FixedCommand::VolumeUp, wait).await?,
        Commands::VolumeDown => {
            send_fixed(&handle, &mut events, FixedCommand::VolumeDown, wait).await?
        }
        Commands::InputUp => send_fixed(&handle, &mut events, FixedCommand::InputUp, wait).await?,
        Commands::InputDown => {
            send_fixed(&handle, &mut events, FixedCommand::InputDown, wait).await?
        }
        Commands::Set { control, value } => {
            wait_for_state(&mut events, wait).await?;
            handle.adjust(control, value)?;
            settle(&mut events).await;
        }
    }

    handle.shutdown();
    let panel = task.await?;
    print!("{}", panel.render());

    Ok(())
}

async fn send_fixed(
    handle: &ClientHandle,
    events: &mut broadcast::Receiver<SyncEvent>,
    command: FixedCommand,
    wait: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    wait_for_state(events, wait).await?;
    handle.send_fixed(command)?;
    settle(events).await;
    Ok(())
}

async fn monitor(handle: &ClientHandle, events: &mut broadcast::Receiver<SyncEvent>) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::StateApplied { snapshot, report }) => {
                    for (field, value) in snapshot.iter() {
                        println!("{}={}", field, value.render());
                    }
                    if !report.is_complete() {
                        warn!("Unmapped elements: {:?}", report.missing);
                    }
                }
                Ok(SyncEvent::Disconnected { reason }) => warn!("Disconnected: {}", reason),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }
    handle.shutdown();
}

/// Wait for the first state message after connecting
async fn wait_for_state(
    events: &mut broadcast::Receiver<SyncEvent>,
    wait: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(SyncEvent::StateApplied { .. }) => return Ok(()),
                Ok(SyncEvent::Disconnected { reason }) => warn!("Disconnected: {}", reason),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err("sync client stopped".to_string()),
            }
        }
    })
    .await;

    match result {
        Ok(inner) => inner.map_err(Into::into),
        Err(_) => Err(format!("No state received from the preamp within {:?}", wait).into()),
    }
}

/// Give the preamp a moment to broadcast the state the command produced
async fn settle(events: &mut broadcast::Receiver<SyncEvent>) {
    if wait_for_state(events, Duration::from_secs(2)).await.is_err() {
        debug!("No state update after command");
    }
}
