//! eqconnect: console client entry point.
//!
//! ```text
//! eqconnect                      Connect to the configured or last host
//! eqconnect --host <h> [--port]  Connect to a specific server
//! eqconnect --config <path>      Load a custom config TOML
//! eqconnect --gen-config         Write the default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eqconnect_cli::commands::{self, Command, HELP};
use eqconnect_cli::config::ClientConfig;
use eqconnect_core::{
    ClientEvent, Endpoint, EqualizerClient, FilterEvent, JsonFileStore, KeyValueStore,
    LAST_ADDRESS, MemoryStore, PlaybackEvent, SendOutcome,
};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "eqconnect", about = "Remote control for an equalizer server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "eqconnect.toml")]
    config: PathBuf,

    /// Server host, overriding the config and the remembered address.
    #[arg(long)]
    host: Option<String>,

    /// Server port, overriding the config.
    #[arg(short, long)]
    port: Option<u16>,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        ClientConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let config = ClientConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("eqconnect v{}", env!("CARGO_PKG_VERSION"));

    let mut store: Box<dyn KeyValueStore> = match config.settings_path() {
        Some(path) => Box::new(JsonFileStore::open(path)),
        None => Box::new(MemoryStore::new()),
    };

    let host = cli
        .host
        .clone()
        .filter(|h| !h.is_empty())
        .or_else(|| Some(config.network.host.clone()).filter(|h| !h.is_empty()))
        .or_else(|| Some(store.get_string(LAST_ADDRESS)).filter(|h| !h.is_empty()));
    let Some(host) = host else {
        eprintln!("no server host given; pass --host or set network.host");
        std::process::exit(2);
    };
    let endpoint = Endpoint::new(host.clone(), cli.port.unwrap_or(config.network.port));

    let mut client =
        EqualizerClient::new(config.to_transport_config(), config.to_session_config());
    let mut client_events = client.subscribe();
    let mut filter_events = client.filters().subscribe();
    let mut playback_events = client.playback().subscribe();

    println!("connecting to {endpoint}...");
    if let Err(e) = client.connect(endpoint).await {
        warn!(error = %e, "connect failed");
        eprintln!("{}", e.status_message());
        std::process::exit(1);
    }
    if let Err(e) = store.save(LAST_ADDRESS, &host) {
        warn!(error = %e, "could not remember server address");
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = client.poll() => {
                if event.is_none() {
                    break;
                }
            }
            Some(event) = client_events.recv() => match event {
                ClientEvent::Connected(endpoint) => println!("connected to {endpoint}"),
                ClientEvent::Disconnected => {
                    println!("disconnected");
                    break;
                }
                ClientEvent::ConnectionLost { reason } => {
                    println!("connection lost: {reason}");
                    client.disconnect().await;
                }
                ClientEvent::MessageRejected { message, reason } => {
                    println!("ignored server message {message:?}: {reason}");
                }
            },
            Some(event) = filter_events.recv() => print_filter_event(&client, event),
            Some(event) = playback_events.recv() => print_playback_event(event),
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match commands::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => println!("{HELP}"),
                    Ok(Some(Command::Status)) => print_status(&client),
                    Ok(Some(Command::Intent(intent))) => match client.apply(intent).await {
                        Ok(SendOutcome::Sent) => {}
                        Ok(SendOutcome::Blocked) => println!("nothing sent"),
                        Ok(SendOutcome::Disconnected) => println!("not connected"),
                        Err(e) => println!("error: {e}"),
                    },
                    Err(message) => println!("{message}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

fn print_filter_event(client: &EqualizerClient, event: FilterEvent) {
    match event {
        FilterEvent::Added(indices) | FilterEvent::Changed(indices) => {
            for index in indices {
                if let Some(filter) = client.filters().filter(index) {
                    println!(
                        "band {index}: {:.0} Hz, {:+.1} dB, Q {:.2}",
                        filter.frequency(),
                        filter.gain(),
                        filter.q()
                    );
                }
            }
        }
        FilterEvent::Removed(indices) => println!("removed bands {indices:?}"),
        FilterEvent::PreampChanged(db) => println!("preamp: {db:+.1} dB"),
        FilterEvent::EqualizerApplied(applied) => {
            println!("equalizer {}", if applied { "on" } else { "bypassed" })
        }
    }
}

fn print_playback_event(event: PlaybackEvent) {
    match event {
        PlaybackEvent::TrackChanged { field, value } => println!("{}: {value}", field.name()),
        PlaybackEvent::PlayingChanged(playing) => {
            println!("{}", if playing { "playing" } else { "paused" })
        }
    }
}

fn print_status(client: &EqualizerClient) {
    let session = client.session();
    println!("session: {}", session.phase());
    if let Some(endpoint) = session.endpoint() {
        println!("server: {endpoint}");
    }

    let track = client.playback().track();
    println!(
        "track: {} - {} ({})",
        track.artist,
        track.title,
        if client.playback().is_playing() { "playing" } else { "paused" }
    );

    let filters = client.filters();
    println!(
        "equalizer: {}, preamp {:+.1} dB",
        if filters.is_equalizer_applied() { "on" } else { "bypassed" },
        filters.preamp_gain()
    );
    for (index, filter) in filters.filters().iter().enumerate() {
        println!(
            "  band {index}: {:.0} Hz, {:+.1} dB{}",
            filter.frequency(),
            filter.gain(),
            if filter.is_locked() { " (locked)" } else { "" }
        );
    }
}
