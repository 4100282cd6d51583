use anyhow::Context;
use pmoconfig::{encryption, get_config};
use pmolastfm::{LastFmConfigExt, LastFmServerExt, RadioRelay};
use pmoserver::{LoggingOptions, ServerBuilder, init_logging};
use tracing::{error, info};

const USAGE: &str = "\
Usage:
  PMORadio                   relay the configured Last.fm station
  PMORadio encrypt <secret>  print an encrypted value for config.yaml

Configuration is read from $PMORELAY_CONFIG, ./.pmorelay or ~/.pmorelay.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None => run().await,
        Some("encrypt") => {
            let secret = args.get(1).context("missing value to encrypt")?;
            println!("{}", encryption::encrypt_password(secret)?);
            Ok(())
        }
        Some("-h") | Some("--help") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown argument {other:?}\n\n{USAGE}");
            std::process::exit(2);
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // ========== PHASE 1 : Configuration et logs ==========
    let config = get_config();
    init_logging(LoggingOptions::from_config());
    info!("Configuration loaded from {}", config.path());

    // ========== PHASE 2 : Authentification Last.fm ==========
    let username = config.get_lastfm_username()?;
    info!("📻 Logging in to Last.fm as {}...", username);

    let relay = match RadioRelay::from_config(&config).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("Authentication failed: {:#}", e);
            return Err(e.context("cannot start the relay without a Last.fm session"));
        }
    };

    // ========== PHASE 3 : Démarrage du serveur ==========
    let mut server = ServerBuilder::new_configured().build();
    server.attach_relay(relay);

    info!("🌐 Starting relay server...");
    server.start().await?;

    info!(
        "✅ Point your player at http://localhost:{}/",
        config.get_http_port()
    );
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    Ok(())
}
