use std::path::PathBuf;

use clap::Parser;
use nowplaying_client::{http, LiveStatusClient, NowPlayingView};
use nowplaying_proto::config::Config;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "now-playing", about = "Follow what is currently playing on the listening service")]
struct Args {
    /// Service host, overriding `endpoint.host`.
    #[arg(long)]
    host: Option<String>,

    /// Use ws:// instead of wss://.
    #[arg(long)]
    insecure: bool,

    /// Config file (default: ~/.config/now-playing/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve the status API even if disabled in config.
    #[arg(long)]
    http: bool,

    /// Print each transition as a JSON line instead of a headline.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = nowplaying_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = nowplaying_proto::platform::log_path();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,nowplaying_client=debug".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("now-playing log: {}", log_path.display());

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(host) = args.host {
        config.endpoint.host = host;
    }
    if args.insecure {
        config.endpoint.tls = false;
    }
    if args.http {
        config.http.enabled = true;
    }
    config.validate()?;
    info!("Config loaded, endpoint {}", config.endpoint.url());

    let mut client = LiveStatusClient::from_config(&config);
    let mut status_rx = client.subscribe();
    client.start();

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            client.subscribe(),
            config.embed.clone(),
            client.embed_ready(),
        );
    }

    let mut last_line = String::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                let line = if args.json {
                    serde_json::to_string(&status)?
                } else {
                    NowPlayingView::from_status(&status, &config.embed).headline()
                };
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
