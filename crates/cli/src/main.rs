use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    clap::Parser,
    secrecy::Secret,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    onebridge_config::BridgeConfig,
    onebridge_convert::{Normalizer, ident},
    onebridge_media::{CleanupTask, MediaCache},
    onebridge_onebot::{ClientConfig, TargetClient},
    onebridge_server::AppState,
    onebridge_wcf::SourceClient,
};

#[derive(Parser)]
#[command(name = "onebridge", about = "onebridge — WCF to OneBot message bridge")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long)]
    port: Option<u16>,

    /// Media cache directory (overrides config value).
    #[arg(long, env = "ONEBRIDGE_STORAGE")]
    storage_path: Option<String>,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = BridgeConfig::from_env();
    if let Some(bind) = cli.bind {
        config.listen.host = bind;
    }
    if let Some(port) = cli.port {
        config.listen.port = port;
    }
    if let Some(path) = cli.storage_path {
        config.storage.path = path;
    }

    // The bridge cannot announce itself without its own identity; treat an
    // absent one as a fatal startup condition.
    let source = SourceClient::new(config.source.base_url())
        .context("failed to build source relay client")?;
    if !source.is_logged_in().await {
        anyhow::bail!("source relay is not logged in at {}", config.source.base_url());
    }
    let identity = source
        .self_identity()
        .await
        .context("source relay did not report the bridge's own identity")?;
    let self_id = ident::derive(&identity);
    info!(identity, self_id, "bridge identity resolved");

    let media = Arc::new(
        MediaCache::new(config.storage.path.as_str())
            .context("failed to open the media cache")?,
    );
    let cleanup = CleanupTask::new(&media);
    cleanup.start();

    let target = TargetClient::spawn(ClientConfig {
        url: config.target.ws_url(),
        access_token: config.target.access_token.clone().map(Secret::new),
        self_id,
    });

    let state = AppState {
        normalizer: Arc::new(Normalizer::new(self_id, media)),
        target: target.clone(),
    };

    let addr: SocketAddr = format!("{}:{}", config.listen.host, config.listen.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.listen.host, config.listen.port
            )
        })?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("ctrl-c handler unavailable");
            return;
        }
        info!("shutdown requested");
        signal.cancel();
    });

    onebridge_server::serve(addr, state, shutdown).await?;

    cleanup.stop();
    target.shutdown();
    info!("bridge stopped");
    Ok(())
}
