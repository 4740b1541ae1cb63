use clap::Parser;
use parley::config::Config;
use parley::services::AuthService;
use parley::state::registry::Registry;
use parley::{logging, net, shutdown};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "parley", about = "A multi-user text conferencing server")]
struct Cli {
    /// TCP port to listen on (overrides config).
    port: Option<u16>,
    /// Stay chatty on stderr instead of logging quietly to the log file.
    #[arg(short, long)]
    debug: bool,
    /// Optional TOML config file; the environment is used otherwise.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    logging::init(&cfg, cli.debug)?;

    let auth = AuthService::new(cfg.passwd_file.clone());
    let registry = Arc::new(Registry::new(cfg, auth));

    wire_signals(registry.clone());
    tokio::spawn(shutdown::run(registry.clone()));
    spawn_detach_reaper(registry.clone());

    net::telnet::serve(registry).await?;
    Ok(())
}

/// SIGQUIT and SIGTERM start a 30-second shutdown; SIGHUP, SIGINT and
/// SIGPIPE are ignored.
fn wire_signals(registry: Arc<Registry>) {
    use tokio::signal::unix::{SignalKind, signal};

    for kind in [SignalKind::hangup(), SignalKind::interrupt(), SignalKind::pipe()] {
        if let Ok(mut sig) = signal(kind) {
            tokio::spawn(async move {
                loop {
                    sig.recv().await;
                }
            });
        }
    }

    for kind in [SignalKind::quit(), SignalKind::terminate()] {
        let registry = registry.clone();
        if let Ok(mut sig) = signal(kind) {
            tokio::spawn(async move {
                loop {
                    sig.recv().await;
                    if !registry.shutdown.is_active() {
                        tracing::info!("Shutdown requested by signal in 30 seconds.");
                        registry.announce(
                            "\u{7}\u{7}>>> This server will shutdown in 30 seconds... <<<\n\u{7}\u{7}",
                        );
                        registry.shutdown.schedule(shutdown::DEFAULT_GRACE_SECS);
                    }
                }
            });
        }
    }
}

/// Destroy sessions that stay detached longer than the configured timeout.
fn spawn_detach_reaper(registry: Arc<Registry>) {
    let timeout = registry.config.detach_timeout_secs;
    if timeout == 0 {
        return;
    }
    let timeout = Duration::from_secs(timeout);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            registry.reap_detached(timeout);
        }
    });
}
