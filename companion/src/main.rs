mod config;
mod event;
mod lcu;
mod lockfile;
mod navigation;
mod paths;
mod runtime;
mod session;
mod status;
mod stream;
mod tls;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::event::CompanionEvent;
use crate::runtime::Runtime;
use crate::session::Controller;
use crate::status::{HostShell, StatusFileShell};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dpm_companion=info")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = match paths::app_data_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!(error = %e, "cannot resolve app data directory");
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        error!(dir = %app_dir.display(), error = %e, "failed to create app data directory");
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path(&app_dir);
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!(error = ?e, "config error; using defaults");
        config::Config::default()
    });

    // ── TLS for the loopback API ──────────────────────────────────────────────
    let tls = match tls::loopback_client_config() {
        Ok(tls) => tls,
        Err(e) => {
            error!(error = %e, "failed to build TLS configuration");
            std::process::exit(1);
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel::<CompanionEvent>(64);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(CompanionEvent::Shutdown).await;
            }
        });
    }

    info!(version = env!("CARGO_PKG_VERSION"), "dpm-companion started");

    let mut shell = StatusFileShell::new(paths::status_file_path(&app_dir));
    let mut controller = Controller::new(initial_config);
    let mut runtime = Runtime::new(event_tx, tls);

    for command in controller.start() {
        runtime.execute(command, &mut shell);
    }
    shell.report(controller.status());

    // ── Event loop ────────────────────────────────────────────────────────────
    // Single consumer: events are handled strictly in arrival order.
    while let Some(evt) = event_rx.recv().await {
        if matches!(evt, CompanionEvent::Shutdown) {
            info!("shutting down");
            break;
        }
        for command in controller.handle(evt) {
            runtime.execute(command, &mut shell);
        }
        shell.report(controller.status());
    }

    runtime.shutdown().await;
}
