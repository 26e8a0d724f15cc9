use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use subvault::core::auth::WriteGate;
use subvault::core::config::AppConfig;
use subvault::core::shutdown::{ShutdownCoordinator, SHUTDOWN_TIMEOUT_SECS};
use subvault::delivery::router::{self, AppState};
use subvault::library::{LibrarySettings, SubtitleLibrary};
use subvault::observability::metrics as obs_metrics;
use subvault::storage::StoreBackend;

#[tokio::main]
async fn main() -> ExitCode {
    // Install panic hook: log panics with full backtrace and increment counter.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        obs_metrics::inc_panic_total();
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    // Load configuration (layered: default.toml → {env}.toml → env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "subvault starting");

    // The recorder must be installed before any metric is recorded.
    let metrics_handle = if config.observability.metrics_enabled {
        match obs_metrics::install_prometheus_recorder() {
            Ok(handle) => {
                obs_metrics::describe_all_metrics();
                handle
            }
            Err(e) => {
                error!(error = %e, "failed to install Prometheus recorder");
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("metrics disabled, /metrics will be empty");
        obs_metrics::detached_handle()
    };

    let shutdown = ShutdownCoordinator::new();
    let gate = Arc::new(WriteGate::new(&config.auth));

    let store = match StoreBackend::from_config(&config.storage).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, backend = %config.storage.backend, "failed to initialize storage");
            return ExitCode::FAILURE;
        }
    };
    info!(backend = store.name(), bucket = %config.storage.bucket, "storage initialized");
    if store.name() == "memory" {
        warn!("in-memory storage: subtitles are lost on restart");
    }

    let library = Arc::new(SubtitleLibrary::new(
        store,
        LibrarySettings::from_config(&config.upload, &config.storage),
    ));

    let start_time = std::time::Instant::now();
    let http_addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, host = %config.server.host, "invalid HTTP bind address");
            return ExitCode::FAILURE;
        }
    };

    let app_state = AppState {
        library,
        gate: gate.clone(),
        config: Arc::new(config),
        start_time,
        metrics_handle,
    };
    let app = router::build_router(app_state);

    let uptime_cancel = shutdown.token();
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let listener = match tokio::net::TcpListener::bind(http_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%http_addr, error = %e, "failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };

    info!(%http_addr, "HTTP server listening");

    let shutdown_token = shutdown.token();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
        {
            error!(error = %e, "HTTP server error");
        }
    });

    let reload_gate = gate.clone();
    let reload_cancel = shutdown.token();
    tokio::spawn(async move {
        run_config_reload_task(reload_gate, reload_cancel).await;
    });

    shutdown.wait_for_signal_and_shutdown().await;

    // The server drains in-flight requests once the token fires.
    obs_metrics::set_shutdown_in_progress(true);
    info!("draining HTTP server");
    match tokio::time::timeout(std::time::Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), server).await {
        Ok(_) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Err(_) => {
            error!(
                "shutdown timed out after {}s, forcing exit",
                SHUTDOWN_TIMEOUT_SECS
            );
            ExitCode::FAILURE
        }
    }
}

/// Reload configuration on SIGHUP and swap in the new write secrets.
///
/// Only the write secrets are hot-reloaded; everything else takes effect on
/// the next start.
async fn run_config_reload_task(gate: Arc<WriteGate>, cancel: tokio_util::sync::CancellationToken) {
    let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGHUP handler, config reload disabled");
            return;
        }
    };

    info!("SIGHUP config reload task started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("config reload task shutting down");
                return;
            }
            _ = sighup.recv() => {
                info!("received SIGHUP, reloading configuration");
                match AppConfig::load() {
                    Ok(new_config) => {
                        let count = new_config.auth.write_secrets.len();
                        gate.update_secrets(new_config.auth.write_secrets);
                        if gate.is_open_mode() {
                            warn!("reloaded configuration has no write secrets, write gate is open");
                        }
                        obs_metrics::inc_config_reload("success");
                        info!(write_secrets = count, "configuration reloaded successfully");
                    }
                    Err(e) => {
                        obs_metrics::inc_config_reload("failure");
                        error!(error = %e, "failed to reload configuration on SIGHUP, keeping current config");
                    }
                }
            }
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
