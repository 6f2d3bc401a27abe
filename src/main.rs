use std::net::SocketAddr;

use drill_backend::config::Config;
use drill_backend::db::DatabaseProxy;
use drill_backend::logging::init_tracing;
use drill_backend::services::llm_provider::LLMProvider;
use drill_backend::services::topics::seed_default_topics;
use drill_backend::state::AppState;
use drill_backend::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    let db_proxy = match DatabaseProxy::from_config(&config).await {
        Ok(proxy) => proxy,
        Err(err) => {
            tracing::error!(
                error = %err,
                path = %config.database_path.display(),
                "failed to open database"
            );
            std::process::exit(1);
        }
    };

    if let Err(err) = seed_default_topics(&db_proxy).await {
        tracing::warn!(error = %err, "could not initialize default topics");
    }

    let addr = config.bind_addr();
    let sweep_schedule = config.rate_limit.sweep_schedule.clone();
    let state = AppState::with_llm(config, db_proxy.clone(), LLMProvider::from_env());

    let worker_manager = match WorkerManager::new(state.rate_limiter(), sweep_schedule).await {
        Ok(manager) => {
            if let Err(e) = manager.start().await {
                tracing::error!(error = %e, "failed to start workers");
            }
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "worker manager not initialized");
            None
        }
    };

    let app = drill_backend::create_app(state);

    tracing::info!(%addr, "drill-backend listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener failed");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }
    db_proxy.close().await;

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
