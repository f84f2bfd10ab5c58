pub mod config;
mod metrics;
mod routes;
mod state;
mod watch;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use axum::middleware;
use axum::routing::get;
use axum::Router;
use hub_registry::Catalog;
use tokio::sync::oneshot;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use self::config::{resolve_serve, HubConfig, ServeArgs};
use self::metrics::{handle_metrics, record_scan, track_metrics};
use self::routes::{
    handle_app_categories, handle_get_app, handle_get_template, handle_health, handle_landing,
    handle_list_apps, handle_list_templates, handle_readyz, handle_search_apps,
    handle_search_templates, handle_template_categories,
};
use self::state::AppState;
use self::watch::watch_roots;

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/templates", get(handle_list_templates))
        .route("/templates/categories", get(handle_template_categories))
        .route("/templates/search", get(handle_search_templates))
        .route("/templates/{id}", get(handle_get_template))
        .route("/apps", get(handle_list_apps))
        .route("/apps/categories", get(handle_app_categories))
        .route("/apps/search", get(handle_search_apps))
        .route("/apps/{id}", get(handle_get_app))
}

fn app(state: Arc<AppState>) -> Router {
    // The hub is public and read-only.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(300));

    Router::new()
        .route("/", get(handle_landing))
        .route("/health", get(handle_health))
        .route("/readyz", get(handle_readyz))
        .route("/metrics", get(handle_metrics))
        .nest("/api/v1", api_routes())
        .layer(middleware::from_fn(track_metrics))
        .layer(cors)
        .layer(CompressionLayer::new())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                process::exit(1);
            }
        };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = sigterm.recv() => {},
    }

    #[cfg(not(unix))]
    ctrl_c.await.ok();
}

pub async fn run_serve(args: ServeArgs) {
    // Load config from file if it exists
    let config = HubConfig::load(&args.roots.config);
    let settings = resolve_serve(&args, &config);

    info!(
        port = settings.port,
        templates = %settings.catalog.templates_dir.display(),
        apps = %settings.catalog.apps_dir.display(),
        cache_ttl_minutes = settings.catalog.cache_ttl.as_secs() / 60,
        "starting hub"
    );

    let catalog = Arc::new(Catalog::new(settings.catalog.clone()).on_scan(record_scan));
    let init = Arc::clone(&catalog);
    match tokio::task::spawn_blocking(move || init.initialize()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "failed to initialize registry");
            process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "registry initialization task failed");
            process::exit(1);
        }
    }

    // Spawn file watcher if --watch is enabled
    if settings.watch {
        tokio::spawn(watch_roots(Arc::clone(&catalog)));
    }

    let state = Arc::new(AppState::new(catalog));
    let addr = settings.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(addr = %addr, error = %e, "failed to bind");
            process::exit(1);
        });
    info!("hub listening on http://{}", addr);

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown_signal().await;
        info!("shutdown signal received, finishing in-flight requests");
        let _ = signalled_tx.send(());
    };

    let server = async move {
        axum::serve(listener, app(state))
            .with_graceful_shutdown(shutdown)
            .await
    };

    // In-flight requests get the grace period, then the process stops anyway.
    let grace = settings.shutdown_grace;
    let deadline = async move {
        if signalled_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                process::exit(1);
            }
            info!("hub stopped gracefully");
        }
        _ = deadline => {
            warn!(grace_secs = grace.as_secs(), "grace period elapsed, forcing shutdown");
            // Pending blocking tasks would otherwise hold the runtime open.
            process::exit(0);
        }
    }
}
