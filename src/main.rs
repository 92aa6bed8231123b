//! Quiz Arena Back binary entrypoint wiring REST, WebSocket, and session
//! store layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_arena_back::{
    config::AppConfig,
    dao::{
        content::{ContentConfig, HttpContentSource},
        session_store::http::{HttpSessionStore, SessionStoreConfig},
    },
    routes, services,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let content_url =
        env::var("CONTENT_API_URL").unwrap_or_else(|_| "http://localhost:3000/api".into());
    let content_token = env::var("CONTENT_API_TOKEN").ok();
    let content = HttpContentSource::new(ContentConfig {
        base_url: content_url,
        service_token: content_token,
    })
    .context("building content source client")?;

    let app_state = AppState::new(config, Arc::new(content));

    if let Ok(store_url) = env::var("SESSION_STORE_URL") {
        spawn_store_supervisor(app_state.clone(), store_url);
    } else {
        info!("SESSION_STORE_URL not set; running on the local snapshot store only");
    }

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Keep the external session store attached in the background, falling back
/// to the local store while it is unreachable.
fn spawn_store_supervisor(state: SharedState, store_url: String) {
    let namespace = env::var("SESSION_STORE_NAMESPACE").unwrap_or_else(|_| "quiz-arena".into());
    let token = env::var("SESSION_STORE_TOKEN").ok();

    tokio::spawn(services::storage_supervisor::run(state, move || {
        let config = SessionStoreConfig {
            base_url: store_url.clone(),
            namespace: namespace.clone(),
            token: token.clone(),
        };
        async move {
            let store = HttpSessionStore::connect(config).await?;
            Ok(Arc::new(store) as _)
        }
    }));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut term) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
