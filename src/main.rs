//! Presence relay binary entrypoint wiring the game feed, roster poller, dashboard and ledger.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use presence_relay::{
    config::AppConfig,
    dao::{file_store::JsonFileStore, record_store::RecordStore},
    routes,
    services::{
        feed_producer,
        notifier::{self, Notifier},
        persistence, poll_producer,
    },
    state::{AppState, Registry, SharedState, ledger::Ledger, presence::PresenceBook},
};
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store: Arc<dyn RecordStore> = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    let registry = load_registry(store.as_ref(), &config).await;

    let (persist, writers) = persistence::spawn_writers(store.clone());
    let sink: Arc<dyn Notifier> = match notifier::from_config(config.notifications.as_ref()) {
        Ok(sink) => sink,
        Err(err) => {
            error!(error = %err, "failed to build webhook client; notifications are only logged");
            Arc::new(notifier::LogNotifier)
        }
    };
    let (notifications, dispatcher) = notifier::spawn_dispatcher(sink);

    let app_state = AppState::new(config, registry, persist, notifications);
    let producers = spawn_producers(&app_state);
    let flusher = tokio::spawn(persistence::run_periodic_flush(
        app_state.clone(),
        app_state.config().persist_interval,
    ));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

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

    // Stop every source of writes, let the writers drain, then write the final state once.
    flusher.abort();
    for producer in producers {
        producer.abort();
    }
    app_state.persistence().stop_writers();
    for writer in writers {
        if let Err(err) = writer.await {
            warn!(error = %err, "persistence writer ended abnormally");
        }
    }
    persistence::flush_now(&app_state, store.as_ref()).await;
    dispatcher.abort();
    info!("shutdown complete");

    Ok(())
}

/// Restore persisted state. Unreadable collections start empty rather than blocking startup.
async fn load_registry(store: &dyn RecordStore, config: &AppConfig) -> Registry {
    let watched = store.load_watched().await.unwrap_or_else(|err| {
        warn!(error = %err, "failed to load watch list; starting empty");
        Vec::new()
    });
    let ledger = store.load_ledger().await.unwrap_or_else(|err| {
        warn!(error = %err, "failed to load ledger; starting empty");
        Default::default()
    });
    info!(
        watched = watched.len(),
        requests = ledger.requests.len(),
        members = ledger.members.len(),
        "restored persisted state"
    );

    Registry::new(
        PresenceBook::from_entities(watched),
        Ledger::from_entity(ledger, &config.admin_handles),
    )
}

/// Start the configured presence sources. Either may be absent.
fn spawn_producers(state: &SharedState) -> Vec<JoinHandle<()>> {
    let config = state.config();
    let mut producers = Vec::new();

    match &config.feed {
        Some(feed) => {
            producers.push(tokio::spawn(feed_producer::run(state.clone(), feed.clone())));
        }
        None => info!("no game feed configured"),
    }

    match &config.poll {
        Some(poll) => match poll_producer::build_client(poll) {
            Ok(client) => {
                producers.push(tokio::spawn(poll_producer::run(
                    state.clone(),
                    client,
                    poll.clone(),
                )));
            }
            Err(err) => error!(error = %err, "failed to build roster poll client; polling disabled"),
        },
        None => info!("no roster poll configured"),
    }

    producers
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
