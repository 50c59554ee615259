use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tether_core::database::{Database, SessionFactory};
use tether_core::models::{CoreError, CoreResult};
use tether_core::queries;
use tether_core::registry::SessionRegistry;
use tether_core::scope::SessionScope;
use tokio::net::TcpListener;

use crate::config::{ServerConfig, SessionMode};
use crate::error::{ApiError, ServerError};

#[derive(Clone, Debug)]
pub struct AppState {
    factory: SessionFactory,
    registry: &'static SessionRegistry,
    mode: SessionMode,
}

impl AppState {
    /// State backed by the process-wide session registry.
    pub fn new(factory: SessionFactory, mode: SessionMode) -> Self {
        Self::with_registry(factory, mode, SessionRegistry::global())
    }

    pub fn with_registry(
        factory: SessionFactory,
        mode: SessionMode,
        registry: &'static SessionRegistry,
    ) -> Self {
        Self {
            factory,
            registry,
            mode,
        }
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    pub fn registry(&self) -> &'static SessionRegistry {
        self.registry
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

impl RootResponse {
    pub fn hello() -> Self {
        Self {
            message: "Hello World",
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(root)).with_state(state)
}

async fn root(State(state): State<AppState>) -> Result<Json<RootResponse>, ApiError> {
    let (first, second) = match state.mode {
        SessionMode::Explicit => explicit_queries(&state).await?,
        SessionMode::Ambient => ambient_queries(&state).await?,
    };
    tracing::info!(first, second, mode = state.mode.as_str(), "queries finished");

    Ok(Json(RootResponse::hello()))
}

async fn explicit_queries(state: &AppState) -> CoreResult<(i64, i64)> {
    SessionScope::run(&state.factory, |session| async move {
        let first = queries::first_data(&session).await?;
        let second = queries::second_data(&session).await?;
        Ok::<_, CoreError>((first, second))
    })
    .await
}

async fn ambient_queries(state: &AppState) -> CoreResult<(i64, i64)> {
    let registry = state.registry;
    let guard = registry.register_current(state.factory.create()?)?;
    let entries = registry.keys()?;
    tracing::debug!(?entries, "registered session");

    let first = queries::ambient::first_data(registry).await?;
    let second = queries::ambient::second_data(registry).await?;

    let session = guard.session().clone();
    drop(guard);
    let entries = registry.keys()?;
    tracing::debug!(?entries, "unregistered session");
    session.close().await?;

    Ok((first, second))
}

pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let database = Database::open(config.database.clone()).map_err(ServerError::Database)?;
    let state = AppState::new(SessionFactory::new(database), config.session_mode);

    let address = config.bind_address();
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ServerError::Bind { address, source })?;
    tracing::info!(%address, mode = config.session_mode.as_str(), "listening");

    serve_listener(listener, state)
        .await
        .map_err(ServerError::Serve)
}

/// Serves on an already bound listener until ctrl-c.
pub async fn serve_listener(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
