//! REST API over a [`Chain`].
//!
//! Routes live under `/api`. Bodies are JSON with camelCase fields and ether
//! amounts as decimal strings; errors are `{"error": "..."}`.

mod fallback;
mod handlers;
mod views;

use std::fmt;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, error, info};

use crate::chain::Chain;
use crate::config::Environment;
use crate::error::{Error, Result};

pub use handlers::DEFAULT_DURATION_DAYS;
pub use views::{
    AccessView, CitationsView, DataSource, DatasetView, ExperimentDetails, ExperimentView,
    InvestmentView, NftsView, PortfolioView, ProjectView, TokenView, TransactionView, TxResponse,
};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The chain provider.
    pub chain: Arc<dyn Chain>,
    /// Decides how failed experiment writes are answered.
    pub environment: Environment,
}

impl AppState {
    /// Create the handler state.
    #[must_use]
    pub fn new(chain: Arc<dyn Chain>, environment: Environment) -> Self {
        Self { chain, environment }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("chain", &self.chain.name())
            .field("environment", &self.environment)
            .finish()
    }
}

/// An error answered to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Create an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status of the error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_permission_error() {
            StatusCode::FORBIDDEN
        } else if err.is_conflict() {
            StatusCode::CONFLICT
        } else if err.is_rejected() {
            StatusCode::BAD_REQUEST
        } else if err.is_chain_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            debug!("Request rejected ({}): {}", status, err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// A JSON request body whose rejections are answered as [`ApiError`]s.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let status = match rejection {
                    JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    _ => StatusCode::BAD_REQUEST,
                };
                debug!("Rejected request body ({}): {}", status, rejection.body_text());
                Err(ApiError::new(status, rejection.body_text()))
            }
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/accounts", get(handlers::accounts))
        .route("/api/experiments", get(handlers::list_experiments))
        .route("/api/experiments/create", post(handlers::create_experiment))
        .route("/api/experiments/{id}", get(handlers::get_experiment))
        .route("/api/experiments/{id}/fund", post(handlers::fund_experiment))
        .route("/api/datasets", get(handlers::list_datasets))
        .route("/api/datasets/upload", post(handlers::upload_dataset))
        .route("/api/datasets/{id}", get(handlers::get_dataset))
        .route("/api/datasets/{id}/nftize", post(handlers::nftize_dataset))
        .route("/api/datasets/{id}/purchase", post(handlers::purchase_access))
        .route("/api/datasets/{id}/cite", post(handlers::cite_dataset))
        .route("/api/datasets/{id}/citations", get(handlers::dataset_citations))
        .route(
            "/api/datasets/{id}/access/{address}",
            get(handlers::dataset_access),
        )
        .route("/api/tokens/{id}", get(handlers::token))
        .route("/api/accounts/{address}/nfts", get(handlers::account_nfts))
        .route("/api/portfolio/{address}", get(handlers::portfolio))
        .with_state(state)
}

/// Serve the API on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "API listening on http://{} ({}, {} provider)",
        listener.local_addr()?,
        state.environment,
        state.chain.name()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}
