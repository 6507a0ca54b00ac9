//! `POST /clp`: sign a CLP test message with a local key and broadcast it.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing::warn;
use zeroize::Zeroizing;

use super::ClpMsg;
use crate::chain::ChainBackend;
use crate::chain::ChainClient;
use crate::chain::ChainError;
use crate::chain::KeybaseClient;
use crate::chain::SignRequest;
use crate::keys::KeyStore;
use crate::models::msg::Msg;
use crate::models::tx::BroadcastMode;
use crate::models::tx::BroadcastResult;

/// Body of `POST /clp`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClpTestRequest {
    pub test: String,
    /// Name of the local key that signs.
    pub name: String,
    pub password: String,
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
    pub gas: u64,
}

/// Errors answered with their status code and the raw error text.
#[derive(Debug)]
pub enum RestError {
    BadRequest(String),
    Unauthorized(String),
    Internal(String),
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        match self {
            RestError::BadRequest(text) => (StatusCode::BAD_REQUEST, text),
            RestError::Unauthorized(text) => (StatusCode::UNAUTHORIZED, text),
            RestError::Internal(text) => (StatusCode::INTERNAL_SERVER_ERROR, text),
        }
        .into_response()
    }
}

impl From<ChainError> for RestError {
    fn from(error: ChainError) -> Self {
        match error {
            ChainError::Signing(source) => RestError::Unauthorized(source.to_string()),
            other => RestError::Internal(other.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RestState {
    keystore: Arc<dyn KeyStore>,
    backend: Arc<dyn ChainBackend>,
}

impl RestState {
    pub fn new(keystore: Arc<dyn KeyStore>, backend: Arc<dyn ChainBackend>) -> Self {
        Self { keystore, backend }
    }
}

pub fn router(state: RestState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::POST, axum::http::Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    axum::Router::new()
        .route("/clp", axum::routing::post(post_clp_test))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_rest_server(listener: TcpListener, state: RestState) -> anyhow::Result<()> {
    info!("REST server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn post_clp_test(
    State(state): State<RestState>,
    body: Bytes,
) -> Result<Json<BroadcastResult>, RestError> {
    let request: ClpTestRequest =
        serde_json::from_slice(&body).map_err(|e| RestError::BadRequest(e.to_string()))?;

    let key = state
        .keystore
        .get(&request.name)
        .await
        .map_err(|e| RestError::Unauthorized(e.to_string()))?;
    let msg = Msg::Clp(ClpMsg::Test {
        sender: key.address,
        test: request.test,
    });

    let client = KeybaseClient::new(
        state.keystore.clone(),
        state.backend.clone(),
        request.chain_id,
    );
    let result = client
        .sign_and_broadcast(SignRequest {
            from_name: request.name,
            password: Zeroizing::new(request.password),
            msgs: vec![msg],
            gas: request.gas,
            account_number: request.account_number,
            sequence: request.sequence,
            mode: BroadcastMode::Sync,
        })
        .await
        .inspect_err(|e| warn!("CLP test message failed: {e}"))?;

    Ok(Json(result))
}
