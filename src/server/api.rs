use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ Path, State },
    http::StatusCode,
};
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

use crate::error::RelayError;
use crate::models::chat::ConversationSummary;
use crate::relay::ChatRelay;
use super::AppContext;

/// The HTTP API is the shared-instance variant: a single relay session behind
/// a mutex, so requests against it are serialized.
#[derive(Clone)]
struct AppState {
    relay: Arc<Mutex<ChatRelay>>,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    conversation_id: String,
}

#[derive(Deserialize)]
struct SetModelRequest {
    name: String,
}

#[derive(Serialize)]
struct ModelResponse {
    model: String,
}

#[derive(Serialize)]
struct ClearedResponse {
    id: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_response(err: RelayError) -> ApiError {
    let status = match &err {
        RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: err.to_string() }))
}

pub async fn start_http_server(
    http_port: u16,
    context: AppContext
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let state = AppState {
        relay: Arc::new(Mutex::new(context.new_session())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/clear", post(clear_handler))
        .route("/api/conversations", get(list_conversations_handler))
        .route("/api/conversations/{id}/load", post(load_conversation_handler))
        .route("/api/models", get(list_models_handler))
        .route("/api/model", post(set_model_handler))
        .layer(cors)
        .with_state(state);

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    error!("HTTP server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            }
        }
    });

    info!("HTTP server started");
    Ok(())
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Json<ChatResponse>, ApiError> {
    let mut relay = state.relay.lock().await;
    let response = relay.generate(&req.message, req.temperature).await.map_err(error_response)?;
    let conversation_id = relay
        .current_conversation_id()
        .unwrap_or_default()
        .to_string();

    Ok(Json(ChatResponse { response, conversation_id }))
}

async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearedResponse>, ApiError> {
    let mut relay = state.relay.lock().await;
    let id = relay.clear_current_conversation().await.map_err(error_response)?;
    Ok(Json(ClearedResponse { id }))
}

async fn list_conversations_handler(
    State(state): State<AppState>
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let relay = state.relay.lock().await;
    let conversations = relay.list_conversations().await.map_err(error_response)?;
    Ok(Json(conversations))
}

async fn load_conversation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<StatusCode, ApiError> {
    let mut relay = state.relay.lock().await;
    relay.load_conversation(&id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_models_handler(
    State(state): State<AppState>
) -> Result<Json<Vec<String>>, ApiError> {
    let relay = state.relay.lock().await;
    let models = relay.available_models().await.map_err(error_response)?;
    Ok(Json(models))
}

async fn set_model_handler(
    State(state): State<AppState>,
    Json(req): Json<SetModelRequest>
) -> Result<Json<ModelResponse>, ApiError> {
    let mut relay = state.relay.lock().await;
    relay.set_model(&req.name);
    Ok(Json(ModelResponse { model: req.name }))
}
