use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use murmur_api::attachments::HttpBlobStore;
use murmur_api::delivery::Delivery;
use murmur_api::middleware::require_auth;
use murmur_api::profiles::HttpProfileDirectory;
use murmur_api::state::{AppState, AppStateInner};
use murmur_api::{conversations, messages};
use murmur_gateway::Presence;
use murmur_gateway::connection;
use murmur_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    presence: Presence,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("MURMUR_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("MURMUR_DB_PATH").unwrap_or_else(|_| "murmur.db".into());
    let host = std::env::var("MURMUR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("MURMUR_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let blob_upload_url = std::env::var("MURMUR_BLOB_UPLOAD_URL")
        .unwrap_or_else(|_| "http://localhost:3100/files".into());
    let blob_public_url = std::env::var("MURMUR_BLOB_PUBLIC_URL")
        .unwrap_or_else(|_| "http://localhost:3100/files".into());
    let profile_url =
        std::env::var("MURMUR_PROFILE_URL").unwrap_or_else(|_| "http://localhost:3200".into());

    // Init database
    let db = Arc::new(murmur_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let presence = Presence::new();
    let attachments = Arc::new(HttpBlobStore::new(blob_upload_url, blob_public_url));
    let profiles = Arc::new(HttpProfileDirectory::new(profile_url));
    let delivery = Delivery::new(db.clone(), presence.clone(), attachments);

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        delivery,
        profiles,
    });

    // Routes
    let dm_routes = Router::new()
        .route("/dm/messages", post(messages::send_message))
        .route("/dm/{other_user_id}/messages", get(messages::get_messages))
        .route("/dm/conversations", get(conversations::list_conversations))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(ServerState {
        presence,
        jwt_secret,
    });

    let app = Router::new()
        .merge(dm_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Murmur server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct GatewayAuth {
    token: String,
}

/// WebSocket upgrade. The token is validated here so the socket enters
/// the delivery loop already authenticated.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(auth): Query<GatewayAuth>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token_data = decode::<Claims>(
        &auth.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id = token_data.claims.sub;
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, state.presence, user_id)))
}
