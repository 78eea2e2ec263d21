//! HTTP and WebSocket surface
//!
//! Key issuance and validation, user accounts with bearer tokens, the latest
//! stored report, and a WebSocket feed of broker events.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::auth::{AccessToken, TokenIssuer};
use crate::broker::Broker;
use crate::config::Config;
use crate::error::{ButterflyError, Result};
use crate::rate_limiter::RateLimiter;
use crate::storage::{Database, KeyStore, ReportStore, UserStore};

/// Response to `POST /api_key`
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedKey {
    /// The new bearer token
    pub api_key: String,
    /// RFC 3339 expiry
    pub expires_at: String,
}

/// Body of `POST /register` (JSON) and `POST /token` (form)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Clear-text password, hashed before storage
    pub password: String,
}

/// Per-route request limits
#[derive(Clone)]
struct Limiters {
    keys: RateLimiter,
    register: RateLimiter,
    login: RateLimiter,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    key_store: KeyStore,
    report_store: ReportStore,
    users: UserStore,
    tokens: TokenIssuer,
    broker: Broker,
    limiters: Limiters,
    started: Instant,
}

impl AppState {
    /// State over `db` with lifetimes, limits and the token secret taken
    /// from `config`
    pub fn from_config(db: Database, config: &Config, broker: Broker) -> Self {
        Self {
            key_store: KeyStore::new(db.clone(), config.keys.validity_days),
            report_store: ReportStore::new(db.clone()),
            users: UserStore::new(db),
            tokens: TokenIssuer::from_config(config),
            broker,
            limiters: Limiters {
                keys: RateLimiter::per_minute(config.server.key_requests_per_minute),
                register: RateLimiter::per_minute(config.server.register_requests_per_minute),
                login: RateLimiter::per_minute(config.server.login_requests_per_minute),
            },
            started: Instant::now(),
        }
    }
}

type ApiError = (StatusCode, ResponseJson<Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, ResponseJson(json!({ "detail": detail.into() })))
}

fn internal(e: ButterflyError) -> ApiError {
    error!("Request failed: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

fn client_key(addr: Option<ConnectInfo<SocketAddr>>) -> String {
    addr.map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn check_limit(limiter: &RateLimiter, client: &str, route: &str) -> std::result::Result<(), ApiError> {
    if limiter.try_acquire(client).await {
        Ok(())
    } else {
        warn!(%client, route, "request rate limited");
        Err(api_error(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"))
    }
}

/// Runs a store call off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ButterflyError::Message(format!("store task failed: {}", e)))?
}

/// Create the router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api_key", post(issue_key).delete(revoke_key))
        .route("/authenticate", get(authenticate))
        .route("/register", post(register))
        .route("/token", post(login))
        .route("/users/me", get(current_user))
        .route("/reports/latest", get(latest_report))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Root endpoint - returns basic service information
async fn index() -> ResponseJson<Value> {
    ResponseJson(json!({
        "service": "butterfly",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "API keys and live notifications for codebase health reports",
        "endpoints": {
            "health": "/health",
            "api_key": "/api_key",
            "authenticate": "/authenticate",
            "register": "/register",
            "token": "/token",
            "current_user": "/users/me",
            "latest_report": "/reports/latest",
            "websocket": "/ws"
        }
    }))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> ResponseJson<Value> {
    ResponseJson(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.started.elapsed().as_secs(),
        "subscribers": state.broker.subscriber_count().await,
    }))
}

/// Issue a new API key, rate limited per client address
async fn issue_key(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
) -> std::result::Result<ResponseJson<IssuedKey>, ApiError> {
    let client = client_key(addr);
    check_limit(&state.limiters.keys, &client, "/api_key").await?;

    let store = state.key_store.clone();
    match blocking(move || store.issue()).await.map_err(internal)? {
        Some(record) => {
            info!(%client, "Issued API key");
            Ok(ResponseJson(IssuedKey {
                api_key: record.key,
                expires_at: record.expires_at.to_rfc3339(),
            }))
        }
        None => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not generate a unique API key",
        )),
    }
}

/// Revoke the presented key
async fn revoke_key(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> std::result::Result<ResponseJson<Value>, ApiError> {
    let store = state.key_store.clone();
    let key = bearer.token().to_string();
    let revoked = blocking(move || store.revoke(&key)).await.map_err(internal)?;
    Ok(ResponseJson(json!({ "revoked": revoked })))
}

/// Validate the presented key
async fn authenticate(
    State(state): State<AppState>,
    header: Option<TypedHeader<Authorization<Bearer>>>,
) -> std::result::Result<ResponseJson<Value>, ApiError> {
    let Some(TypedHeader(Authorization(bearer))) = header else {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Missing bearer token"));
    };

    let store = state.key_store.clone();
    let key = bearer.token().to_string();
    if blocking(move || store.validate(&key)).await.map_err(internal)? {
        Ok(ResponseJson(json!({ "valid": true })))
    } else {
        Err(api_error(StatusCode::UNAUTHORIZED, "Invalid or expired API key"))
    }
}

/// Create a user account
async fn register(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Json(credentials): Json<Credentials>,
) -> std::result::Result<ResponseJson<Value>, ApiError> {
    check_limit(&state.limiters.register, &client_key(addr), "/register").await?;

    let username = credentials.username.trim().to_string();
    if username.is_empty() || credentials.password.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Username and password are required"));
    }

    let users = state.users.clone();
    let password = credentials.password;
    let created = blocking(move || users.register(&username, &password))
        .await
        .map_err(internal)?;
    if created {
        Ok(ResponseJson(json!({ "message": "User registered successfully" })))
    } else {
        Err(api_error(StatusCode::BAD_REQUEST, "Username already registered"))
    }
}

/// Exchange a username and password for an access token
async fn login(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Form(credentials): Form<Credentials>,
) -> std::result::Result<ResponseJson<AccessToken>, ApiError> {
    check_limit(&state.limiters.login, &client_key(addr), "/token").await?;

    let users = state.users.clone();
    let username = credentials.username.trim().to_string();
    let password = credentials.password;
    let checked = username.clone();
    if !blocking(move || users.authenticate(&checked, &password))
        .await
        .map_err(internal)?
    {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Incorrect username or password"));
    }

    state.tokens.issue(&username).map(ResponseJson).map_err(internal)
}

/// The account an access token belongs to
async fn current_user(
    State(state): State<AppState>,
    header: Option<TypedHeader<Authorization<Bearer>>>,
) -> std::result::Result<ResponseJson<Value>, ApiError> {
    let Some(TypedHeader(Authorization(bearer))) = header else {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Not authenticated"));
    };

    let username = state.tokens.verify(bearer.token()).map_err(|e| {
        debug!("Rejected access token: {}", e);
        api_error(StatusCode::UNAUTHORIZED, "Could not validate credentials")
    })?;

    let users = state.users.clone();
    let name = username.clone();
    if blocking(move || users.exists(&name)).await.map_err(internal)? {
        Ok(ResponseJson(json!({ "username": username })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "User not found"))
    }
}

/// Most recently stored report
async fn latest_report(State(state): State<AppState>) -> std::result::Result<ResponseJson<Value>, ApiError> {
    let store = state.report_store.clone();
    match blocking(move || store.latest()).await.map_err(internal)? {
        Some(report) => Ok(ResponseJson(json!(report))),
        None => Err(api_error(StatusCode::NOT_FOUND, "No report has been stored yet")),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state.broker)).into_response()
}

/// Pushes broker events to one socket until either side goes away
async fn stream_events(mut socket: WebSocket, broker: Broker) {
    let mut subscription = broker.subscribe().await;
    let id = subscription.id();
    info!(id, "WebSocket listener connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                if socket.send(Message::Text(event.to_frame())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => debug!(id, "Ignoring client frame"),
            }
        }
    }

    broker.unsubscribe(id).await;
    info!(id, "WebSocket listener disconnected");
}
