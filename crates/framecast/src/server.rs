//! HTTP/WebSocket server surface
//!
//! Endpoints:
//! - POST /uploadfile/:session_id - multipart asset upload
//! - GET /ws/signaling/:session_id - signaling channel (WebSocket)
//! - GET /health - health check
//!
//! Session identifiers arrive as path tokens and are untrusted: their
//! shape is validated at this boundary before any session state is
//! touched.

use crate::config::ServerConfig;
use crate::media::{FrameDecoder, MjpegDecoder};
use crate::negotiate::{DirectNegotiator, Negotiator};
use crate::session::session::{Outbound, SessionRegistry};
use crate::session::supervisor::SessionSupervisor;
use crate::signaling::CloseReason;
use crate::store::{AssetStore, DiskBlobStore};
use crate::{Error, Result};
use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

/// Maximum accepted session id length
const MAX_SESSION_ID_LEN: usize = 64;

/// Outbound channel depth per session
const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

/// Shared state across all handlers
#[derive(Clone)]
pub struct AppState {
    supervisor: Arc<SessionSupervisor>,
    assets: Arc<AssetStore>,
}

/// Error response body for HTTP endpoints
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error type (e.g., "session_id", "upload", "storage")
    error_type: String,
    /// Human-readable error message
    message: String,
}

/// Response body for a successful upload
#[derive(Debug, Serialize)]
struct UploadResponse {
    filename: String,
}

/// The framecast server, configured but not yet bound
pub struct Server {
    config: Arc<ServerConfig>,
    state: AppState,
}

impl Server {
    /// Create a server with the default in-tree capabilities
    /// (MJPEG decoding, direct negotiation, disk blob storage)
    pub async fn new(config: ServerConfig) -> Result<Self> {
        Self::with_capabilities(config, Arc::new(MjpegDecoder), Arc::new(DirectNegotiator)).await
    }

    /// Create a server with explicit decode and negotiation capabilities
    pub async fn with_capabilities(
        config: ServerConfig,
        decoder: Arc<dyn FrameDecoder>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Result<Self> {
        config.validate()?;

        let blobs = Arc::new(
            DiskBlobStore::new(
                config.storage_dir.clone(),
                config.storage_key_prefix.clone(),
            )
            .await?,
        );
        let assets = Arc::new(AssetStore::new(blobs));
        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        let supervisor = Arc::new(SessionSupervisor::new(
            registry,
            assets.clone(),
            decoder,
            negotiator,
            config.frame_interval(),
        ));

        Ok(Self {
            config: Arc::new(config),
            state: AppState { supervisor, assets },
        })
    }

    /// Session registry (for observation in tests)
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.state.supervisor.registry()
    }

    /// Session supervisor
    pub fn supervisor(&self) -> Arc<SessionSupervisor> {
        self.state.supervisor.clone()
    }

    /// Build the router with all endpoints
    fn build_router(&self) -> Result<Router> {
        let cors = cors_layer(&self.config.allowed_origins)?;

        Ok(Router::new()
            .route("/health", get(health_handler))
            .route(
                "/uploadfile/:session_id",
                // Whole video assets arrive here; the framework's 2 MB
                // default body cap does not apply to this route.
                post(upload_handler)
                    .layer(DefaultBodyLimit::max(self.config.max_upload_bytes)),
            )
            .route("/ws/signaling/:session_id", get(ws_handler))
            .with_state(self.state.clone())
            .layer(
                tower::ServiceBuilder::new()
                    .layer(tower_http::trace::TraceLayer::new_for_http())
                    .layer(cors),
            ))
    }

    /// Bind the listener; port 0 picks an ephemeral port
    pub async fn bind(self) -> Result<BoundServer> {
        let router = self.build_router()?;

        let listener = TcpListener::bind(self.config.bind_address())
            .await
            .map_err(|e| {
                Error::Transport(format!(
                    "failed to bind {}: {}",
                    self.config.bind_address(),
                    e
                ))
            })?;

        let local_addr = listener.local_addr()?;
        info!("framecast listening on {}", local_addr);

        Ok(BoundServer {
            listener,
            router,
            local_addr,
            supervisor: self.state.supervisor,
        })
    }
}

/// A server bound to its listener, ready to serve
pub struct BoundServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    supervisor: Arc<SessionSupervisor>,
}

impl BoundServer {
    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process exits
    pub async fn serve(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .await
            .map_err(|e| Error::Transport(format!("server error: {}", e)))
    }

    /// Serve until `shutdown` fires, then tear down all live sessions
    pub async fn serve_with_shutdown(self, shutdown: CancellationToken) -> Result<()> {
        let supervisor = self.supervisor.clone();

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| Error::Transport(format!("server error: {}", e)))?;

        supervisor.shutdown().await;

        Ok(())
    }
}

/// Build the CORS layer from configured origins (empty = allow all)
fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let mut list = Vec::with_capacity(origins.len());
    for origin in origins {
        list.push(origin.parse::<HeaderValue>().map_err(|e| {
            Error::InvalidConfig(format!("invalid allowed origin {}: {}", origin, e))
        })?);
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(list))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Validate the shape of a caller-supplied session id
///
/// Path tokens are untrusted; this checks shape only, it is not an
/// authorization decision.
fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

fn bad_session_id(id: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error_type: "session_id".to_string(),
            message: format!("invalid session id: {:?}", id),
        }),
    )
}

/// Health check endpoint
async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// POST /uploadfile/:session_id - persist an uploaded asset
async fn upload_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> std::result::Result<Json<UploadResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !is_valid_session_id(&session_id) {
        return Err(bad_session_id(&session_id));
    }

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error_type: "upload".to_string(),
                message: format!("invalid multipart body: {}", e),
            }),
        )
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .unwrap_or("upload.bin")
            .to_string();

        let bytes = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error_type: "upload".to_string(),
                    message: format!("failed to read upload: {}", e),
                }),
            )
        })?;

        state
            .assets
            .put(&session_id, &filename, bytes)
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error_type: "storage".to_string(),
                        message: e.to_string(),
                    }),
                )
            })?;

        return Ok(Json(UploadResponse { filename }));
    }

    Err((
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error_type: "upload".to_string(),
            message: "missing 'file' field".to_string(),
        }),
    ))
}

/// GET /ws/signaling/:session_id - open the signaling channel
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if !is_valid_session_id(&session_id) {
        return bad_session_id(&session_id).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Drive one signaling connection until teardown
///
/// Every exit path funnels into the supervisor's teardown, which is
/// idempotent; the close frame with the indicative reason is written by
/// the outbound forwarder task.
async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    debug!("Signaling channel open for session {}", session_id);

    let (mut sink, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CHANNEL_CAPACITY);

    // Forward queued outbound messages to the socket; a close request or
    // a failed write ends the writer.
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match message {
                Outbound::Answer(json) => {
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Outbound::Frame(data) => {
                    if sink.send(Message::Binary(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(reason) => {
                    let frame = CloseFrame {
                        code: reason.code(),
                        reason: Cow::Borrowed(reason.text()),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let session = match state.supervisor.on_connect(&session_id, out_tx.clone()).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Rejecting connection for session {}: {}", session_id, e);
            let _ = out_tx
                .send(Outbound::Close(CloseReason::from_error(&e)))
                .await;
            drop(out_tx);
            let _ = writer.await;
            return;
        }
    };

    let cancel = session.cancel_token();

    loop {
        tokio::select! {
            // Teardown raised the cancellation signal; stop reading.
            _ = cancel.cancelled() => break,

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if state.supervisor.on_message(&session_id, &text).await.is_err() {
                        // Supervisor already tore the session down with an
                        // indicative close reason.
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Session {} channel closed by client", session_id);
                    state.supervisor.on_disconnect_or_error(&session_id).await;
                    break;
                }
                Some(Ok(_)) => {
                    // Client binary/ping/pong carries nothing for us.
                }
                Some(Err(e)) => {
                    warn!("Session {} channel error: {}", session_id, e);
                    state.supervisor.on_disconnect_or_error(&session_id).await;
                    break;
                }
            },
        }
    }

    // No-op when teardown already ran; guarantees cleanup on every path.
    state.supervisor.on_disconnect_or_error(&session_id).await;

    // Release our outbound senders so the writer drains and exits. A
    // writer wedged on a non-reading peer is aborted after a grace
    // period; the close frame is best effort at that point.
    drop(session);
    drop(out_tx);
    let mut writer = writer;
    if tokio::time::timeout(std::time::Duration::from_secs(5), &mut writer)
        .await
        .is_err()
    {
        debug!("Session {} writer did not drain, aborting", session_id);
        writer.abort();
    }

    debug!("Signaling channel closed for session {}", session_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shapes() {
        assert!(is_valid_session_id("s1"));
        assert!(is_valid_session_id("video-42_final.v2"));
        assert!(is_valid_session_id(&"a".repeat(64)));

        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id(&"a".repeat(65)));
        assert!(!is_valid_session_id(".hidden"));
        assert!(!is_valid_session_id("a/b"));
        assert!(!is_valid_session_id("a b"));
        assert!(!is_valid_session_id("sess%00"));
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        let result = cors_layer(&["not an origin\u{0}".to_string()]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_cors_layer_accepts_origin_list() {
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
        assert!(cors_layer(&[]).is_ok());
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_handler().await;
        assert_eq!(response, StatusCode::OK);
    }
}
