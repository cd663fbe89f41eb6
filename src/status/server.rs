//! HTTP/WebSocket server for the status interface.
//!
//! Requests are served by hyper over HTTP/1.1. The `/ws` upgrade is checked
//! by tungstenite's server handshake before the connection is switched.

use super::{StatusSnapshot, stream_status};
use crate::context::EventCounter;
use crate::error::{Result, StartupError};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::create_response;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_util::sync::CancellationToken;

pub const STATUS_PATH: &str = "/status";
pub const INDEX_PATH: &str = "/";
pub const STREAM_PATH: &str = "/ws";

/// WebSocket protocol version advertised when an upgrade is refused.
const WEBSOCKET_VERSION: &str = "13";

type Body = Full<Bytes>;

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Check `req` as a WebSocket upgrade and build the 101 response.
fn websocket_handshake(
    req: &Request<Incoming>,
) -> std::result::Result<Response<()>, tokio_tungstenite::tungstenite::Error> {
    let mut handshake = Request::new(());
    *handshake.method_mut() = req.method().clone();
    *handshake.uri_mut() = req.uri().clone();
    *handshake.version_mut() = req.version();
    *handshake.headers_mut() = req.headers().clone();
    create_response(&handshake)
}

/// Serves the point query, the index page and the WebSocket stream.
#[derive(Clone)]
pub struct StatusServer {
    counter: EventCounter,
    stream_interval: Duration,
    shutdown: CancellationToken,
    observers: Arc<AtomicUsize>,
}

impl StatusServer {
    pub fn new(
        counter: EventCounter,
        stream_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            counter,
            stream_interval,
            shutdown,
            observers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listener; failure here is fatal at startup.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind {
                addr: addr.to_string(),
                source,
            })
    }

    /// Number of WebSocket observers currently streaming.
    pub fn active_observers(&self) -> usize {
        self.observers.load(Ordering::SeqCst)
    }

    /// Accept connections until shutdown.
    pub async fn serve(self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("[Status] Listening on http://{}", addr),
            Err(e) => warn!("[Status] Listening on unknown address: {}", e),
        }

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("[Status] Accept failed: {}", e);
                        continue;
                    }
                },
            };

            tokio::spawn(self.clone().serve_connection(stream, peer));
        }
        info!("[Status] Server stopped");
    }

    async fn serve_connection(self, stream: TcpStream, peer: SocketAddr) {
        let server = self.clone();
        let service = service_fn(move |req| {
            let server = server.clone();
            async move { Ok::<_, Infallible>(server.route(req, peer)) }
        });

        let conn = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades();
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            _ = self.shutdown.cancelled() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };
        if let Err(e) = result {
            debug!("[Status] Connection from {} failed: {}", peer, e);
        }
    }

    fn route(self, req: Request<Incoming>, peer: SocketAddr) -> Response<Body> {
        debug!("[Status] {} {} from {}", req.method(), req.uri(), peer);

        if req.method() != Method::GET {
            return respond(
                StatusCode::METHOD_NOT_ALLOWED,
                "text/plain",
                "Method Not Allowed",
            );
        }

        match req.uri().path() {
            STATUS_PATH => match serde_json::to_vec(&StatusSnapshot::capture(&self.counter)) {
                Ok(body) => respond(StatusCode::OK, "application/json", body),
                Err(e) => {
                    warn!("[Status] Failed to encode snapshot: {}", e);
                    respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain",
                        "Internal Server Error",
                    )
                }
            },
            INDEX_PATH => respond(
                StatusCode::OK,
                "text/plain",
                format!("Message Count {}", self.counter.get()),
            ),
            STREAM_PATH => self.upgrade(req, peer),
            _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
        }
    }

    fn upgrade(self, mut req: Request<Incoming>, peer: SocketAddr) -> Response<Body> {
        let handshake = match websocket_handshake(&req) {
            Ok(handshake) => handshake,
            Err(e) => {
                debug!("[Status] Refused upgrade from {}: {}", peer, e);
                let mut response = respond(
                    StatusCode::UPGRADE_REQUIRED,
                    "text/plain",
                    "WebSocket upgrade required",
                );
                response.headers_mut().insert(
                    header::SEC_WEBSOCKET_VERSION,
                    HeaderValue::from_static(WEBSOCKET_VERSION),
                );
                return response;
            }
        };

        let on_upgrade = hyper::upgrade::on(&mut req);
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let io = TokioIo::new(upgraded);
                    let ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                    self.observe(ws, peer).await;
                }
                Err(e) => debug!("[Status] Upgrade from {} failed: {}", peer, e),
            }
        });

        handshake.map(|()| Full::new(Bytes::new()))
    }

    async fn observe<S>(self, ws: WebSocketStream<S>, peer: SocketAddr)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let active = self.observers.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[Status] Observer {} connected ({} active)", peer, active);

        let sent = stream_status(
            ws,
            self.counter.clone(),
            self.stream_interval,
            self.shutdown.clone(),
        )
        .await;

        let active = self.observers.fetch_sub(1, Ordering::SeqCst) - 1;
        info!(
            "[Status] Observer {} disconnected after {} snapshot(s) ({} active)",
            peer, sent, active
        );
    }
}
