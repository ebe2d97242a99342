//! HTTP front end: listener, accept loop and per-connection workers.
//!
//! ## Lifecycle
//!
//! ```text
//! Stopped ──start()──▶ Starting ──bind ok──▶ Listening ──stop()──▶ Stopping ──▶ Stopped
//!                          └──bind failed──▶ Stopped
//! ```
//!
//! The accept loop runs on its own task and watches a [`CancellationToken`].
//! Every accepted connection goes through admission:
//!
//! - **Admitted**: a worker task serves exactly one HTTP/1.1 request (keep-alive
//!   off). Validation, clipping, the transform and encoding run on the blocking
//!   pool. The slot is held until both the connection and any processing it
//!   started have ended.
//! - **Rejected**: a lightweight responder drains the body and answers 429. It
//!   holds no slot and never decodes anything. At most
//!   [`MAX_REJECT_RESPONDERS`] run at once; beyond that the socket is closed
//!   without a response.
//!
//! Every connection has a deadline (`limits.connection_timeout_ms`, shorter
//! for rejected ones). A client that connects and goes quiet is disconnected
//! when it expires, which returns its slot.
//!
//! Workers and responders are spawned on a [`TaskTracker`]. Stopping cancels
//! the loop, drops the listener and then waits for the tracked tasks, so
//! requests already being served still get their response.
//!
//! ## Status codes
//!
//! | Outcome | Status |
//! |---|---|
//! | Transformed image | 200, `application/octet-stream` |
//! | Empty clipped region | 204 |
//! | Invalid request | 400 |
//! | No free slot | 429 |
//! | Encode failure or worker panic | 500 |

use crate::admission::{AdmissionController, AdmissionSlot};
use crate::config::{ServiceConfig, effective_slots};
use crate::imaging::{ImageCodec, PngCodec};
use crate::process::{ProcessError, RawRequest, process_with_codec};
use crate::request::{RequestLimits, RequestValidator};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept` so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound on concurrent 429 responders.
pub const MAX_REJECT_RESPONDERS: usize = 64;

/// Longest a rejected connection is kept open.
const REJECT_TIMEOUT: Duration = Duration::from_secs(2);

type ResponseBody = Full<Bytes>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read bound address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Lifecycle state of a [`TransformService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Listening,
    Stopping,
}

/// Everything a worker needs, shared read-only across connections.
struct Shared<C> {
    codec: C,
    validator: RequestValidator,
    admission: AdmissionController,
    connection_timeout: Duration,
    responders: Arc<Semaphore>,
}

struct Running {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    tracker: TaskTracker,
}

/// A transform service bound to one address.
///
/// ```no_run
/// # async fn run() -> Result<(), image_transformer::server::ServiceError> {
/// use image_transformer::config::ServiceConfig;
/// use image_transformer::server::TransformService;
///
/// let mut service = TransformService::new(&ServiceConfig::default());
/// let addr = service.start().await?;
/// println!("listening on {addr}");
/// service.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct TransformService<C: ImageCodec + 'static = PngCodec> {
    bind_address: String,
    shared: Arc<Shared<C>>,
    state: ServiceState,
    running: Option<Running>,
}

impl TransformService<PngCodec> {
    pub fn new(config: &ServiceConfig) -> Self {
        Self::with_codec(config, PngCodec::new())
    }
}

impl<C: ImageCodec + 'static> TransformService<C> {
    pub fn with_codec(config: &ServiceConfig, codec: C) -> Self {
        let validator = RequestValidator::new(RequestLimits::from(&config.limits));
        let admission = AdmissionController::new(effective_slots(&config.processing));
        Self {
            bind_address: config.server.bind_address(),
            shared: Arc::new(Shared {
                codec,
                validator,
                admission,
                connection_timeout: config.limits.connection_timeout(),
                responders: Arc::new(Semaphore::new(MAX_REJECT_RESPONDERS)),
            }),
            state: ServiceState::Stopped,
            running: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.addr)
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.shared.admission
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested. Calling it again while listening returns the
    /// same address.
    pub async fn start(&mut self) -> Result<SocketAddr, ServiceError> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        self.state = ServiceState::Starting;
        let (listener, addr) = match bind(&self.bind_address).await {
            Ok(bound) => bound,
            Err(err) => {
                self.state = ServiceState::Stopped;
                return Err(err);
            }
        };

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.shared),
            cancel.clone(),
            tracker.clone(),
        ));
        info!(
            %addr,
            slots = self.shared.admission.capacity(),
            "transform service listening"
        );

        self.running = Some(Running {
            addr,
            cancel,
            task,
            tracker,
        });
        self.state = ServiceState::Listening;
        Ok(addr)
    }

    /// Stop accepting and release the socket, then wait for in-flight
    /// connections to finish.
    ///
    /// The wait is bounded: every tracked task ends within its connection
    /// deadline.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.state = ServiceState::Stopping;
        running.cancel.cancel();
        if let Err(err) = running.task.await {
            error!(error = %err, "accept loop terminated abnormally");
        }

        running.tracker.close();
        if !running.tracker.is_empty() {
            info!(
                connections = running.tracker.len(),
                "waiting for in-flight connections"
            );
        }
        running.tracker.wait().await;
        self.state = ServiceState::Stopped;
        info!(addr = %running.addr, "transform service stopped");
    }
}

impl<C: ImageCodec + 'static> Drop for TransformService<C> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

async fn bind(address: &str) -> Result<(TcpListener, SocketAddr), ServiceError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ServiceError::Bind {
            address: address.to_string(),
            source,
        })?;
    let addr = listener.local_addr().map_err(ServiceError::LocalAddr)?;
    Ok((listener, addr))
}

async fn accept_loop<C: ImageCodec + 'static>(
    listener: TcpListener,
    shared: Arc<Shared<C>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("accept loop cancelled");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };

                match shared.admission.try_admit() {
                    Ok(slot) => {
                        tracker.spawn(serve_admitted(stream, peer, Arc::clone(&shared), slot));
                    }
                    Err(err) => {
                        warn!(%peer, error = %err, "shedding load");
                        match Arc::clone(&shared.responders).try_acquire_owned() {
                            Ok(permit) => {
                                let drain_limit = shared.validator.limits().max_body_bytes;
                                let timeout = REJECT_TIMEOUT.min(shared.connection_timeout);
                                tracker.spawn(serve_rejected(stream, peer, drain_limit, timeout, permit));
                            }
                            Err(_) => {
                                debug!(%peer, "all 429 responders busy, closing connection");
                                drop(stream);
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn serve_admitted<C: ImageCodec + 'static>(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared<C>>,
    slot: AdmissionSlot,
) {
    // Shared with the blocking work, so a connection that times out mid-transform
    // keeps its slot until the transform is done.
    let slot = Arc::new(slot);
    let timeout = shared.connection_timeout;
    let service = service_fn(move |req: Request<Incoming>| {
        let shared = Arc::clone(&shared);
        let slot = Arc::clone(&slot);
        async move { Ok::<_, Infallible>(handle_request(shared, slot, req).await) }
    });
    let connection = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service);
    match tokio::time::timeout(timeout, connection).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(%peer, error = %err, "connection closed with error"),
        Err(_) => warn!(%peer, ?timeout, "connection deadline expired"),
    }
}

async fn serve_rejected(
    stream: TcpStream,
    peer: SocketAddr,
    drain_limit: usize,
    timeout: Duration,
    permit: OwnedSemaphorePermit,
) {
    let _permit = permit;
    let service = service_fn(move |req: Request<Incoming>| async move {
        drain(req.into_body(), drain_limit).await;
        Ok::<_, Infallible>(empty(StatusCode::TOO_MANY_REQUESTS))
    });
    let connection = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service);
    match tokio::time::timeout(timeout, connection).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(%peer, error = %err, "rejected connection closed with error"),
        Err(_) => debug!(%peer, "rejected connection stalled, closing"),
    }
}

async fn handle_request<C: ImageCodec + 'static>(
    shared: Arc<Shared<C>>,
    slot: Arc<AdmissionSlot>,
    req: Request<Incoming>,
) -> Response<ResponseBody> {
    let method = req.method().as_str().to_owned();
    // Validate the raw target, so a query string fails the path check.
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| req.uri().to_string());
    let content_length = declared_length(req.headers());
    let max_body_bytes = shared.validator.limits().max_body_bytes;

    let body = if shared.validator.accepts_length(content_length) {
        match Limited::new(req.into_body(), max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                warn!(%method, %path, error = %err, "failed to read request body");
                return empty(StatusCode::BAD_REQUEST);
            }
        }
    } else {
        // Validation rejects this request; consume what was sent so the
        // client sees the response instead of a reset.
        drain(req.into_body(), max_body_bytes).await;
        Bytes::new()
    };

    let worker = Arc::clone(&shared);
    let task_path = path.clone();
    let task_method = method.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _slot = slot;
        process_with_codec(
            &worker.codec,
            &worker.validator,
            RawRequest {
                method: &task_method,
                path: &task_path,
                content_length,
                body: &body,
            },
        )
    })
    .await;

    match outcome {
        Ok(Ok(png)) => {
            debug!(%method, %path, bytes = png.len(), "transformed");
            let mut response = Response::new(Full::new(Bytes::from(png)));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            response
        }
        Ok(Err(err)) => {
            let status = status_for(&err);
            match &err {
                ProcessError::Internal(_) => error!(%method, %path, error = %err, "processing failed"),
                _ => debug!(%method, %path, status = status.as_u16(), reason = %err, "request not transformed"),
            }
            empty(status)
        }
        Err(err) => {
            error!(%method, %path, error = %err, "worker panicked");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Map a pipeline outcome onto its HTTP status.
pub fn status_for(err: &ProcessError) -> StatusCode {
    match err {
        ProcessError::Validation(_) => StatusCode::BAD_REQUEST,
        ProcessError::EmptyRegion => StatusCode::NO_CONTENT,
        ProcessError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Read and discard up to `limit` bytes of a request body.
async fn drain(mut body: Incoming, limit: usize) {
    let mut seen = 0usize;
    while seen <= limit {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    seen += data.len();
                }
            }
            _ => break,
        }
    }
}

fn empty(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
