//! A calculator service exposed over a small RPC layer.
//!
//! The service is reachable two ways:
//!
//! - through the **registry**: the client asks the registry endpoint for the
//!   location bound under a published name, then connects there;
//! - **directly**: the client connects straight to the service address.
//!
//! Both paths end at the same [`calculator::CalculatorServiceImpl`]. Domain
//! failures raised by the service travel back as [`RemoteError`]s and are
//! rebuilt on the client as [`calculator::ServiceError`] with the original
//! message, while network failures stay [`RpcError`] transport variants.
//!
//! ```text
//! CalculatorClient ──► RpcClient ══ TCP ══► RpcServer ──► CalculatorServiceImpl ──► ops
//!        ▲                                                  (same instance behind
//!        └── registry lookup (RegistryClient ══► RegistryServer)   both paths)
//! ```
//!
//! Every message is one length-delimited frame holding a bincode-encoded
//! [`RpcRequest`] or [`RpcResponse`].

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::HashMap,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot, watch, RwLock},
    task::JoinHandle,
};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

pub mod calculator;
pub mod config;
pub mod errors;
pub mod host;
pub mod registry;
pub mod runtime;

pub use config::{Endpoint, RpcConfig, ServiceConfig};
pub use errors::{CallError, ErrorCode, RemoteError, ResolutionError, RpcError};

#[cfg(not(test))]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest frame either side accepts (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    id: u64,
    method: String,
    params: Vec<u8>,
}

impl RpcRequest {
    pub fn new(id: u64, method: String, params: Vec<u8>) -> Self {
        Self { id, method, params }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    fn into_params(self) -> Vec<u8> {
        self.params
    }
}

/// Exactly one of `result` and `error` is populated by the constructors; the
/// client rejects anything else.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    id: u64,
    result: Option<Vec<u8>>,
    error: Option<RemoteError>,
}

impl RpcResponse {
    pub fn success(id: u64, data: Vec<u8>) -> Self {
        Self {
            id,
            result: Some(data),
            error: None,
        }
    }

    pub fn failure(id: u64, error: RemoteError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: u64, result: Result<Vec<u8>, RpcError>) -> Self {
        match result {
            Ok(data) => Self::success(id, data),
            Err(e) => Self::failure(id, RemoteError::from(e)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn result(&self) -> Option<&Vec<u8>> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    /// Turns the response back into the handler's outcome.
    pub fn into_result(self) -> Result<Vec<u8>, RpcError> {
        match (self.result, self.error) {
            (Some(data), None) => Ok(data),
            (None, Some(err)) if err.code == ErrorCode::MethodNotFound => {
                Err(RpcError::UnknownMethod(err.message))
            }
            (None, Some(err)) => Err(RpcError::Remote(err)),
            _ => Err(RpcError::StreamError("Invalid response".into())),
        }
    }
}

type AsyncHandlerFn = Box<
    dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, RpcError>> + Send>>
        + Send
        + Sync,
>;

type HandlerMap = Arc<RwLock<HashMap<String, AsyncHandlerFn>>>;

#[derive(Clone)]
pub struct RpcServer {
    pub handlers: HandlerMap,

    pub socket_addr: Option<SocketAddr>,

    pub config: RpcConfig,
}

impl RpcServer {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            socket_addr: None,
            config,
        }
    }

    pub async fn register<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, RpcError>> + Send + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(
            method.to_string(),
            Box::new(move |params: Vec<u8>| {
                Box::pin(handler(params)) as Pin<Box<dyn Future<Output = _> + Send>>
            }),
        );
    }

    pub async fn register_typed<Req, Resp, F, Fut>(&self, method: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(method, move |params: Vec<u8>| {
            let handler = handler.clone();
            async move {
                let request: Req = bincode::deserialize(&params)?;
                let response = handler(request).await?;
                Ok(bincode::serialize(&response)?)
            }
        })
        .await;
    }

    pub async fn bind(&mut self) -> Result<TcpListener, RpcError> {
        let listener = TcpListener::bind(self.config.bind_address.as_str())
            .await
            .map_err(|e| {
                RpcError::ConfigError(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })?;

        let local_addr = listener.local_addr()?;
        self.socket_addr = Some(local_addr);
        info!("RPC server listening on {local_addr}");
        Ok(listener)
    }

    /// Serves connections until the process stops.
    pub async fn start(&mut self, listener: TcpListener) -> Result<(), RpcError> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.serve_until(listener, shutdown_rx).await
    }

    /// Accepts connections until `shutdown` flips to `true` or its sender is
    /// dropped. Open connections are closed once their in-flight calls finish.
    pub async fn serve_until(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RpcError> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("RPC server on {:?} shutting down", self.socket_addr);
                        return Ok(());
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {peer}");
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("Could not set TCP_NODELAY for {peer}: {e}");
                            }
                            let server = self.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                server.serve_connection(stream, shutdown).await;
                                debug!("Connection from {peer} closed");
                            });
                        }
                        Err(e) => warn!("Failed to accept connection: {e}"),
                    }
                }
            }
        }
    }

    /// Reads requests off one connection and answers each from its own task,
    /// so a slow call never holds up the others.
    pub async fn serve_connection<IO>(&self, io: IO, mut shutdown: watch::Receiver<bool>)
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut frames) = Framed::new(io, self.config.codec()).split();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<Bytes>();

        let mut writer = tokio::spawn(async move {
            while let Some(frame) = response_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!("Failed to write response: {e}");
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = &mut writer => {
                    debug!("Response writer stopped, closing connection");
                    return;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                frame = frames.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            debug!("Stream error: {e}");
                            break;
                        }
                        None => break,
                    };

                    let request = match bincode::deserialize::<RpcRequest>(&frame) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!("Dropping connection after malformed request frame: {e}");
                            break;
                        }
                    };

                    let handlers = self.handlers.clone();
                    let response_tx = response_tx.clone();
                    let limit = self.config.max_frame_length;
                    tokio::spawn(async move {
                        let response = Self::dispatch(&handlers, request).await;
                        match encode_response(response, limit) {
                            Ok(data) => {
                                // The receiver is gone only if the writer already failed.
                                let _ = response_tx.send(data);
                            }
                            Err(e) => warn!("Failed to encode response: {e}"),
                        }
                    });
                }
            }
        }

        drop(response_tx);
        let _ = writer.await;
    }

    async fn dispatch(handlers: &HandlerMap, request: RpcRequest) -> RpcResponse {
        let id = request.id();
        debug!(
            "Received RPC request {id}: {} ({} bytes)",
            request.method(),
            request.params().len()
        );

        let call = {
            let handlers = handlers.read().await;
            match handlers.get(request.method()) {
                Some(handler) => handler(request.into_params()),
                None => {
                    debug!("No handler for {}", request.method());
                    let error = RemoteError::method_not_found(request.method());
                    return RpcResponse::failure(id, error);
                }
            }
        };

        RpcResponse::from_result(id, call.await)
    }
}

/// Encodes `response`, replacing it with an internal error when it would not
/// fit in one frame.
fn encode_response(response: RpcResponse, limit: usize) -> Result<Bytes, RpcError> {
    let id = response.id();
    let data = bincode::serialize(&response)?;
    if data.len() <= limit {
        return Ok(Bytes::from(data));
    }

    let too_large = RpcError::FrameTooLarge {
        size: data.len(),
        limit,
    };
    warn!("Response {id} not sent: {too_large}");
    let fallback = RpcResponse::failure(id, RemoteError::internal(too_large.to_string()));
    Ok(Bytes::from(bincode::serialize(&fallback)?))
}

type PendingMap = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<RpcResponse>>>>>;

fn lock_pending(
    pending: &PendingMap,
) -> MutexGuard<'_, Option<HashMap<u64, oneshot::Sender<RpcResponse>>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One connection to an [`RpcServer`], shared by any number of concurrent
/// calls. Responses are matched to calls by request id.
pub struct RpcClient {
    outbound: mpsc::UnboundedSender<Bytes>,
    // `None` once the connection is gone.
    pending: PendingMap,
    config: RpcConfig,
    peer_addr: Option<SocketAddr>,
    pub next_id: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl RpcClient {
    pub async fn connect(connect_addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let stream =
            match tokio::time::timeout(config.connect_timeout, TcpStream::connect(connect_addr))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(RpcError::ConnectionError(format!("{connect_addr}: {e}")));
                }
                Err(_) => {
                    return Err(RpcError::ConnectionError(format!(
                        "{connect_addr}: connect timed out after {:?}",
                        config.connect_timeout
                    )));
                }
            };
        stream.set_nodelay(true)?;
        debug!("Connected to {connect_addr}");

        let mut client = Self::from_io(stream, config);
        client.peer_addr = Some(connect_addr);
        Ok(client)
    }

    /// Runs the client protocol over an already established byte stream.
    pub fn from_io<IO>(io: IO, config: RpcConfig) -> Self
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut frames) = Framed::new(io, config.codec()).split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));

        let writer_pending = pending.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!("Failed to write request: {e}");
                    break;
                }
            }
            // Nothing more can be sent: fail the waiting calls now.
            lock_pending(&writer_pending).take();
        });

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!("Stream error: {e}");
                        break;
                    }
                };

                let response = match bincode::deserialize::<RpcResponse>(&frame) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Malformed response frame: {e}");
                        break;
                    }
                };

                let waiter = lock_pending(&reader_pending)
                    .as_mut()
                    .and_then(|pending| pending.remove(&response.id()));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!("Dropping response for unknown request {}", response.id()),
                }
            }

            // Dropping the senders fails every call still waiting here.
            lock_pending(&reader_pending).take();
        });

        Self {
            outbound,
            pending,
            config,
            peer_addr: None,
            next_id: Arc::new(AtomicU64::new(1)),
            tasks: vec![writer, reader],
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub async fn call(&self, method: &str, params: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req_data = bincode::serialize(&RpcRequest::new(id, method.to_string(), params))?;
        if req_data.len() > self.config.max_frame_length {
            return Err(RpcError::FrameTooLarge {
                size: req_data.len(),
                limit: self.config.max_frame_length,
            });
        }

        let (response_tx, response_rx) = oneshot::channel();
        match lock_pending(&self.pending).as_mut() {
            Some(pending) => {
                pending.insert(id, response_tx);
            }
            None => return Err(RpcError::ConnectionError("Connection closed".into())),
        }

        if self.outbound.send(Bytes::from(req_data)).is_err() {
            self.forget(id);
            return Err(RpcError::ConnectionError("Connection closed".into()));
        }

        match tokio::time::timeout(self.config.call_timeout, response_rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(RpcError::ConnectionError(
                "Connection closed before response".into(),
            )),
            Err(_) => {
                self.forget(id);
                Err(RpcError::Timeout)
            }
        }
    }

    pub async fn call_typed<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let params = bincode::serialize(request)?;
        let response_data = self.call(method, params).await?;
        Ok(bincode::deserialize(&response_data)?)
    }

    fn forget(&self, id: u64) {
        if let Some(pending) = lock_pending(&self.pending).as_mut() {
            pending.remove(&id);
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
