//! RPC server: accept loop and per-connection handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::observability::MetricsScope;
use crate::transport::codec::{
    decode, encode, read_frame, write_frame, RpcRequest, RpcResponse, FRAME_REQUEST,
};
use crate::transport::router::Router;
use crate::types::{Error, TransportConfig};

/// RPC server for one hosted service.
#[derive(Debug)]
pub struct RpcServer {
    router: Router,
    config: TransportConfig,
    metrics: MetricsScope,
    cancel: CancellationToken,
    connections: TaskTracker,
}

impl RpcServer {
    pub fn new(router: Router, config: TransportConfig, metrics: MetricsScope) -> Self {
        Self {
            router,
            config,
            metrics,
            cancel: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Token cancelled when the server is asked to stop.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for every connection task to exit. Call once the accept loop has
    /// returned, so no new connection can be tracked afterwards.
    pub async fn drain(&self) {
        self.connections.close();
        self.connections.wait().await;
    }

    /// Run the accept loop on an already-bound listener until cancelled.
    ///
    /// The listener is dropped when this returns, so new connections are
    /// refused from then on.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        let conn_semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("accept loop shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = match accept {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                %peer,
                                max_connections = self.config.max_connections,
                                "connection rejected: at capacity"
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!(%peer, "connection accepted");
                    let server = self.clone();
                    self.connections.spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer, permit).await {
                            tracing::debug!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
            }
        }
    }

    /// Read frames, route requests, write responses.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        _permit: OwnedSemaphorePermit,
    ) -> std::io::Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let read_timeout = Duration::from_secs(self.config.read_timeout_secs);
        let write_timeout = Duration::from_secs(self.config.write_timeout_secs);

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = tokio::time::timeout(read_timeout, read_frame(&mut reader, self.config.max_frame_bytes)) => {
                    match read {
                        Err(_elapsed) => {
                            tracing::debug!(%peer, "read timeout, dropping connection");
                            break;
                        }
                        Ok(result) => match result? {
                            Some(frame) => frame,
                            None => break,
                        },
                    }
                }
            };

            // A frame that raced with cancellation is dropped unanswered.
            if self.cancel.is_cancelled() {
                break;
            }

            let response = if frame.kind != FRAME_REQUEST {
                RpcResponse::failure(
                    "",
                    &Error::validation(format!("Unexpected frame kind: 0x{:02X}", frame.kind)),
                )
            } else {
                match decode::<RpcRequest>(&frame.payload) {
                    Ok(request) => self.dispatch(request).await,
                    Err(e) => RpcResponse::failure("", &e),
                }
            };

            let encoded = encode(&response).map_err(|e| {
                tracing::error!(error = %e, "response encoding failed");
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
            })?;
            tokio::time::timeout(
                write_timeout,
                write_frame(&mut writer, response.frame_kind(), &encoded),
            )
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout"))??;
        }
        Ok(())
    }

    async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let started = Instant::now();
        let scope = self
            .metrics
            .clone()
            .with_label("rpc_service", request.service.clone());
        scope.counter("rpc_requests_total").increment(1);

        let result = self
            .router
            .route(&request.service, &request.method, request.body)
            .await;
        scope
            .histogram("rpc_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(body) => RpcResponse::success(request.id, body),
            Err(e) => {
                scope.counter("rpc_errors_total").increment(1);
                tracing::debug!(
                    service = %request.service,
                    method = %request.method,
                    error = %e,
                    "request failed"
                );
                RpcResponse::failure(request.id, &e)
            }
        }
    }
}
