//! Client side of the transport, used for peer routing and readiness probes.

use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::transport::codec::{
    decode, encode, read_frame, write_frame, RpcError, RpcRequest, RpcResponse, FRAME_REQUEST,
};
use crate::types::{Error, RequestId, Result, TransportConfig};

/// A single connection to a peer's transport.
#[derive(Debug)]
pub struct RpcClient {
    address: String,
    stream: TcpStream,
    max_frame_bytes: u32,
    request_timeout: Duration,
}

impl RpcClient {
    /// Connect to `address`, bounded by the configured connect timeout.
    pub async fn connect(address: &str, config: &TransportConfig) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::timeout(format!("connect to {} timed out", address)))??;
        stream.set_nodelay(true)?;
        Ok(Self {
            address: address.to_string(),
            stream,
            max_frame_bytes: config.max_frame_bytes,
            request_timeout: Duration::from_secs(config.read_timeout_secs),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, service: &str, method: &str, body: Value) -> Result<Value> {
        let request = RpcRequest {
            id: RequestId::new().to_string(),
            service: service.to_string(),
            method: method.to_string(),
            body,
        };
        let payload = encode(&request)?;
        write_frame(&mut self.stream, FRAME_REQUEST, &payload).await?;

        let frame = tokio::time::timeout(
            self.request_timeout,
            read_frame(&mut self.stream, self.max_frame_bytes),
        )
        .await
        .map_err(|_| Error::timeout(format!("{}.{} on {}", service, method, self.address)))??
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} closed the connection", self.address),
            ))
        })?;

        let response: RpcResponse = decode(&frame.payload)?;
        if response.id != request.id {
            return Err(Error::internal(format!(
                "response id {} does not match request {}",
                response.id, request.id
            )));
        }
        if response.ok {
            return Ok(response.body.unwrap_or(Value::Null));
        }
        let error = response.error.unwrap_or_else(|| RpcError {
            code: "INTERNAL".to_string(),
            message: "error frame without details".to_string(),
        });
        Err(Error::Remote {
            code: error.code,
            message: error.message,
        })
    }
}
