use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use super::MAX_MESSAGE_SIZE;
use crate::protocol::error::{Result, SessmeshError};
use crate::protocol::{Request, Response};
use crate::transport::codec::JsonCodec;

/// Async TCP server for a sessmesh backend.
///
/// Accepts connections in a loop and spawns a task per connection; each
/// connection serves any number of requests (keep-alive) until the peer
/// closes it.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Binds to the given address. Use port 0 to let the OS pick.
    pub async fn bind(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            SessmeshError::Connection(format!("failed to bind to {}: {}", bind_addr, e))
        })?;

        Ok(Self { listener })
    }

    /// The actual bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SessmeshError::Connection(format!("failed to get local addr: {}", e)))
    }

    /// Runs the accept loop, dispatching every request to `handler`.
    pub async fn run_with_handler<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(|e| {
                SessmeshError::Connection(format!("failed to accept connection: {}", e))
            })?;

            debug!(peer = %peer_addr, "connection established");

            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection error");
                }
            });
        }
    }
}

/// Serves requests on one connection until the peer hangs up.
async fn handle_connection<F, Fut>(mut stream: TcpStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Response>> + Send + 'static,
{
    loop {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("connection closed by peer");
                return Ok(());
            }
            Err(e) => {
                return Err(SessmeshError::Connection(format!(
                    "failed to read length: {}",
                    e
                )));
            }
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(SessmeshError::InvalidResponse(format!(
                "message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            )));
        }

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| SessmeshError::Connection(format!("failed to read data: {}", e)))?;

        let request = match JsonCodec::decode_request(&buf) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "failed to decode request");
                let error_response = Response::error(0, e.to_string());
                send_response(&mut stream, &error_response).await?;
                continue;
            }
        };

        let request_id = request.id;
        let response = match handler(request).await {
            Ok(resp) => resp,
            Err(e) => Response::error(request_id, e.to_string()),
        };

        send_response(&mut stream, &response).await?;
    }
}

async fn send_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let encoded = JsonCodec::encode_response(response)?;

    let len = encoded.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| SessmeshError::Connection(format!("failed to send response length: {}", e)))?;
    stream
        .write_all(&encoded)
        .await
        .map_err(|e| SessmeshError::Connection(format!("failed to send response data: {}", e)))?;

    Ok(())
}
