use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::MAX_MESSAGE_SIZE;
use crate::protocol::error::{Result, SessmeshError};
use crate::protocol::{Request, Response};
use crate::transport::codec::JsonCodec;

/// Async TCP transport for sessmesh.
///
/// Connections are plain `tokio::net::TcpStream`s; the router keeps them
/// alive across requests and serialises concurrent use per backend. Both
/// the connect and the request/response exchange carry explicit
/// deadlines, expiry of which surfaces as [`SessmeshError::Timeout`].
///
/// # Wire Protocol
///
/// ```text
/// [4-byte length as u32 big-endian] [JSON data]
/// ```
pub struct TcpTransport;

impl TcpTransport {
    /// Connects to a remote endpoint within `timeout`.
    ///
    /// The address may resolve to multiple socket addresses; each is
    /// tried in turn until one succeeds. The deadline covers the whole
    /// attempt, resolution included.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
        let attempt = async {
            let socket_addrs = addr.to_socket_addrs().map_err(|e| {
                SessmeshError::Connection(format!("invalid address '{}': {}", addr, e))
            })?;

            let mut last_err = None;
            for socket_addr in socket_addrs {
                match TcpStream::connect(&socket_addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_err = Some(e),
                }
            }

            Err(SessmeshError::Connection(format!(
                "failed to connect to {}: {}",
                addr,
                last_err
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "address resolved to nothing".to_string())
            )))
        };

        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| SessmeshError::Timeout(timeout.as_millis() as u64))?
    }

    /// Sends a request and waits for the matching response, all within
    /// `timeout`.
    pub async fn send_request(
        stream: &mut TcpStream,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response> {
        let exchange = async {
            let encoded = JsonCodec::encode_request(request)?;
            Self::send_message(stream, &encoded).await?;
            let response_data = Self::receive_message(stream).await?;
            JsonCodec::decode_response(&response_data)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| SessmeshError::Timeout(timeout.as_millis() as u64))?
    }

    /// Writes one length-prefixed message.
    pub async fn send_message(stream: &mut TcpStream, data: &[u8]) -> Result<()> {
        let len = data.len() as u32;

        stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| map_io_error(e, "writing length prefix"))?;
        stream
            .write_all(data)
            .await
            .map_err(|e| map_io_error(e, "writing data"))?;
        stream
            .flush()
            .await
            .map_err(|e| map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one length-prefixed message.
    pub async fn receive_message(stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| map_io_error(e, "reading length prefix"))?;

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
            .map_err(|e| map_io_error(e, "reading data"))?;

        Ok(buf)
    }
}

/// Converts IO errors into the connection-oriented variants the failover
/// loop classifies on.
fn map_io_error(err: std::io::Error, context: &str) -> SessmeshError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::NotConnected => {
            SessmeshError::Connection(format!("{}: connection lost", context))
        }
        _ => SessmeshError::Io(err),
    }
}
