//! TFTP server loop
//!
//! One task per transfer, lockstep DATA/ACK, shutdown via a watch channel.

use crate::error::{Result, TftpError};
use crate::packet::{ErrorCode, TftpOptions, TftpPacket};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Default block size (RFC 1350)
pub const DEFAULT_BLOCK_SIZE: u16 = 512;

/// Maximum block size we negotiate (RFC 2348 allows more; PXE stacks don't)
pub const MAX_BLOCK_SIZE: u16 = 1468;

/// Default per-packet timeout in seconds
pub const DEFAULT_TIMEOUT: u8 = 5;

/// Maximum retransmissions before a transfer is abandoned
pub const MAX_RETRIES: u32 = 5;

/// Source of the artifacts the listener serves
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Get artifact contents by path, or None if it does not exist
    async fn fetch(&self, path: &str) -> Option<Bytes>;
}

/// TFTP server
pub struct TftpServer {
    bind_addr: SocketAddrV4,
    source: Arc<dyn ArtifactSource>,
}

impl TftpServer {
    /// Create a new TFTP server
    pub fn new(bind_addr: SocketAddrV4, source: Arc<dyn ArtifactSource>) -> Self {
        Self { bind_addr, source }
    }

    /// Run the server until the shutdown channel flips to true
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let socket = UdpSocket::bind(self.bind_addr)
            .await
            .map_err(|e| TftpError::BindFailed {
                addr: self.bind_addr.into(),
                source: e,
            })?;

        info!(addr = %self.bind_addr, "TFTP listener started");

        let mut buf = [0u8; 2048];
        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            let data = buf[..len].to_vec();
                            let source = self.source.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_request(data, peer, source).await {
                                    error!(error = %e, peer = %peer, "TFTP request failed");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "error receiving packet");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("TFTP listener shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for TftpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TftpServer")
            .field("bind_addr", &self.bind_addr)
            .finish_non_exhaustive()
    }
}

/// Dispatch one inbound packet
async fn handle_request(
    data: Vec<u8>,
    peer: SocketAddr,
    source: Arc<dyn ArtifactSource>,
) -> Result<()> {
    match TftpPacket::parse(&data)? {
        TftpPacket::ReadRequest { filename, options } => {
            serve_read(peer, &filename, options, source).await
        }
        TftpPacket::WriteRequest { .. } => {
            send_error(peer, ErrorCode::AccessViolation, "writes not supported").await
        }
        _ => send_error(peer, ErrorCode::IllegalOperation, "expected RRQ").await,
    }
}

/// Serve a read request over a fresh ephemeral-port socket
async fn serve_read(
    peer: SocketAddr,
    filename: &str,
    options: TftpOptions,
    source: Arc<dyn ArtifactSource>,
) -> Result<()> {
    let filename = filename.trim_start_matches('/');
    debug!(peer = %peer, filename = %filename, "read request");

    let file_data = match source.fetch(filename).await {
        Some(data) => data,
        None => {
            warn!(peer = %peer, filename = %filename, "artifact not found");
            return send_error(peer, ErrorCode::FileNotFound, "file not found").await;
        }
    };
    let file_size = file_data.len() as u64;

    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(TftpError::Io)?;

    let mut block_size = options
        .blksize
        .map(|b| b.clamp(8, MAX_BLOCK_SIZE))
        .unwrap_or(DEFAULT_BLOCK_SIZE);
    let timeout_secs = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
    let wait = Duration::from_secs(u64::from(timeout_secs));

    // RFC 2347: acknowledge only the options the client asked for. A client
    // that rejects the OACK with an ERROR gets a plain RFC 1350 transfer.
    if !options.is_empty() {
        let oack = TftpPacket::oack(TftpOptions {
            blksize: options.blksize.map(|_| block_size),
            tsize: options.tsize.map(|_| file_size),
            timeout: options.timeout,
        });
        socket
            .send_to(&oack.encode(), peer)
            .await
            .map_err(TftpError::Io)?;

        let mut ack_buf = [0u8; 512];
        match timeout(wait, socket.recv_from(&mut ack_buf)).await {
            Ok(Ok((len, _))) => match TftpPacket::parse(&ack_buf[..len])? {
                TftpPacket::Ack { block: 0 } => {}
                TftpPacket::Error { code, message } => {
                    warn!(
                        peer = %peer,
                        code = code,
                        message = %message,
                        "client rejected OACK, falling back to defaults"
                    );
                    block_size = DEFAULT_BLOCK_SIZE;
                }
                _ => {
                    return send_error_on(&socket, peer, ErrorCode::IllegalOperation, "expected ACK 0")
                        .await;
                }
            },
            Ok(Err(e)) => return Err(TftpError::Io(e)),
            Err(_) => {
                return Err(TftpError::Timeout {
                    filename: filename.to_string(),
                })
            }
        }
    }

    // RFC 1350 lockstep: send one block, wait for its ACK, repeat. The
    // transfer ends with the first block shorter than the block size.
    let block_size = block_size as usize;
    let mut block: u16 = 1;
    let mut offset = 0usize;

    loop {
        let end = (offset + block_size).min(file_data.len());
        let chunk = file_data.slice(offset..end);
        let last = chunk.len() < block_size;
        let packet = TftpPacket::data(block, chunk);

        let mut retries = 0;
        loop {
            socket
                .send_to(&packet.encode(), peer)
                .await
                .map_err(TftpError::Io)?;

            let mut ack_buf = [0u8; 512];
            match timeout(wait, socket.recv_from(&mut ack_buf)).await {
                Ok(Ok((len, _))) => match TftpPacket::parse(&ack_buf[..len])? {
                    TftpPacket::Ack { block: acked } if acked == block => break,
                    TftpPacket::Ack { .. } => {
                        // stale ACK from an earlier block; keep waiting
                        continue;
                    }
                    TftpPacket::Error { code, message } => {
                        warn!(peer = %peer, code = code, message = %message, "client aborted");
                        return Ok(());
                    }
                    _ => {
                        return send_error_on(
                            &socket,
                            peer,
                            ErrorCode::IllegalOperation,
                            "expected ACK",
                        )
                        .await;
                    }
                },
                Ok(Err(e)) => return Err(TftpError::Io(e)),
                Err(_) => {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(TftpError::Timeout {
                            filename: filename.to_string(),
                        });
                    }
                    debug!(peer = %peer, block = block, retry = retries, "retransmitting");
                }
            }
        }

        offset = end;
        if last {
            break;
        }
        block = block.wrapping_add(1);
    }

    info!(peer = %peer, filename = %filename, bytes = file_size, "transfer completed");
    Ok(())
}

/// Send an error packet from a fresh socket
async fn send_error(peer: SocketAddr, code: ErrorCode, message: &str) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(TftpError::Io)?;
    send_error_on(&socket, peer, code, message).await
}

/// Send an error packet on an existing socket
async fn send_error_on(
    socket: &UdpSocket,
    peer: SocketAddr,
    code: ErrorCode,
    message: &str,
) -> Result<()> {
    socket
        .send_to(&TftpPacket::error(code, message).encode(), peer)
        .await
        .map_err(TftpError::Io)?;
    Ok(())
}

/// In-memory artifact source for tests and static content
pub struct MemorySource {
    files: HashMap<String, Bytes>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    /// Add an artifact
    pub fn add(&mut self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.files.insert(path.into(), data.into());
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactSource for MemorySource {
    async fn fetch(&self, path: &str) -> Option<Bytes> {
        self.files.get(path).cloned()
    }
}
