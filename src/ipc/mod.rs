//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Lets `monitor` clients talk to a running `watch` daemon.
//! Uses length-prefixed JSON over Unix domain sockets.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

mod messages;
pub mod server;

pub use messages::{MonitorMessage, MonitorRequest};

use crate::constants::ipc::{MAX_MESSAGE_SIZE, SOCKET_PATH};

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(SOCKET_PATH));
    }

    // Fallback to cache dir
    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(SOCKET_PATH))
}

/// Client connection to the daemon
pub struct MonitorClient {
    stream: UnixStream,
}

impl MonitorClient {
    /// Connect to the daemon's default socket
    pub async fn connect() -> Result<Self> {
        let path = default_socket_path()?;
        Self::connect_to(&path).await
    }

    /// Connect to specific socket path
    pub async fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("Failed to connect to monitor at {}", path.display()))?;
        Ok(Self { stream })
    }

    pub async fn send_request(&mut self, req: &MonitorRequest) -> Result<()> {
        write_message(&mut self.stream, req).await
    }

    /// Next reply or event from the daemon
    pub async fn recv(&mut self) -> Result<MonitorMessage> {
        read_message(&mut self.stream).await
    }

    /// Send a request and wait for its reply, skipping events that arrive first
    pub async fn request(&mut self, req: MonitorRequest) -> Result<MonitorMessage> {
        self.send_request(&req).await?;
        loop {
            match self.recv().await? {
                MonitorMessage::Alert(_)
                | MonitorMessage::CaptureFailed { .. }
                | MonitorMessage::FrameAvailable { .. } => continue,
                reply => return Ok(reply),
            }
        }
    }
}

/// Listening socket of the daemon
pub struct MonitorServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl MonitorServer {
    /// Create server and bind to default socket path
    pub fn bind() -> Result<Self> {
        let socket_path = default_socket_path()?;
        Self::bind_to(socket_path)
    }

    /// Create server and bind to specific socket path; must be called inside a tokio runtime
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Remove stale socket if exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .with_context(|| format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind socket at {}", socket_path.display()))?;

        // Set permissions to 0700 (owner only)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for MonitorServer {
    fn drop(&mut self) {
        // Clean up socket file
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write length-prefixed message to stream
pub(crate) async fn write_message<W, T>(stream: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", json.len(), MAX_MESSAGE_SIZE));
    }

    // Write length prefix (u32 little-endian)
    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .await
        .context("Failed to write message length")?;

    stream
        .write_all(&json)
        .await
        .context("Failed to write message payload")?;

    stream.flush().await.context("Failed to flush stream")?;
    Ok(())
}

/// Read length-prefixed message from stream
pub(crate) async fn read_message<R, T>(stream: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .await
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowId;

    #[tokio::test]
    async fn test_framing_over_socket_pair() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        write_message(&mut a, &MonitorRequest::Enable { window: WindowId(7) })
            .await
            .unwrap();
        write_message(&mut a, &MonitorRequest::Ping).await.unwrap();

        let first: MonitorRequest = read_message(&mut b).await.unwrap();
        let second: MonitorRequest = read_message(&mut b).await.unwrap();
        assert_eq!(first, MonitorRequest::Enable { window: WindowId(7) });
        assert_eq!(second, MonitorRequest::Ping);
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let len = (MAX_MESSAGE_SIZE as u32) + 1;
        a.write_all(&len.to_le_bytes()).await.unwrap();

        let err = read_message::<_, MonitorRequest>(&mut b).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_garbage_payload_is_an_error() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        a.write_all(&3u32.to_le_bytes()).await.unwrap();
        a.write_all(b"{{{").await.unwrap();

        assert!(read_message::<_, MonitorRequest>(&mut b).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_stream_is_an_error() {
        let (a, mut b) = UnixStream::pair().unwrap();
        drop(a);
        assert!(read_message::<_, MonitorMessage>(&mut b).await.is_err());
    }
}
