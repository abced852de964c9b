//! Daemon side of the IPC socket
//!
//! Each client gets its own task. Requests are answered in order and every
//! pipeline event broadcast by the daemon is forwarded to every client.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::backend::CaptureSource;
use crate::events::PipelineEvent;
use crate::ipc::{MonitorMessage, MonitorRequest, MonitorServer, read_message, write_message};
use crate::pipeline::TrackingSession;

/// Shared state handed to every client task
pub struct IpcContext<C> {
    pub session: Arc<TrackingSession<C>>,
    pub events: broadcast::Sender<MonitorMessage>,
    pub shutdown: mpsc::UnboundedSender<()>,
}

impl<C> Clone for IpcContext<C> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Spawn the accept loop; the socket file is removed when the task ends
pub fn spawn_ipc_listener<C: CaptureSource>(server: MonitorServer, context: IpcContext<C>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(socket = ?server.path(), "IPC listener started");
        loop {
            let stream = match server.accept().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = ?e, "IPC listener crashed");
                    break;
                }
            };

            info!("Client connected to monitor daemon");
            let context = context.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, context).await {
                    warn!(error = ?e, "IPC connection closed or error");
                }
                info!("Client disconnected from monitor daemon");
            });
        }
    })
}

/// Fan the session's event stream out to connected clients until it closes
pub async fn forward_events(
    mut events: mpsc::UnboundedReceiver<PipelineEvent>,
    clients: broadcast::Sender<MonitorMessage>,
) {
    while let Some(event) = events.recv().await {
        if let PipelineEvent::CaptureFailed { window, reason, .. } = &event {
            warn!(window = %window, error = %reason, "Window capture disabled, re-enable via IPC");
        }
        if clients.send(MonitorMessage::from(&event)).is_err() {
            trace!(window = %event.window(), "No IPC clients connected, event dropped");
        }
    }
    debug!("Event stream closed");
}

async fn serve_client<C: CaptureSource>(stream: UnixStream, context: IpcContext<C>) -> Result<()> {
    let mut events = context.events.subscribe();
    let (mut reader, mut writer) = stream.into_split();

    // Reads are not cancel-safe, so they run on their own task
    let (request_tx, mut requests) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(async move {
        loop {
            match read_message::<_, MonitorRequest>(&mut reader).await {
                Ok(request) => {
                    if request_tx.send(request).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Stopped reading IPC requests");
                    break;
                }
            }
        }
    });

    let result = async {
        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    let reply = handle_request(&context, request);
                    write_message(&mut writer, &reply).await?;
                }
                event = events.recv() => match event {
                    Ok(message) => write_message(&mut writer, &message).await?,
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "IPC client lagging, events dropped"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    reader_task.abort();
    result
}

fn handle_request<C: CaptureSource>(context: &IpcContext<C>, request: MonitorRequest) -> MonitorMessage {
    match request {
        MonitorRequest::Ping => MonitorMessage::Pong,

        MonitorRequest::ListWindows => MonitorMessage::Windows(context.session.status()),

        MonitorRequest::SetInterval { window, interval_ms } => {
            if interval_ms == 0 {
                return MonitorMessage::Error("interval must be positive".to_string());
            }
            if context
                .session
                .set_interval(window, Duration::from_millis(interval_ms))
            {
                info!(window = %window, interval_ms, "Interval changed via IPC");
                MonitorMessage::Ready
            } else {
                MonitorMessage::Error(format!("window {window} is not tracked"))
            }
        }

        MonitorRequest::Enable { window } => {
            if context.session.enable(window) {
                MonitorMessage::Ready
            } else {
                MonitorMessage::Error(format!("window {window} is not tracked"))
            }
        }

        MonitorRequest::Shutdown => {
            info!("Received shutdown request via IPC");
            context.shutdown.send(()).ok();
            MonitorMessage::Ready
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertLevel;
    use crate::config::Config;
    use crate::events::AlertEvent;
    use crate::ipc::MonitorClient;
    use crate::testing::{FakeCapture, window_info};
    use crate::types::WindowId;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("eve-l-monitor-test-{}", std::process::id()))
            .join(format!("{name}.sock"))
    }

    struct Daemon {
        events: broadcast::Sender<MonitorMessage>,
        shutdown_rx: mpsc::UnboundedReceiver<()>,
        session: Arc<TrackingSession<FakeCapture>>,
        listener: JoinHandle<()>,
        path: PathBuf,
    }

    async fn daemon(name: &str) -> Daemon {
        let path = socket_path(name);
        let server = MonitorServer::bind_to(path.clone()).unwrap();
        let (session, _rx) = TrackingSession::start(Arc::new(FakeCapture::new()), Config::default());
        let session = Arc::new(session);
        let (events, _) = broadcast::channel(16);
        let (shutdown, shutdown_rx) = mpsc::unbounded_channel();
        let listener = spawn_ipc_listener(
            server,
            IpcContext {
                session: Arc::clone(&session),
                events: events.clone(),
                shutdown,
            },
        );
        Daemon {
            events,
            shutdown_rx,
            session,
            listener,
            path,
        }
    }

    #[tokio::test]
    async fn test_socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let daemon = daemon("perms").await;
        let mode = std::fs::metadata(&daemon.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        daemon.listener.abort();
        let _ = daemon.listener.await;
        assert!(!daemon.path.exists());
        daemon.session.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_are_answered() {
        let daemon = daemon("requests").await;
        let mut client = MonitorClient::connect_to(&daemon.path).await.unwrap();

        assert_eq!(client.request(MonitorRequest::Ping).await.unwrap(), MonitorMessage::Pong);

        daemon.session.track(&window_info(5, "EVE - Alice"));
        match client.request(MonitorRequest::ListWindows).await.unwrap() {
            MonitorMessage::Windows(windows) => {
                assert_eq!(windows.len(), 1);
                assert_eq!(windows[0].id, WindowId(5));
            }
            other => panic!("unexpected reply {other:?}"),
        }

        assert_eq!(
            client
                .request(MonitorRequest::SetInterval { window: WindowId(5), interval_ms: 250 })
                .await
                .unwrap(),
            MonitorMessage::Ready
        );
        assert_eq!(daemon.session.windows()[0].interval, Duration::from_millis(250));

        assert!(matches!(
            client
                .request(MonitorRequest::Enable { window: WindowId(99) })
                .await
                .unwrap(),
            MonitorMessage::Error(_)
        ));
        daemon.session.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_reach_every_client() {
        let daemon = daemon("events").await;
        let mut first = MonitorClient::connect_to(&daemon.path).await.unwrap();
        let mut second = MonitorClient::connect_to(&daemon.path).await.unwrap();
        // Round trips guarantee both client tasks have subscribed
        first.request(MonitorRequest::Ping).await.unwrap();
        second.request(MonitorRequest::Ping).await.unwrap();

        let alert = MonitorMessage::Alert(AlertEvent {
            window: WindowId(1),
            level: AlertLevel::High,
            timestamp: SystemTime::now(),
        });
        daemon.events.send(alert.clone()).unwrap();

        assert_eq!(first.recv().await.unwrap(), alert);
        assert_eq!(second.recv().await.unwrap(), alert);
        daemon.session.shutdown().await;
    }

    #[tokio::test]
    async fn test_forward_events_until_stream_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (clients, mut subscriber) = broadcast::channel(16);
        let forwarder = tokio::spawn(forward_events(rx, clients));

        tx.send(PipelineEvent::FrameAvailable { window: WindowId(2), sequence: 9 })
            .unwrap();
        drop(tx);
        forwarder.await.unwrap();

        assert_eq!(
            subscriber.recv().await.unwrap(),
            MonitorMessage::FrameAvailable { window: WindowId(2), sequence: 9 }
        );
        assert!(matches!(subscriber.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_request_signals_daemon() {
        let mut daemon = daemon("shutdown").await;
        let mut client = MonitorClient::connect_to(&daemon.path).await.unwrap();

        assert_eq!(client.request(MonitorRequest::Shutdown).await.unwrap(), MonitorMessage::Ready);
        assert_eq!(daemon.shutdown_rx.recv().await, Some(()));
        daemon.session.shutdown().await;
    }
}
