use crate::config::OriginConfig;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(150);

type Images = Arc<Mutex<HashMap<String, Bytes>>>;

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// In-process fake of an Origin telescope.
///
/// Accepts control channel connections on one ephemeral port and serves
/// registered images over HTTP on another. Commands received from the
/// client are queued for [`Self::next_command`]; notifications pushed with
/// [`Self::notify`] go to the current connection.
#[derive(Debug)]
pub struct MockOrigin {
    control_addr: SocketAddr,
    image_addr: SocketAddr,
    images: Images,
    commands: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    tasks: [JoinHandle<()>; 2],
}

impl Drop for MockOrigin {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve_image(
    State(images): State<Images>,
    Path(path): Path<String>,
) -> Result<Bytes, StatusCode> {
    images
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&path)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn serve_control(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<Value>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Ok((stream, peer)) = listener.accept().await {
        let mut socket = match tokio_tungstenite::accept_async(stream).await {
            Ok(socket) => socket,
            Err(err) => {
                tracing::warn!(%err, %peer, "Mock handshake failed");
                continue;
            }
        };
        tracing::debug!(%peer, "Mock accepted control connection");

        loop {
            tokio::select! {
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str(text.as_str()) {
                            Ok(command) => {
                                let _ = commands.send(command);
                            }
                            Err(err) => tracing::warn!(%err, "Mock received invalid JSON"),
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                message = outgoing.recv() => match message {
                    Some(Outgoing::Text(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outgoing::Close) => {
                        let _ = socket.close(None).await;
                        break;
                    }
                    None => return,
                },
            }
        }
        tracing::debug!(%peer, "Mock control connection ended");
    }
}

impl MockOrigin {
    /// Bind both servers on localhost.
    pub async fn start() -> eyre::Result<Self> {
        let control = TcpListener::bind("127.0.0.1:0").await?;
        let control_addr = control.local_addr()?;
        let image_listener = TcpListener::bind("127.0.0.1:0").await?;
        let image_addr = image_listener.local_addr()?;

        let images = Images::default();
        let router = Router::new()
            .route("/SmartScope-1.0/dev2/{*path}", get(serve_image))
            .with_state(Arc::clone(&images));

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let tasks = [
            tokio::spawn(serve_control(control, commands_tx, outgoing_rx)),
            tokio::spawn(async move {
                if let Err(err) = axum::serve(image_listener, router).await {
                    tracing::warn!(%err, "Mock image server failed");
                }
            }),
        ];

        tracing::debug!(%control_addr, %image_addr, "Mock Origin started");
        Ok(Self {
            control_addr,
            image_addr,
            images,
            commands: tokio::sync::Mutex::new(commands),
            outgoing,
            tasks,
        })
    }

    /// Host to connect to.
    pub const fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    /// Port of the control channel.
    pub const fn control_port(&self) -> u16 {
        self.control_addr.port()
    }

    /// Default settings pointed at the mock image server.
    pub fn config(&self) -> OriginConfig {
        OriginConfig {
            image_port: Some(self.image_addr.port()),
            ..OriginConfig::default()
        }
    }

    /// Next command received on the control channel.
    pub async fn next_command(&self) -> eyre::Result<Value> {
        let mut commands = self.commands.lock().await;
        tokio::time::timeout(RECEIVE_TIMEOUT, commands.recv())
            .await?
            .ok_or_else(|| eyre::eyre!("mock control server stopped"))
    }

    /// Discard queued commands, returning once none has arrived for a short
    /// quiet period.
    pub async fn drain_commands(&self) -> Vec<Value> {
        let mut commands = self.commands.lock().await;
        let mut drained = Vec::new();
        while let Ok(Some(command)) = tokio::time::timeout(QUIET_PERIOD, commands.recv()).await {
            drained.push(command);
        }
        drained
    }

    /// Skip commands until one named `name` arrives.
    pub async fn expect_command(&self, name: &str) -> eyre::Result<Value> {
        loop {
            let command = self.next_command().await?;
            if command["Command"] == name {
                return Ok(command);
            }
            tracing::trace!(%command, "Skipping command");
        }
    }

    /// Push a message to the connected client.
    pub fn notify(&self, message: &Value) -> eyre::Result<()> {
        self.outgoing
            .send(Outgoing::Text(message.to_string()))
            .map_err(|_closed| eyre::eyre!("mock control server stopped"))
    }

    /// Close the current control connection from the device side.
    pub fn drop_connection(&self) -> eyre::Result<()> {
        self.outgoing
            .send(Outgoing::Close)
            .map_err(|_closed| eyre::eyre!("mock control server stopped"))
    }

    /// Serve `data` at `<image prefix>/<path>`.
    pub fn serve_image(&self, path: &str, data: impl Into<Bytes>) {
        let _ = self
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), data.into());
    }
}
