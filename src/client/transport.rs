use crate::errors::{OriginError, OriginResult};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub(crate) type ControlStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the control channel, giving up after `timeout`.
#[tracing::instrument(level = "debug", err(level = "warn"))]
pub(crate) async fn open(url: &str, timeout: Duration) -> OriginResult<ControlStream> {
    let (stream, response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_elapsed| OriginError::ConnectTimeout(timeout))??;
    tracing::debug!(status = %response.status(), "Control channel open");
    Ok(stream)
}
