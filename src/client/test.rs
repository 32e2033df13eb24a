use super::{HttpImageFetcher, OriginClient};
use crate::errors::OriginError;
use crate::journal::Journal;
use crate::journal::tests::SharedBuffer;
use crate::session::{CameraState, Event, ImageFormat, Session};
use crate::test_utils::MockOrigin;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Collect events up to and including the first one matching `done`.
async fn wait_for(
    events: &mut broadcast::Receiver<Event>,
    mut done: impl FnMut(&Event) -> bool,
) -> eyre::Result<Vec<Event>> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await?;
            let finished = done(&event);
            seen.push(event);
            if finished {
                return Ok::<_, eyre::Report>(());
            }
        }
    })
    .await??;
    Ok(seen)
}

fn camera_states(events: &[Event]) -> Vec<CameraState> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::CameraStateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn exposure_downloads_announced_image() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let client = OriginClient::spawn(origin.config());
    let mut events = client.subscribe();

    client.connect(origin.host(), origin.control_port()).await?;
    let first = origin.expect_command("GetStatus").await?;
    assert_eq!(first["Destination"], "Mount");
    assert_eq!(first["Source"], "AlpacaServer");

    client.set_connected(true).await?;
    client.start_exposure(2.0, 400).await?;
    assert_eq!(client.camera_state().await?, CameraState::Exposing);

    let capture = origin.expect_command("RunSampleCapture").await?;
    assert_eq!(capture["Destination"], "TaskController");
    assert_eq!(capture["ExposureTime"], 2.0);
    assert_eq!(capture["ISO"], 400);

    origin.serve_image("Images/capture_0001.tiff", vec![0x2a_u8; 50_000]);
    origin.notify(&json!({
        "Type": "Notification",
        "Source": "ImageServer",
        "Command": "NewImageReady",
        "FileLocation": "Images/capture_0001.tiff",
        "Ra": 1.0,
        "Dec": 0.5,
        "ExposureTime": 2.0,
    }))?;

    let seen = wait_for(&mut events, |event| matches!(event, Event::ImageReady { .. })).await?;
    assert_eq!(
        camera_states(&seen),
        [CameraState::Exposing, CameraState::Reading]
    );
    assert!(
        seen.iter()
            .any(|event| matches!(event, Event::SnapshotDownloaded(image) if image.data.len() == 50_000))
    );

    let seen = wait_for(&mut events, |event| {
        matches!(event, Event::CameraStateChanged(_))
    })
    .await?;
    assert_eq!(camera_states(&seen), [CameraState::Idle]);

    assert_eq!(client.camera_state().await?, CameraState::Idle);
    assert!(client.is_image_ready().await?);
    let (data, format) = client.last_image().await?;
    assert_eq!(data.len(), 50_000);
    assert_eq!(format, Some(ImageFormat::Tiff));
    Ok(())
}

#[tokio::test]
async fn second_exposure_is_rejected_while_exposing() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let client = OriginClient::spawn(origin.config());
    client.connect(origin.host(), origin.control_port()).await?;
    client.set_connected(true).await?;

    client.start_exposure(2.0, 400).await?;
    let err = client.start_exposure(1.0, 100).await.unwrap_err();
    assert!(matches!(err, OriginError::CameraBusy(CameraState::Exposing)));
    assert_eq!(client.camera_state().await?, CameraState::Exposing);
    assert_eq!(
        client.with_session(|session| session.gain()).await?,
        400
    );
    Ok(())
}

#[tokio::test]
async fn reconnect_restarts_status_rotation() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let mut config = origin.config();
    config.status_interval = Duration::from_millis(250);
    let client = OriginClient::spawn(config);
    let mut events = client.subscribe();

    client.connect(origin.host(), origin.control_port()).await?;
    let mut destinations = Vec::new();
    for _ in 0..4 {
        let command = origin.next_command().await?;
        destinations.push(command["Destination"].clone());
    }
    // Initial query, then one per tick.
    assert_eq!(destinations, ["Mount", "Mount", "Environment", "Camera"]);

    client.disconnect()?;
    let _ = wait_for(&mut events, |event| matches!(event, Event::Disconnected)).await?;
    assert!(!client.status().await?.is_connected);
    // Ticks that raced the disconnect belong to the first connection.
    let _ = origin.drain_commands().await;

    client.connect(origin.host(), origin.control_port()).await?;
    assert_eq!(
        client
            .with_session(|session| session.status_rotation_index())
            .await?,
        0
    );
    let mut destinations = Vec::new();
    for _ in 0..3 {
        let command = origin.next_command().await?;
        destinations.push(command["Destination"].clone());
    }
    assert_eq!(destinations, ["Mount", "Mount", "Environment"]);
    Ok(())
}

#[tokio::test]
async fn device_side_close_disconnects() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let client = OriginClient::spawn(origin.config());
    let mut events = client.subscribe();
    client.connect(origin.host(), origin.control_port()).await?;
    client.set_connected(true).await?;

    origin.drop_connection()?;
    let _ = wait_for(&mut events, |event| matches!(event, Event::Disconnected)).await?;

    let status = client.status().await?;
    assert!(!status.is_connected);
    assert!(!status.is_logically_connected);
    assert!(matches!(
        client.goto(1.0, 2.0).await,
        Err(OriginError::NotConnected)
    ));
    Ok(())
}

#[tokio::test]
async fn live_frames_are_decoded() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let client = OriginClient::spawn(origin.config());
    let mut events = client.subscribe();
    client.connect(origin.host(), origin.control_port()).await?;

    let mut jpeg = Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(8, 8).write_to(&mut jpeg, image::ImageFormat::Jpeg)?;
    origin.serve_image("Live/frame.jpg", jpeg.into_inner());
    origin.notify(&json!({
        "Type": "Notification",
        "Source": "ImageServer",
        "Command": "NewImageReady",
        "FileLocation": "Live/frame.jpg",
    }))?;

    let seen = wait_for(&mut events, |event| {
        matches!(event, Event::LiveImageDownloaded(_))
    })
    .await?;
    assert!(camera_states(&seen).is_empty());
    let size = client
        .with_session(|session| session.last_image().map(|image| (image.width(), image.height())))
        .await?;
    assert_eq!(size, Some((8, 8)));
    Ok(())
}

#[tokio::test]
async fn missing_image_puts_camera_in_error() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let client = OriginClient::spawn(origin.config());
    let mut events = client.subscribe();
    client.connect(origin.host(), origin.control_port()).await?;
    client.set_connected(true).await?;
    client.start_exposure(1.0, 200).await?;

    origin.notify(&json!({
        "Type": "Notification",
        "Command": "NewImageReady",
        "FileLocation": "Images/missing.tiff",
    }))?;
    let _ = wait_for(&mut events, |event| {
        matches!(event, Event::CameraStateChanged(CameraState::Error))
    })
    .await?;

    assert!(client.start_exposure(1.0, 200).await.is_err());
    client.clear_camera_error().await?;
    client.start_exposure(1.0, 200).await?;
    assert_eq!(client.camera_state().await?, CameraState::Exposing);
    Ok(())
}

#[tokio::test]
async fn refused_connection_is_reported() -> eyre::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let client = OriginClient::spawn(crate::OriginConfig::default());
    let err = client.connect("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, OriginError::WebSocket(_)));
    assert!(!client.status().await?.is_connected);
    Ok(())
}

#[tokio::test]
async fn overlapping_connects_are_rejected() -> eyre::Result<()> {
    // Accepts TCP but never completes the WebSocket handshake.
    let silent = TcpListener::bind("127.0.0.1:0").await?;
    let port = silent.local_addr()?.port();

    let config = crate::OriginConfig {
        connect_timeout: Duration::from_millis(200),
        ..crate::OriginConfig::default()
    };
    let client = OriginClient::spawn(config);
    let (first, second) = tokio::join!(
        client.connect("127.0.0.1", port),
        client.connect("127.0.0.1", port)
    );
    assert!(matches!(first, Err(OriginError::ConnectTimeout(_))));
    assert!(matches!(second, Err(OriginError::ConnectInProgress)));
    drop(silent);
    Ok(())
}

#[tokio::test]
async fn disconnect_silences_status_rotation() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let mut config = origin.config();
    config.status_interval = Duration::from_millis(50);
    let client = OriginClient::spawn(config);
    let mut events = client.subscribe();

    client.connect(origin.host(), origin.control_port()).await?;
    let _ = origin.expect_command("GetStatus").await?;
    let _ = origin.next_command().await?;

    client.disconnect()?;
    let _ = wait_for(&mut events, |event| matches!(event, Event::Disconnected)).await?;
    let _ = origin.drain_commands().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(origin.drain_commands().await.is_empty());
    assert!(!client.status().await?.is_connected);
    Ok(())
}

#[tokio::test]
async fn keep_alive_pong_is_journaled() -> eyre::Result<()> {
    let origin = MockOrigin::start().await?;
    let mut config = origin.config();
    config.ping_interval = Duration::from_millis(50);
    let journal = SharedBuffer::default();
    let session = Session::new(config).with_journal(Journal::from_writer(journal.clone()));
    let client = OriginClient::spawn_with(session, Arc::new(HttpImageFetcher::default()));

    client.connect(origin.host(), origin.control_port()).await?;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !journal.contents().contains("] PONG: RTT: ") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    assert!(journal.contents().contains("] PING: Keep-alive ping sent"));
    Ok(())
}
