use super::{CameraState, Effect, Event, ImageFormat, Session};
use crate::errors::{OriginError, OriginResult};
use crate::journal::Direction;
use crate::protocol::ImageNotification;
use bytes::Bytes;

/// What kind of file a notification announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Caller-requested capture, TIFF.
    Snapshot,
    /// Unsolicited preview, usually JPEG.
    LiveFrame,
}

impl ImageKind {
    /// `.tif` / `.tiff` (any case) is a snapshot, anything else a live frame.
    pub fn of(path: &str) -> Self {
        match ImageFormat::from_path(path) {
            ImageFormat::Tiff => Self::Snapshot,
            ImageFormat::Jpeg | ImageFormat::Raw => Self::LiveFrame,
        }
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDecision {
    /// Don't fetch anything.
    Ignore,
    /// Fetch a live frame from this path.
    FetchLiveFrame(String),
    /// Fetch a snapshot from this path.
    FetchSnapshot(String),
}

/// Decide what to do with a `NewImageReady` notification.
///
/// Live frames are never fetched while a snapshot is outstanding, so they
/// can't overwrite its result.
pub fn classify(notification: &ImageNotification, snapshot_in_progress: bool) -> ImageDecision {
    let path = &notification.file_location;
    if path.is_empty() {
        return ImageDecision::Ignore;
    }
    match ImageKind::of(path) {
        ImageKind::Snapshot => ImageDecision::FetchSnapshot(path.clone()),
        ImageKind::LiveFrame if snapshot_in_progress => ImageDecision::Ignore,
        ImageKind::LiveFrame => ImageDecision::FetchLiveFrame(path.clone()),
    }
}

/// Metadata travelling with an image download.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageContext {
    /// Path from the notification.
    pub remote_path: String,
    /// Snapshot or live frame.
    pub kind: ImageKind,
    /// Right ascension, radians.
    pub ra: f64,
    /// Declination, radians.
    pub dec: f64,
    /// Exposure, seconds.
    pub exposure: f64,
    /// Whether this download completes a running exposure.
    pub drives_exposure: bool,
}

/// A download the driver should perform.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    /// Full URL on the image server.
    pub url: String,
    /// Handed back with the result.
    pub context: ImageContext,
}

/// A downloaded image with its sky position.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedImage {
    /// Path from the notification.
    pub remote_path: String,
    /// Raw file contents.
    pub data: Bytes,
    /// Right ascension, radians.
    pub ra: f64,
    /// Declination, radians.
    pub dec: f64,
    /// Exposure, seconds.
    pub exposure: f64,
}

impl DownloadedImage {
    fn new(context: &ImageContext, data: Bytes) -> Self {
        Self {
            remote_path: context.remote_path.clone(),
            data,
            ra: context.ra,
            dec: context.dec,
            exposure: context.exposure,
        }
    }
}

impl Session {
    pub(super) fn on_image_ready(&mut self, notification: &ImageNotification) {
        let (remote_path, kind) = match classify(notification, self.snapshot_in_progress) {
            ImageDecision::Ignore => {
                tracing::debug!(
                    path = %notification.file_location,
                    snapshot_in_progress = self.snapshot_in_progress,
                    "Skipping image notification"
                );
                return;
            }
            ImageDecision::FetchSnapshot(path) => (path, ImageKind::Snapshot),
            ImageDecision::FetchLiveFrame(path) => (path, ImageKind::LiveFrame),
        };
        let Some(host) = &self.host else {
            tracing::warn!(path = %remote_path, "Image announced before any connection");
            return;
        };
        let url = self.config.image_url(host, &remote_path);

        let drives_exposure = self.camera.exposure_complete(&remote_path);
        if drives_exposure {
            self.emit(Event::CameraStateChanged(CameraState::Reading));
            self.emit(Event::ExposureComplete);
        }

        tracing::debug!(%url, ?kind, drives_exposure, "Fetching image");
        self.effects.push(Effect::Fetch(ImageRequest {
            url,
            context: ImageContext {
                remote_path,
                kind,
                ra: notification.ra,
                dec: notification.dec,
                exposure: notification.exposure,
                drives_exposure,
            },
        }));
    }

    /// An image download requested through [`Effect::Fetch`] finished.
    #[tracing::instrument(level = "debug", skip(self, result), fields(path = %context.remote_path))]
    pub fn on_download_complete(&mut self, context: ImageContext, result: OriginResult<Bytes>) {
        match result {
            Ok(data) => self.on_download_success(context, data),
            Err(err) => self.on_download_failure(&context, &err),
        }
    }

    fn on_download_success(&mut self, context: ImageContext, data: Bytes) {
        tracing::debug!(len = data.len(), kind = ?context.kind, "Image downloaded");
        self.save_image(&context, &data);

        match context.kind {
            ImageKind::Snapshot => {
                self.end_snapshot();
                tracing::debug!("Snapshot complete, resuming live frames");
                self.emit(Event::SnapshotDownloaded(DownloadedImage::new(&context, data.clone())));
            }
            ImageKind::LiveFrame => match image::load_from_memory(&data) {
                Ok(image) => {
                    self.camera.set_live_image(image);
                    self.emit(Event::LiveImageDownloaded(DownloadedImage::new(&context, data.clone())));
                }
                Err(err) => tracing::warn!(%err, "Failed to decode live frame"),
            },
        }

        if context.drives_exposure {
            self.camera.finish_download(&context.remote_path, data);
            self.emit(Event::ImageReady {
                remote_path: context.remote_path,
            });
            self.emit(Event::CameraStateChanged(self.camera.state));
        }
    }

    fn on_download_failure(&mut self, context: &ImageContext, err: &OriginError) {
        tracing::warn!(%err, "Image download failed");
        self.journal.record(
            Direction::Error,
            format_args!("Image download failed for {}: {err}", context.remote_path),
        );
        self.end_snapshot();

        if context.drives_exposure && self.camera.fail_download() {
            self.emit(Event::CameraStateChanged(CameraState::Error));
        }
    }

    fn save_image(&self, context: &ImageContext, data: &[u8]) {
        if !self.save_images {
            return;
        }
        let Some(store) = &self.image_store else {
            return;
        };
        if let Err(err) = store.save(
            data,
            &context.remote_path,
            context.ra,
            context.dec,
            context.exposure,
        ) {
            tracing::warn!(%err, "Failed to save image");
        }
    }
}
