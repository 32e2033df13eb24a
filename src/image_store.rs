//! Saving downloaded images with a metadata sidecar.

use crate::journal::file_timestamp;
use crate::session::ImageFormat;
use crate::units::{radians_to_degrees, radians_to_hours};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;

/// Writes downloaded images plus a human-readable metadata sidecar.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

/// `<root>/CelestronOriginImages/session_<timestamp>`.
pub fn session_dir(root: &Path, started_at: OffsetDateTime) -> PathBuf {
    root.join("CelestronOriginImages")
        .join(format!("session_{}", file_timestamp(started_at)))
}

/// Local extension for a remote path. Anything that isn't a TIFF is saved as
/// a JPEG.
fn extension_of(remote_path: &str) -> &'static str {
    match ImageFormat::from_path(remote_path) {
        ImageFormat::Tiff => "tiff",
        ImageFormat::Jpeg | ImageFormat::Raw => "jpg",
    }
}

impl ImageStore {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Like [`Self::new`], but falls back to the parent of `dir` if `dir`
    /// itself can't be created.
    pub fn create_or_fallback(dir: PathBuf) -> Option<Self> {
        match Self::new(&dir) {
            Ok(store) => {
                tracing::debug!(dir = %dir.display(), "Saving images");
                Some(store)
            }
            Err(err) => {
                tracing::warn!(%err, dir = %dir.display(), "Failed to create image directory, falling back to its parent");
                let parent = dir.parent()?.to_path_buf();
                Self::new(parent)
                    .inspect_err(|err| tracing::warn!(%err, "Image saving disabled"))
                    .ok()
            }
        }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `data` and its sidecar. Empty payloads are skipped.
    ///
    /// `ra` and `dec` are in radians, `exposure` in seconds.
    #[tracing::instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    pub fn save(
        &self,
        data: &[u8],
        original_path: &str,
        ra: f64,
        dec: f64,
        exposure: f64,
    ) -> io::Result<Option<PathBuf>> {
        if data.is_empty() {
            return Ok(None);
        }

        let now = OffsetDateTime::now_utc();
        let extension = extension_of(original_path);
        let ra_hours = format!("{:.4}", radians_to_hours(ra));
        let dec_degrees = format!("{:.4}", radians_to_degrees(dec));
        let millis = now.millisecond();
        let filename = format!(
            "image_{}_{millis:03}_ra{ra_hours}_dec{dec_degrees}_exp{exposure:.2}s.{extension}",
            file_timestamp(now),
        );
        let path = self.dir.join(&filename);
        fs::write(&path, data)?;

        let timestamp = now
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
            ))
            .unwrap_or_default();
        let sidecar = format!(
            "Image: {filename}\n\
             Timestamp: {timestamp}\n\
             RA (hours): {ra_hours}\n\
             Dec (degrees): {dec_degrees}\n\
             RA (radians): {ra}\n\
             Dec (radians): {dec}\n\
             Exposure (seconds): {exposure}\n\
             Size (bytes): {size}\n\
             Format: {format}\n\
             Original path: {original_path}\n",
            size = data.len(),
            format = extension.to_ascii_uppercase(),
        );
        let mut sidecar_path = path.clone().into_os_string();
        sidecar_path.push(".txt");
        fs::write(&sidecar_path, sidecar)?;

        tracing::debug!(path = %path.display(), "Saved image");
        Ok(Some(path))
    }
}
