//! Session settings.

use crate::image_store::session_dir;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

/// Settings for one telescope session.
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// WebSocket path of the control channel.
    ///
    /// Defaults to `SmartScope-1.0/mountControlEndpoint`.
    pub control_path: String,
    /// Path prefix under which the image server exposes files.
    ///
    /// Defaults to `SmartScope-1.0/dev2`.
    pub image_path_prefix: String,
    /// Port of the image server.
    ///
    /// Defaults to `None`, meaning the standard HTTP port.
    pub image_port: Option<u16>,
    /// `Source` tag put on every outbound command.
    ///
    /// Defaults to `AlpacaServer`.
    pub source_tag: String,
    /// How long [`OriginClient::connect`](crate::OriginClient::connect) waits
    /// for the control channel.
    ///
    /// Defaults to 10 seconds.
    pub connect_timeout: Duration,
    /// Period of the status query rotation.
    ///
    /// Defaults to 5 seconds.
    pub status_interval: Duration,
    /// Period of keep-alive pings.
    ///
    /// Defaults to 15 seconds.
    pub ping_interval: Duration,
    /// Age after which unanswered commands are forgotten.
    ///
    /// Defaults to 60 seconds.
    pub pending_command_ttl: Duration,
    /// Sequence id of the first command sent.
    ///
    /// Defaults to 2000.
    pub first_sequence_id: u64,
    /// Directory for the session journal.
    ///
    /// Defaults to `None`, which disables the journal.
    pub log_dir: Option<PathBuf>,
    /// Directory downloaded images are saved to.
    ///
    /// Defaults to `None`, which disables image saving.
    pub image_save_dir: Option<PathBuf>,
    /// Site latitude sent with `RunInitialize`, degrees.
    ///
    /// Defaults to 52.2.
    pub site_latitude_deg: f64,
    /// Site longitude sent with `RunInitialize`, degrees.
    ///
    /// Defaults to 0.
    pub site_longitude_deg: f64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            control_path: "SmartScope-1.0/mountControlEndpoint".to_owned(),
            image_path_prefix: "SmartScope-1.0/dev2".to_owned(),
            image_port: None,
            source_tag: "AlpacaServer".to_owned(),
            connect_timeout: Duration::from_secs(10),
            status_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(15),
            pending_command_ttl: Duration::from_secs(60),
            first_sequence_id: 2000,
            log_dir: None,
            image_save_dir: None,
            site_latitude_deg: 52.2,
            site_longitude_deg: 0.0,
        }
    }
}

impl OriginConfig {
    /// Store the journal under `<root>/CelestronOriginLogs` and images under
    /// `<root>/CelestronOriginImages/session_<timestamp>`.
    #[must_use]
    pub fn with_output_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.log_dir = Some(root.join("CelestronOriginLogs"));
        self.image_save_dir = Some(session_dir(root, OffsetDateTime::now_utc()));
        self
    }

    /// `ws://host:port/<control_path>`.
    pub fn control_url(&self, host: &str, port: u16) -> String {
        format!("ws://{host}:{port}/{}", self.control_path)
    }

    /// `http://host[:image_port]/<image_path_prefix>/<remote_path>`.
    ///
    /// The remote path is used verbatim.
    pub fn image_url(&self, host: &str, remote_path: &str) -> String {
        match self.image_port {
            Some(port) => format!("http://{host}:{port}/{}/{remote_path}", self.image_path_prefix),
            None => format!("http://{host}/{}/{remote_path}", self.image_path_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_device_urls() {
        let config = OriginConfig::default();
        assert_eq!(
            config.control_url("192.168.1.50", 80),
            "ws://192.168.1.50:80/SmartScope-1.0/mountControlEndpoint"
        );
        assert_eq!(
            config.image_url("192.168.1.50", "Images/Temp/0.jpg"),
            "http://192.168.1.50/SmartScope-1.0/dev2/Images/Temp/0.jpg"
        );

        let config = OriginConfig {
            image_port: Some(8080),
            ..config
        };
        assert_eq!(
            config.image_url("localhost", "Images/Astrophotography/capture_0001.tiff"),
            "http://localhost:8080/SmartScope-1.0/dev2/Images/Astrophotography/capture_0001.tiff"
        );
    }

    #[test]
    fn output_root_layout() {
        let config = OriginConfig::default().with_output_root("/data/origin");
        assert_eq!(
            config.log_dir.as_deref(),
            Some(Path::new("/data/origin/CelestronOriginLogs"))
        );
        let images = config.image_save_dir.unwrap_or_default();
        assert!(images.starts_with("/data/origin/CelestronOriginImages"));
        assert!(
            images
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("session_"))
        );
    }
}
