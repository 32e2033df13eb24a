use super::{CameraState, Event, Session};
use crate::errors::OriginResult;
use crate::protocol::{Destination, Params, params};

impl Session {
    /// Start an exposure of `duration` seconds at `gain` (ISO).
    ///
    /// Requires a logical connection and an idle camera. The exposure is
    /// captured as a snapshot, so live frames are ignored until its image
    /// has been downloaded.
    pub fn start_exposure(&mut self, duration: f64, gain: i64) -> OriginResult {
        self.require_logical_connection("start_exposure")?;
        self.camera
            .begin_exposure(duration, gain)
            .inspect_err(|err| tracing::warn!(%err, "Cannot start exposure"))?;

        self.exposure_owns_snapshot = !self.snapshot_in_progress;
        self.snapshot_in_progress = true;
        let _ = self.send(
            "RunSampleCapture",
            Destination::TaskController,
            params! { ExposureTime: duration, ISO: gain },
        );
        tracing::debug!(duration, gain, "Started exposure");
        self.emit(Event::ExposureStarted);
        self.emit(Event::CameraStateChanged(CameraState::Exposing));
        Ok(())
    }

    /// Abort the running exposure.
    ///
    /// The camera goes back to idle immediately; a download that was already
    /// triggered still runs to completion. A snapshot requested separately
    /// keeps holding off live frames.
    pub fn abort_exposure(&mut self) -> OriginResult {
        self.require_link("abort_exposure")?;
        self.camera.abort()?;

        if self.exposure_owns_snapshot {
            self.end_snapshot();
        }
        let _ = self.send("AbortExposure", Destination::Camera, Params::new());
        tracing::debug!("Aborted exposure");
        self.emit(Event::CameraStateChanged(CameraState::Idle));
        Ok(())
    }

    /// Leave the error state entered after a failed download.
    pub fn clear_camera_error(&mut self) -> OriginResult {
        self.camera.clear_error()?;
        self.emit(Event::CameraStateChanged(CameraState::Idle));
        Ok(())
    }

    /// Change the gain (ISO), keeping the last exposure duration.
    pub fn set_gain(&mut self, gain: i64) -> OriginResult {
        self.require_logical_connection("set_gain")?;
        self.camera.gain = gain;
        let _ = self.send(
            "SetCaptureParameters",
            Destination::Camera,
            params! { ISO: gain, Exposure: self.camera.last_exposure_duration },
        );
        Ok(())
    }

    /// Capture a single TIFF snapshot.
    pub fn take_snapshot(&mut self, exposure: f64, iso: i64) -> OriginResult {
        self.require_link("take_snapshot")?;
        tracing::debug!(exposure, iso, "Taking snapshot");
        self.snapshot_in_progress = true;
        self.exposure_owns_snapshot = false;
        let _ = self.send(
            "RunSampleCapture",
            Destination::TaskController,
            params! { ExposureTime: exposure, ISO: iso },
        );
        self.emit(Event::SnapshotRequested);
        Ok(())
    }

    /// [`Self::take_snapshot`] with the last known capture parameters.
    pub fn take_single_snapshot(&mut self) -> OriginResult {
        let capture = self.camera.capture;
        self.take_snapshot(capture.exposure, capture.iso)
    }

    /// Switch the live stream to manual exposure.
    pub fn set_camera_manual_mode(&mut self) -> OriginResult {
        self.camera_command("SetEnableManual", Destination::LiveStream, Params::new())
    }

    /// Switch the live stream to automatic exposure.
    pub fn set_camera_auto_mode(&mut self) -> OriginResult {
        self.camera_command("SetEnableAuto", Destination::LiveStream, Params::new())
    }

    /// Ask whether the live stream is in manual mode.
    pub fn request_camera_mode(&mut self) -> OriginResult {
        self.camera_command("GetEnableManual", Destination::LiveStream, Params::new())
    }

    /// Ask for the current capture parameters.
    pub fn request_capture_parameters(&mut self) -> OriginResult {
        self.camera_command("GetCaptureParameters", Destination::Camera, Params::new())
    }

    /// Set exposure (seconds) and ISO.
    pub fn set_capture_parameters(&mut self, exposure: f64, iso: i64) -> OriginResult {
        self.camera_command(
            "SetCaptureParameters",
            Destination::Camera,
            params! { Exposure: exposure, ISO: iso },
        )
    }

    /// Set the exposure, keeping the last known ISO.
    pub fn set_camera_exposure(&mut self, seconds: f64) -> OriginResult {
        self.set_capture_parameters(seconds, self.camera.capture.iso)
    }

    /// Set the ISO, keeping the last known exposure.
    pub fn set_camera_iso(&mut self, iso: i64) -> OriginResult {
        self.set_capture_parameters(self.camera.capture.exposure, iso)
    }

    /// Ask the camera to identify itself.
    pub fn request_camera_info(&mut self) -> OriginResult {
        self.camera_command("GetCameraInfo", Destination::Camera, Params::new())
    }

    /// Resume live frames.
    pub(super) fn end_snapshot(&mut self) {
        self.snapshot_in_progress = false;
        self.exposure_owns_snapshot = false;
    }

    fn camera_command(
        &mut self,
        name: &'static str,
        destination: Destination,
        params: Params,
    ) -> OriginResult {
        self.require_link(name)?;
        let _ = self.send(name, destination, params);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{connected_session, events, sent};
    use super::super::Effect;
    use super::*;
    use crate::config::OriginConfig;
    use crate::errors::OriginError;

    #[test]
    fn exposure_requires_logical_connection() {
        let mut session = Session::new(OriginConfig::default());
        assert!(matches!(
            session.start_exposure(1.0, 200),
            Err(OriginError::NotConnected)
        ));

        let mut session = connected_session();
        assert!(matches!(
            session.start_exposure(1.0, 200),
            Err(OriginError::NotLogicallyConnected)
        ));
        assert!(session.take_effects().is_empty());
        assert_eq!(session.camera_state(), CameraState::Idle);
    }

    #[test]
    fn start_exposure_sends_sample_capture() {
        let mut session = connected_session();
        session.set_connected(true).expect("connected");
        session.start_exposure(2.0, 400).expect("idle camera");

        let effects = session.take_effects();
        let commands = sent(&effects);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["Command"], "RunSampleCapture");
        assert_eq!(commands[0]["Destination"], "TaskController");
        assert_eq!(commands[0]["ExposureTime"], 2.0);
        assert_eq!(commands[0]["ISO"], 400);
        assert!(matches!(
            events(&effects).as_slice(),
            [
                Event::ExposureStarted,
                Event::CameraStateChanged(CameraState::Exposing)
            ]
        ));
        assert!(session.is_exposing());
        assert!(session.is_snapshot_in_progress());
        assert!(!session.is_image_ready());
        assert_eq!(session.gain(), 400);
    }

    #[test]
    fn second_exposure_is_rejected() {
        let mut session = connected_session();
        session.set_connected(true).expect("connected");
        session.start_exposure(2.0, 400).expect("first");
        let _ = session.take_effects();

        assert!(matches!(
            session.start_exposure(2.0, 400),
            Err(OriginError::CameraBusy(CameraState::Exposing))
        ));
        assert!(session.take_effects().is_empty());
        assert_eq!(session.camera_state(), CameraState::Exposing);
    }

    #[test]
    fn abort_returns_to_idle() {
        let mut session = connected_session();
        session.set_connected(true).expect("connected");
        assert!(matches!(
            session.abort_exposure(),
            Err(OriginError::InvalidCameraState { .. })
        ));

        session.start_exposure(5.0, 200).expect("start");
        let _ = session.take_effects();
        session.abort_exposure().expect("abort");
        let effects = session.take_effects();
        assert_eq!(sent(&effects)[0]["Command"], "AbortExposure");
        assert_eq!(sent(&effects)[0]["Destination"], "Camera");
        assert_eq!(session.camera_state(), CameraState::Idle);
        assert!(!session.is_snapshot_in_progress());
    }

    #[test]
    fn set_gain_keeps_last_exposure() {
        let mut session = connected_session();
        assert!(session.set_gain(800).is_err());
        session.set_connected(true).expect("connected");
        session.start_exposure(3.0, 200).expect("start");
        let _ = session.take_effects();

        session.set_gain(800).expect("gain");
        let commands = sent(&session.take_effects());
        assert_eq!(commands[0]["Command"], "SetCaptureParameters");
        assert_eq!(commands[0]["ISO"], 800);
        assert_eq!(commands[0]["Exposure"], 3.0);
        assert_eq!(session.camera_state(), CameraState::Exposing);
    }

    #[test]
    fn snapshot_sets_guard_and_uses_cached_parameters() {
        let mut session = connected_session();
        session.take_single_snapshot().expect("snapshot");
        let effects = session.take_effects();
        let commands = sent(&effects);
        assert_eq!(commands[0]["Command"], "RunSampleCapture");
        assert_eq!(commands[0]["ExposureTime"], 0.1);
        assert_eq!(commands[0]["ISO"], 200);
        assert!(matches!(effects.last(), Some(Effect::Emit(Event::SnapshotRequested))));
        assert!(session.is_snapshot_in_progress());
        // Snapshots don't touch the exposure state machine.
        assert_eq!(session.camera_state(), CameraState::Idle);
    }

    #[test]
    fn camera_commands_reach_their_subsystems() {
        let mut session = connected_session();
        session.set_camera_manual_mode().expect("manual");
        session.set_camera_auto_mode().expect("auto");
        session.request_camera_mode().expect("mode");
        session.request_capture_parameters().expect("params");
        session.set_camera_exposure(0.5).expect("exposure");
        session.set_camera_iso(1600).expect("iso");
        session.request_camera_info().expect("info");

        let commands = sent(&session.take_effects())
            .into_iter()
            .map(|command| {
                (
                    command["Command"].as_str().unwrap_or_default().to_owned(),
                    command["Destination"].as_str().unwrap_or_default().to_owned(),
                )
            })
            .collect::<Vec<_>>();
        let expected = [
            ("SetEnableManual", "LiveStream"),
            ("SetEnableAuto", "LiveStream"),
            ("GetEnableManual", "LiveStream"),
            ("GetCaptureParameters", "Camera"),
            ("SetCaptureParameters", "Camera"),
            ("SetCaptureParameters", "Camera"),
            ("GetCameraInfo", "Camera"),
        ];
        assert_eq!(
            commands,
            expected.map(|(name, destination)| (name.to_owned(), destination.to_owned()))
        );
    }

    #[test]
    fn camera_commands_fail_without_link() {
        let mut session = Session::new(OriginConfig::default());
        assert!(session.take_snapshot(1.0, 100).is_err());
        assert!(session.set_camera_manual_mode().is_err());
        assert!(session.set_capture_parameters(1.0, 100).is_err());
        assert!(session.request_camera_info().is_err());
        assert!(session.take_effects().is_empty());
        assert!(!session.is_snapshot_in_progress());
    }

    fn announce(session: &mut Session, path: &str) {
        session.on_text(&format!(
            r#"{{"Type":"Notification","Source":"ImageServer","Command":"NewImageReady","FileLocation":"{path}"}}"#
        ));
    }

    fn fetches(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|effect| matches!(effect, Effect::Fetch(_)))
            .count()
    }

    #[test]
    fn failed_capture_releases_live_frames() -> eyre::Result<()> {
        let mut session = connected_session();
        session.take_snapshot(1.0, 200)?;
        let effects = session.take_effects();
        let id = &sent(&effects)[0]["SequenceID"];

        session.on_text(&format!(
            r#"{{"Type":"Response","Source":"TaskController","Command":"RunSampleCapture","SequenceID":{id},"ErrorCode":-78,"ErrorMessage":"Camera busy"}}"#
        ));
        assert!(!session.is_snapshot_in_progress());
        assert!(matches!(
            events(&session.take_effects()).as_slice(),
            [Event::CommandFailed { .. }]
        ));

        announce(&mut session, "Images/Temp/7.jpg");
        assert_eq!(fetches(&session.take_effects()), 1);
        Ok(())
    }

    #[test]
    fn other_failures_keep_the_snapshot_guard() -> eyre::Result<()> {
        let mut session = connected_session();
        session.take_snapshot(1.0, 200)?;
        session.request_camera_info()?;
        let effects = session.take_effects();
        let id = &sent(&effects)[1]["SequenceID"];

        session.on_text(&format!(
            r#"{{"Type":"Response","Source":"Camera","Command":"GetCameraInfo","SequenceID":{id},"ErrorCode":-1}}"#
        ));
        assert!(session.is_snapshot_in_progress());
        Ok(())
    }

    #[test]
    fn reconnect_releases_live_frames() -> eyre::Result<()> {
        let mut session = connected_session();
        session.take_snapshot(1.0, 200)?;
        session.on_disconnected();
        assert!(!session.is_snapshot_in_progress());

        let _ = session.begin_connect("origin.local", 80);
        session.on_connected();
        let _ = session.take_effects();
        announce(&mut session, "Images/Temp/8.jpg");
        assert_eq!(fetches(&session.take_effects()), 1);
        Ok(())
    }

    #[test]
    fn abort_keeps_a_separate_snapshot_pending() -> eyre::Result<()> {
        let mut session = connected_session();
        session.take_snapshot(1.0, 200)?;
        session.set_connected(true)?;
        session.start_exposure(5.0, 200)?;
        session.abort_exposure()?;
        let _ = session.take_effects();

        assert_eq!(session.camera_state(), CameraState::Idle);
        assert!(session.is_snapshot_in_progress());
        announce(&mut session, "Images/Temp/9.jpg");
        assert_eq!(fetches(&session.take_effects()), 0);
        Ok(())
    }
}
