use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::camera::probe::{ProbeResult, Prober};
use crate::camera::{CameraSource, Registry, Selection, SourceId};
use crate::config::Settings;
use crate::error::{Result, VideoError};
use crate::ticker::Ticker;
use crate::video::frame::Frame;
use crate::video::mode::{self, VisualMode};
use crate::video::record::{Recorder, RecordingState, RecordingSummary, WriterFactory};
use crate::video::source::{CaptureBackend, FrameSource};

const STATUS_PERIOD: Duration = Duration::from_secs(1);
const IDLE_POLL: Duration = Duration::from_millis(100);
// 连续读取失败约一秒即视为断流
const MAX_READ_FAILURES: u32 = 30;

#[derive(Debug, Clone)]
pub enum Command {
    SelectSource(SourceId),
    StartStream,
    StopStream,
    StartRecording(PathBuf),
    StopRecording,
    SetVisualMode(VisualMode),
}

/// Display-side callbacks, invoked on the UI thread.
pub trait Observer {
    fn frame_ready(&mut self, frame: &Frame);
    fn recording_status(&mut self, status: &str);
    fn notice(&mut self, notice: &str);
    fn sources_changed(&mut self, _sources: &[CameraSource]) {}
    fn selection_changed(&mut self, _selection: &Selection) {}
}

pub struct Controller {
    registry: Registry,
    source: FrameSource,
    recorder: Recorder,
    prober: Prober,
    mode: VisualMode,
    observer: Box<dyn Observer>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands: mpsc::UnboundedReceiver<Command>,
    frame_tick: Ticker,
    status_tick: Ticker,
    last_notice: Option<String>,
    last_source: Option<SourceId>,
    read_failures: u32,
}

impl Controller {
    pub fn new(
        settings: &Settings,
        capture: Box<dyn CaptureBackend>,
        writers: Box<dyn WriterFactory>,
        prober: Prober,
        observer: Box<dyn Observer>,
    ) -> Self {
        let mut registry = Registry::new(CameraSource::local(settings.local_device));
        if settings.test_pattern {
            registry.register(CameraSource::test_pattern());
        }
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let frame_rate = settings.frame_rate.max(1);
        Self {
            registry,
            source: FrameSource::new(capture),
            recorder: Recorder::new(writers, settings.encoder, frame_rate),
            prober,
            mode: settings.initial_mode,
            observer,
            commands_tx,
            commands,
            frame_tick: Ticker::new(Duration::from_secs(1) / frame_rate),
            status_tick: Ticker::new(STATUS_PERIOD),
            last_notice: None,
            last_source: None,
            read_failures: 0,
        }
    }

    /// Publishes the initial state and either probes the configured network
    /// camera or opens the local one straight away.
    pub fn start(&mut self, network_camera: Option<CameraSource>, now: Instant) {
        self.observer.sources_changed(self.registry.sources());
        self.publish_status(now);
        match network_camera {
            Some(candidate) => {
                self.notify(format!("Connecting to {}...", candidate.name));
                self.prober.schedule(candidate);
            }
            None => {
                let id = self.registry.preferred().id.clone();
                let _ = self.select_source(id, now);
            }
        }
    }

    /// Sender for UI commands; they are applied on the next `tick`.
    pub fn commands(&self) -> mpsc::UnboundedSender<Command> {
        self.commands_tx.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn mode(&self) -> VisualMode {
        self.mode
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Runs whatever is due and returns how long the loop may sleep.
    pub fn tick(&mut self, now: Instant) -> Duration {
        while let Ok(command) = self.commands.try_recv() {
            self.dispatch(command, now);
        }
        while let Some(result) = self.prober.try_next() {
            self.apply_probe(result, now);
        }
        if self.frame_tick.poll(now) {
            self.pump_frame(now);
        }
        if self.status_tick.poll(now) {
            self.publish_status(now);
        }

        let mut wait = [self.frame_tick.until(now), self.status_tick.until(now)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(IDLE_POLL);
        if self.prober.pending() > 0 {
            wait = wait.min(IDLE_POLL);
        }
        wait
    }

    pub fn dispatch(&mut self, command: Command, now: Instant) {
        // 错误已经通过 notice 显示给用户
        let _ = match command {
            Command::SelectSource(id) => self.select_source(id, now),
            Command::StartStream => self.start_stream(now),
            Command::StopStream => {
                self.stop_stream(now);
                Ok(())
            }
            Command::StartRecording(path) => self.start_recording(path, now),
            Command::StopRecording => self.stop_recording(now).map(|_| ()),
            Command::SetVisualMode(mode) => {
                self.set_visual_mode(mode);
                Ok(())
            }
        };
    }

    /// Switches cameras. An active recording is finished first, since the
    /// new source may not match the writer's fixed geometry.
    pub fn select_source(&mut self, id: SourceId, now: Instant) -> Result<()> {
        let Some(name) = self.registry.get(&id).map(|s| s.name.clone()) else {
            let err = VideoError::SourceUnreachable {
                id: id.to_string(),
                reason: "not a registered camera".into(),
            };
            self.notify(err.to_string());
            return Err(err);
        };
        if self.recorder.is_recording() {
            let _ = self.stop_recording(now);
        }
        self.release_source();

        match self.source.open(&id) {
            Ok(()) => {
                self.last_source = Some(id.clone());
                self.registry.mark_active(id);
                self.frame_tick.start_now(now);
                self.notify(format!("Showing {name}"));
                self.observer.selection_changed(self.registry.selection());
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}");
                self.registry.mark_failed(id, err.to_string());
                self.notify(format!("{name}: {err}"));
                self.observer.selection_changed(self.registry.selection());
                Err(err)
            }
        }
    }

    pub fn start_recording(&mut self, path: PathBuf, now: Instant) -> Result<()> {
        match self.recorder.start(path, self.source.dimensions(), now) {
            Ok(()) => {
                self.status_tick.start_after(now);
                self.publish_status(now);
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}");
                self.notify(format!("Cannot record: {err}"));
                Err(err)
            }
        }
    }

    /// Finishes the recording. No-op when idle.
    pub fn stop_recording(&mut self, now: Instant) -> Result<Option<RecordingSummary>> {
        if !self.recorder.is_recording() {
            return Ok(None);
        }
        let result = self.recorder.stop();
        self.status_tick.stop();
        self.publish_status(now);
        match &result {
            Ok(Some(summary)) => self.notify(format!(
                "Saved {} ({} frames)",
                summary.path.display(),
                summary.frames_written
            )),
            Ok(None) => {}
            Err(err) => self.notify(format!("Recording may be incomplete: {err}")),
        }
        result
    }

    pub fn set_visual_mode(&mut self, mode: VisualMode) {
        if self.mode != mode {
            log::debug!("visual mode {mode:?}");
            self.mode = mode;
        }
    }

    /// Reopens the last shown camera, or the preferred one.
    pub fn start_stream(&mut self, now: Instant) -> Result<()> {
        let id = self
            .last_source
            .clone()
            .unwrap_or_else(|| self.registry.preferred().id.clone());
        self.select_source(id, now)
    }

    /// Finishes any recording and closes the camera.
    pub fn stop_stream(&mut self, now: Instant) {
        let _ = self.stop_recording(now);
        self.release_source();
        if *self.registry.selection() != Selection::None {
            self.registry.clear_selection();
            self.observer.selection_changed(self.registry.selection());
        }
    }

    pub fn shutdown(&mut self, now: Instant) {
        self.stop_stream(now);
    }

    fn apply_probe(&mut self, result: ProbeResult, now: Instant) {
        let ProbeResult {
            candidate,
            reachable,
        } = result;
        if reachable {
            log::info!("{} is reachable", candidate.id);
            let id = candidate.id.clone();
            self.registry.register(candidate);
            self.observer.sources_changed(self.registry.sources());
            let _ = self.select_source(id, now);
        } else {
            log::warn!("{} is unreachable", candidate.id);
            let local = self.registry.local().clone();
            let _ = self.select_source(local.id, now);
            self.notify(format!(
                "{} is unreachable, fallback to {}",
                candidate.name, local.name
            ));
        }
    }

    fn pump_frame(&mut self, now: Instant) {
        match self.source.read_frame() {
            Ok(Some(raw)) => {
                self.read_failures = 0;
                let shown = mode::transform(&raw, self.mode);
                self.observer.frame_ready(&shown);
                if let Err(err) = self.recorder.append(&shown) {
                    self.status_tick.stop();
                    self.publish_status(now);
                    self.notify(format!("Recording stopped: {err}"));
                }
            }
            Ok(None) => {}
            Err(VideoError::StreamEnded) => self.end_stream(now, "stream ended"),
            Err(err) => {
                log::warn!("{err}");
                self.read_failures += 1;
                if self.read_failures >= MAX_READ_FAILURES {
                    self.end_stream(now, "stream lost");
                } else {
                    self.notify(err.to_string());
                }
            }
        }
    }

    // 录制、摄像头都要先关闭，与切换摄像头走同一条释放路径
    fn end_stream(&mut self, now: Instant, reason: &str) {
        let id = self.source.current().cloned();
        let _ = self.stop_recording(now);
        self.release_source();
        if let Some(id) = id {
            log::warn!("{id}: {reason}");
            self.registry.mark_failed(id, reason);
            self.observer.selection_changed(self.registry.selection());
        }
        self.notify(format!("Stream ended: {reason}"));
    }

    fn release_source(&mut self) {
        self.read_failures = 0;
        self.frame_tick.stop();
        self.source.release();
    }

    fn publish_status(&mut self, now: Instant) {
        let status = self.recorder.status(now);
        self.observer.recording_status(&status);
    }

    fn notify(&mut self, notice: String) {
        if self.last_notice.as_deref() == Some(notice.as_str()) {
            return;
        }
        self.observer.notice(&notice);
        self.last_notice = Some(notice);
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown(Instant::now());
    }
}
