use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use super::frame::{Frame, PixelLayout};
use crate::error::{Result, VideoError};

/// Recording status shown while no session is active.
pub const NOT_RECORDING: &str = "Not recording";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoEncoder {
    #[default]
    H264,
    H265,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Mov,
    Mkv,
    Avi,
}

impl Container {
    /// Picks the container from the file extension, MP4 when unknown.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("mov") => Container::Mov,
            Some("mkv") => Container::Mkv,
            Some("avi") => Container::Avi,
            _ => Container::Mp4,
        }
    }

    fn muxer(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4mux faststart=true", // 加上 faststart 提高兼容性
            Container::Mov => "qtmux",
            Container::Mkv => "matroskamux",
            Container::Avi => "avimux",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSettings {
    pub res: Resolution,
    pub enc: VideoEncoder,
    pub container: Container,
    pub fps: u32,
    pub filepath: PathBuf,
}

pub trait FrameWriter {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flushes and closes the file.
    fn finish(self: Box<Self>) -> Result<()>;
}

pub trait WriterFactory {
    fn create(&mut self, settings: &RecordSettings) -> Result<Box<dyn FrameWriter>>;
}

#[derive(Debug, Default)]
pub struct GstWriterFactory;

impl WriterFactory for GstWriterFactory {
    fn create(&mut self, settings: &RecordSettings) -> Result<Box<dyn FrameWriter>> {
        Ok(Box::new(GstWriter::new(settings)?))
    }
}

struct GstWriter {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    res: Resolution,
    frame_ns: u64,
    frames: u64,
}

impl GstWriter {
    fn new(settings: &RecordSettings) -> Result<Self> {
        let path = &settings.filepath;
        let creation = |reason: String| VideoError::WriterCreation {
            path: path.clone(),
            reason,
        };

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(creation(format!("{} is not a directory", dir.display())));
            }
        }

        let desc = pipeline_description(settings.enc, settings.container);
        let pipeline = gst::parse::launch(&desc)
            .map_err(|e| creation(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| creation("not a pipeline".into()))?;
        let appsrc = pipeline
            .by_name("src")
            .and_then(|el| el.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| creation("appsrc missing".into()))?;
        let filesink = pipeline
            .by_name("file")
            .ok_or_else(|| creation("filesink missing".into()))?;
        filesink.set_property("location", &*path.to_string_lossy());

        let caps = gst_video::VideoInfo::builder(
            gst_video::VideoFormat::Rgb,
            settings.res.width,
            settings.res.height,
        )
        .fps(gst::Fraction::new(settings.fps as i32, 1))
        .build()
        .and_then(|info| info.to_caps())
        .map_err(|e| creation(e.to_string()))?;
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(true);

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(creation(e.to_string()));
        }

        log::info!(
            "writer open: {} ({}x{} @ {} fps)",
            path.display(),
            settings.res.width,
            settings.res.height,
            settings.fps
        );
        Ok(Self {
            pipeline,
            appsrc,
            res: settings.res,
            frame_ns: 1_000_000_000 / settings.fps.max(1) as u64,
            frames: 0,
        })
    }

    fn bus_error(&self) -> Option<String> {
        let msg = self.pipeline.bus()?.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!("{} ({:?})", err.error(), err.debug())),
            _ => None,
        }
    }
}

fn pipeline_description(enc: VideoEncoder, container: Container) -> String {
    let enc_plugin = match enc {
        VideoEncoder::H264 => "x264enc tune=zerolatency",
        VideoEncoder::H265 => "x265enc tune=zerolatency",
    };

    // 流程：appsrc -> 格式转换 -> 编码 -> 封装 -> 写入文件
    // NOTE: format=I420 修复 QuickTime Player 打不开 MP4 的问题
    // location 之后用属性设置
    format!(
        "appsrc name=src !
        videoconvert !
        video/x-raw,format=I420 !
        {enc_plugin} !
        {mux} !
        filesink name=file",
        mux = container.muxer(),
    )
}

impl FrameWriter for GstWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.layout() != PixelLayout::Rgb8 {
            return Err(VideoError::WriterWrite(format!(
                "expected RGB frames, got {:?}",
                frame.layout()
            )));
        }
        if frame.dimensions() != (self.res.width, self.res.height) {
            return Err(VideoError::WriterWrite(format!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.res.width,
                self.res.height
            )));
        }
        if let Some(err) = self.bus_error() {
            return Err(VideoError::WriterWrite(err));
        }

        // 固定帧率：时间戳按帧序号计算
        let mut buffer = gst::Buffer::from_slice(frame.shared_pixels());
        if let Some(buf) = buffer.get_mut() {
            buf.set_pts(gst::ClockTime::from_nseconds(self.frames * self.frame_ns));
            buf.set_duration(gst::ClockTime::from_nseconds(self.frame_ns));
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| VideoError::WriterWrite(format!("{e:?}")))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let _ = self.appsrc.end_of_stream();

        // 给编码器排空数据的时间
        let mut failure = None;
        if let Some(bus) = self.pipeline.bus() {
            for msg in bus.iter_timed(gst::ClockTime::from_seconds(5)) {
                match msg.view() {
                    gst::MessageView::Eos(..) => break,
                    gst::MessageView::Error(err) => {
                        failure = Some(format!("{} ({:?})", err.error(), err.debug()));
                        break;
                    }
                    _ => {}
                }
            }
        }
        let _ = self.pipeline.set_state(gst::State::Null);

        match failure {
            Some(reason) => Err(VideoError::WriterWrite(reason)),
            None => Ok(()),
        }
    }
}

impl Drop for GstWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames_written: u64,
}

/// 内部结构, 用于记住当前正在录制的组件, 以便后续释放.
struct RecordingSession {
    path: PathBuf,
    writer: Box<dyn FrameWriter>,
    started: Instant,
    frames_written: u64,
}

// 写入器只在 session 存在时存在
pub struct Recorder {
    factory: Box<dyn WriterFactory>,
    encoder: VideoEncoder,
    fps: u32,
    session: Option<RecordingSession>,
}

impl Recorder {
    pub fn new(factory: Box<dyn WriterFactory>, encoder: VideoEncoder, fps: u32) -> Self {
        Self {
            factory,
            encoder,
            fps,
            session: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        match self.session {
            Some(_) => RecordingState::Recording,
            None => RecordingState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Opens a writer sized to `dims`, the active source's native frame size.
    /// Rejected while already recording.
    pub fn start(&mut self, path: PathBuf, dims: Option<(u32, u32)>, now: Instant) -> Result<()> {
        if let Some(session) = &self.session {
            return Err(VideoError::AlreadyRecording(session.path.clone()));
        }
        let Some((width, height)) = dims else {
            return Err(VideoError::WriterCreation {
                path,
                reason: "no camera is open".into(),
            });
        };

        let settings = RecordSettings {
            res: Resolution { width, height },
            enc: self.encoder,
            container: Container::from_path(&path),
            fps: self.fps,
            filepath: path,
        };
        let writer = self.factory.create(&settings)?;

        log::info!("recording started: {}", settings.filepath.display());
        self.session = Some(RecordingSession {
            path: settings.filepath,
            writer,
            started: now,
            frames_written: 0,
        });
        Ok(())
    }

    /// Appends one processed frame. A failed write ends the session.
    pub fn append(&mut self, frame: &Frame) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match session.writer.write(frame) {
            Ok(()) => {
                session.frames_written += 1;
                Ok(())
            }
            Err(err) => {
                log::error!("recording aborted: {err}");
                if let Err(close) = self.stop() {
                    log::warn!("closing aborted recording: {close}");
                }
                Err(err)
            }
        }
    }

    /// Closes the writer and returns to idle. No-op when idle.
    pub fn stop(&mut self) -> Result<Option<RecordingSummary>> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        let summary = RecordingSummary {
            path: session.path,
            frames_written: session.frames_written,
        };
        session.writer.finish()?;
        log::info!(
            "recording stopped: {} ({} frames)",
            summary.path.display(),
            summary.frames_written
        );
        Ok(Some(summary))
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.session
            .as_ref()
            .map(|s| now.saturating_duration_since(s.started))
    }

    pub fn status(&self, now: Instant) -> String {
        match self.elapsed(now) {
            Some(elapsed) => format_elapsed(elapsed),
            None => NOT_RECORDING.to_string(),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("closing recording on shutdown: {err}");
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "REC {:02}:{:02}:{:02}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedWriterFactory, bgr_frame};

    fn recorder() -> (Recorder, ScriptedWriterFactory) {
        let factory = ScriptedWriterFactory::new();
        let recorder = Recorder::new(Box::new(factory.clone()), VideoEncoder::H264, 30);
        (recorder, factory)
    }

    #[test]
    fn stop_when_idle_is_a_noop() {
        let (mut rec, factory) = recorder();
        assert_eq!(rec.stop().unwrap(), None);
        assert_eq!(rec.state(), RecordingState::Idle);
        let log = factory.log();
        assert_eq!(log.created.len(), 0);
        assert_eq!(log.finished, 0);
    }

    #[test]
    fn start_without_dimensions_stays_idle() {
        let (mut rec, factory) = recorder();
        let err = rec
            .start("out.mp4".into(), None, Instant::now())
            .unwrap_err();
        assert!(matches!(err, VideoError::WriterCreation { .. }));
        assert_eq!(rec.state(), RecordingState::Idle);
        assert!(factory.log().created.is_empty());
    }

    #[test]
    fn start_binds_writer_to_source_geometry() {
        let (mut rec, factory) = recorder();
        rec.start("clip.MKV".into(), Some((640, 480)), Instant::now())
            .unwrap();
        assert_eq!(rec.state(), RecordingState::Recording);

        let created = factory.log().created;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].res, Resolution { width: 640, height: 480 });
        assert_eq!(created[0].container, Container::Mkv);
        assert_eq!(created[0].fps, 30);
    }

    #[test]
    fn second_start_is_rejected() {
        let (mut rec, factory) = recorder();
        let now = Instant::now();
        rec.start("a.mp4".into(), Some((4, 3)), now).unwrap();
        let err = rec.start("b.mp4".into(), Some((4, 3)), now).unwrap_err();
        assert!(matches!(err, VideoError::AlreadyRecording(p) if p == PathBuf::from("a.mp4")));
        assert_eq!(rec.state(), RecordingState::Recording);
        assert_eq!(factory.log().created.len(), 1);
    }

    #[test]
    fn writer_creation_failure_stays_idle() {
        let (mut rec, factory) = recorder();
        factory.fail_create();
        let err = rec
            .start("/nope/x.mp4".into(), Some((4, 3)), Instant::now())
            .unwrap_err();
        assert!(matches!(err, VideoError::WriterCreation { .. }));
        assert_eq!(rec.state(), RecordingState::Idle);
    }

    #[test]
    fn write_failure_ends_session_and_closes_writer_once() {
        let (mut rec, factory) = recorder();
        rec.start("a.mp4".into(), Some((4, 3)), Instant::now())
            .unwrap();
        rec.append(&bgr_frame(4, 3, 1)).unwrap();
        factory.fail_writes();

        let err = rec.append(&bgr_frame(4, 3, 2)).unwrap_err();
        assert!(matches!(err, VideoError::WriterWrite(_)));
        assert_eq!(rec.state(), RecordingState::Idle);
        assert_eq!(rec.stop().unwrap(), None);

        let log = factory.log();
        assert_eq!(log.frames, vec![1]);
        assert_eq!(log.finished, 1);
    }

    #[test]
    fn append_when_idle_writes_nothing() {
        let (mut rec, factory) = recorder();
        rec.append(&bgr_frame(4, 3, 1)).unwrap();
        assert!(factory.log().frames.is_empty());
    }

    #[test]
    fn status_tracks_wall_clock_and_resets_on_stop() {
        let (mut rec, _factory) = recorder();
        let t0 = Instant::now();
        assert_eq!(rec.status(t0), NOT_RECORDING);

        rec.start("a.mp4".into(), Some((4, 3)), t0).unwrap();
        let mut last = Duration::ZERO;
        for secs in [0, 1, 2, 59, 61, 3725] {
            let now = t0 + Duration::from_secs(secs);
            let elapsed = rec.elapsed(now).unwrap();
            assert!(elapsed >= last);
            last = elapsed;
        }
        assert_eq!(rec.status(t0 + Duration::from_secs(3725)), "REC 01:02:05");

        let summary = rec.stop().unwrap().unwrap();
        assert_eq!(summary.path, PathBuf::from("a.mp4"));
        assert_eq!(rec.status(t0 + Duration::from_secs(3726)), NOT_RECORDING);
        assert_eq!(rec.elapsed(t0), None);
    }

    #[test]
    fn drop_while_recording_closes_writer() {
        let (mut rec, factory) = recorder();
        rec.start("a.mp4".into(), Some((4, 3)), Instant::now())
            .unwrap();
        drop(rec);
        assert_eq!(factory.log().finished, 1);
        assert_eq!(factory.log().dropped_open, 0);
    }

    #[test]
    fn output_path_stays_out_of_the_pipeline_text() {
        let desc = pipeline_description(VideoEncoder::H265, Container::Mkv);
        assert!(desc.contains("x265enc"));
        assert!(desc.contains("matroskamux"));
        assert!(desc.trim_end().ends_with("filesink name=file"));
        assert!(!desc.contains("location"));
    }

    #[test]
    fn container_follows_extension() {
        assert_eq!(Container::from_path(Path::new("a.mov")), Container::Mov);
        assert_eq!(Container::from_path(Path::new("a.AVI")), Container::Avi);
        assert_eq!(Container::from_path(Path::new("a")), Container::Mp4);
    }
}
