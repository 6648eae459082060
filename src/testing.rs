use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::camera::probe::Probe;
use crate::camera::{CameraSource, Selection, SourceId};
use crate::controller::Observer;
use crate::error::{Result, VideoError};
use crate::video::frame::{Frame, PixelLayout};
use crate::video::record::{FrameWriter, RecordSettings, WriterFactory};
use crate::video::source::{CaptureBackend, StreamHandle};

pub fn bgr_frame(width: u32, height: u32, sequence: u64) -> Frame {
    let data = vec![(sequence % 256) as u8; (width * height * 3) as usize];
    Frame::new(width, height, PixelLayout::Bgr8, data, sequence).unwrap()
}

/// Polls `f` for up to two seconds.
pub fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> Option<T> {
    for _ in 0..200 {
        if let Some(value) = f() {
            return Some(value);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct CaptureLog {
    pub opens: usize,
    pub releases: usize,
    pub live: isize,
}

#[derive(Default)]
struct CaptureState {
    log: CaptureLog,
    unreachable: HashSet<SourceId>,
    sizes: HashMap<SourceId, (u32, u32)>,
    read_errors: VecDeque<VideoError>,
}

/// Pull-model camera: every read yields a fresh frame (4x3 unless resized).
#[derive(Clone, Default)]
pub struct ScriptedCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CaptureLog {
        self.state.lock().log.clone()
    }

    pub fn set_unreachable(&self, id: SourceId) {
        self.state.lock().unreachable.insert(id);
    }

    pub fn set_size(&self, id: SourceId, size: (u32, u32)) {
        self.state.lock().sizes.insert(id, size);
    }

    pub fn fail_next_read(&self, err: VideoError) {
        self.state.lock().read_errors.push_back(err);
    }
}

impl CaptureBackend for ScriptedCapture {
    fn open(&mut self, id: &SourceId) -> Result<Box<dyn StreamHandle>> {
        let mut state = self.state.lock();
        if state.unreachable.contains(id) {
            return Err(VideoError::SourceUnreachable {
                id: id.to_string(),
                reason: "scripted".into(),
            });
        }
        state.log.opens += 1;
        state.log.live += 1;
        let size = state.sizes.get(id).copied().unwrap_or((4, 3));
        Ok(Box::new(ScriptedStream {
            state: Arc::clone(&self.state),
            size,
            sequence: 0,
            released: false,
        }))
    }
}

struct ScriptedStream {
    state: Arc<Mutex<CaptureState>>,
    size: (u32, u32),
    sequence: u64,
    released: bool,
}

impl StreamHandle for ScriptedStream {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(err) = self.state.lock().read_errors.pop_front() {
            return Err(err);
        }
        self.sequence += 1;
        Ok(Some(bgr_frame(self.size.0, self.size.1, self.sequence)))
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.size)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            let mut state = self.state.lock();
            state.log.releases += 1;
            state.log.live -= 1;
        }
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriterLog {
    pub created: Vec<RecordSettings>,
    /// Sequence numbers of written frames.
    pub frames: Vec<u64>,
    pub finished: usize,
    pub dropped_open: usize,
}

#[derive(Default)]
struct WriterState {
    log: WriterLog,
    fail_create: bool,
    fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedWriterFactory {
    state: Arc<Mutex<WriterState>>,
}

impl ScriptedWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> WriterLog {
        self.state.lock().log.clone()
    }

    pub fn fail_create(&self) {
        self.state.lock().fail_create = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }
}

impl WriterFactory for ScriptedWriterFactory {
    fn create(&mut self, settings: &RecordSettings) -> Result<Box<dyn FrameWriter>> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(VideoError::WriterCreation {
                path: settings.filepath.clone(),
                reason: "scripted".into(),
            });
        }
        state.log.created.push(settings.clone());
        Ok(Box::new(ScriptedWriter {
            state: Arc::clone(&self.state),
            finished: false,
        }))
    }
}

struct ScriptedWriter {
    state: Arc<Mutex<WriterState>>,
    finished: bool,
}

impl FrameWriter for ScriptedWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(VideoError::WriterWrite("scripted".into()));
        }
        state.log.frames.push(frame.sequence());
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.state.lock().log.finished += 1;
        Ok(())
    }
}

impl Drop for ScriptedWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.state.lock().log.dropped_open += 1;
        }
    }
}

pub struct ScriptedProbe {
    reachable: bool,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn reachable(reachable: bool) -> Self {
        Self {
            reachable,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for ScriptedProbe {
    fn probe(&self, _id: &SourceId) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }
}

#[derive(Debug, Default)]
pub struct Seen {
    pub frames: Vec<Frame>,
    pub statuses: Vec<String>,
    pub notices: Vec<String>,
    pub sources: Vec<CameraSource>,
    pub selection: Selection,
}

#[derive(Clone, Default)]
pub struct CollectingObserver {
    pub seen: Arc<Mutex<Seen>>,
}

impl Observer for CollectingObserver {
    fn frame_ready(&mut self, frame: &Frame) {
        self.seen.lock().frames.push(frame.clone());
    }

    fn recording_status(&mut self, status: &str) {
        self.seen.lock().statuses.push(status.to_string());
    }

    fn notice(&mut self, notice: &str) {
        self.seen.lock().notices.push(notice.to_string());
    }

    fn sources_changed(&mut self, sources: &[CameraSource]) {
        self.seen.lock().sources = sources.to_vec();
    }

    fn selection_changed(&mut self, selection: &Selection) {
        self.seen.lock().selection = selection.clone();
    }
}
