use crate::camera::SourceId;
use crate::error::Result;

use super::frame::Frame;

pub trait StreamHandle {
    /// Newest unread frame, `Ok(None)` when nothing new arrived. Never blocks.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Closes the stream. Calling it again is a no-op.
    fn release(&mut self);
}

pub trait CaptureBackend {
    fn open(&mut self, id: &SourceId) -> Result<Box<dyn StreamHandle>>;
}

struct ActiveStream {
    id: SourceId,
    handle: Box<dyn StreamHandle>,
}

pub struct FrameSource {
    backend: Box<dyn CaptureBackend>,
    active: Option<ActiveStream>,
}

impl FrameSource {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            active: None,
        }
    }

    /// Releases the current stream, then opens `id`. On failure no stream is held.
    pub fn open(&mut self, id: &SourceId) -> Result<()> {
        self.release();
        let handle = self.backend.open(id)?;
        log::info!("opened {id}");
        self.active = Some(ActiveStream {
            id: id.clone(),
            handle,
        });
        Ok(())
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.active.as_mut() {
            Some(active) => active.handle.read_frame(),
            None => Ok(None),
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.active.as_ref()?.handle.dimensions()
    }

    pub fn current(&self) -> Option<&SourceId> {
        self.active.as_ref().map(|active| &active.id)
    }

    pub fn release(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.release();
            log::info!("released {}", active.id);
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}
