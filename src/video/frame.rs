use std::sync::Arc;

use crate::error::{Result, VideoError};

// 8 位/通道，紧密排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Gray8,
    Bgr8,
    Rgb8,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Bgr8 | PixelLayout::Rgb8 => 3,
        }
    }
}

/// One decoded image. Clones share the same immutable pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: Arc<[u8]>,
    sequence: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: impl Into<Arc<[u8]>>,
        sequence: u64,
    ) -> Result<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(VideoError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
            sequence,
        })
    }

    /// Builds a frame from a buffer the caller already sized correctly.
    pub(crate) fn from_parts(
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
        sequence: u64,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * layout.channels()
        );
        Self {
            width,
            height,
            layout,
            data: data.into(),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn shared_pixels(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// 3-channel BGR, shared without copying when already BGR.
    pub fn to_canonical(&self) -> Frame {
        let data = match self.layout {
            PixelLayout::Bgr8 => return self.clone(),
            PixelLayout::Rgb8 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelLayout::Gray8 => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
        };
        Frame::from_parts(
            self.width,
            self.height,
            PixelLayout::Bgr8,
            data,
            self.sequence,
        )
    }
}
