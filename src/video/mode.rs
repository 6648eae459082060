use std::sync::LazyLock;

use super::frame::{Frame, PixelLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualMode {
    Grayscale,
    /// Raw decoder bytes drawn as-is, which shows BGR with red and blue swapped.
    #[default]
    PassthroughBgr,
    Rgb,
    Thermal,
}

impl VisualMode {
    pub const ALL: [VisualMode; 4] = [
        VisualMode::Grayscale,
        VisualMode::PassthroughBgr,
        VisualMode::Rgb,
        VisualMode::Thermal,
    ];

    /// Maps a picker index to a mode. Unknown indices fall back to passthrough.
    pub fn from_index(index: usize) -> Self {
        Self::ALL
            .get(index)
            .copied()
            .unwrap_or(VisualMode::PassthroughBgr)
    }

    pub fn label(self) -> &'static str {
        match self {
            VisualMode::Grayscale => "Grayscale",
            VisualMode::PassthroughBgr => "BGR",
            VisualMode::Rgb => "RGB",
            VisualMode::Thermal => "Thermal",
        }
    }
}

pub fn transform(frame: &Frame, mode: VisualMode) -> Frame {
    let canonical = frame.to_canonical();
    let bgr = canonical.pixels();
    let data: Vec<u8> = match mode {
        VisualMode::PassthroughBgr => bgr.to_vec(),
        VisualMode::Rgb => bgr.chunks_exact(3).flat_map(|px| [px[2], px[1], px[0]]).collect(),
        VisualMode::Grayscale => bgr
            .chunks_exact(3)
            .flat_map(|px| {
                let y = luma(px);
                [y, y, y]
            })
            .collect(),
        VisualMode::Thermal => bgr
            .chunks_exact(3)
            .flat_map(|px| THERMAL_LUT[luma(px) as usize])
            .collect(),
    };
    Frame::from_parts(
        canonical.width(),
        canonical.height(),
        PixelLayout::Rgb8,
        data,
        canonical.sequence(),
    )
}

/// ITU-R BT.601 luma of a BGR pixel. Exact for gray input (b == g == r).
fn luma(bgr: &[u8]) -> u8 {
    let (b, g, r) = (bgr[0] as u32, bgr[1] as u32, bgr[2] as u32);
    ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
}

// Jet palette: dark blue -> cyan -> yellow -> dark red.
static THERMAL_LUT: LazyLock<[[u8; 3]; 256]> = LazyLock::new(|| {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let t = i as f32 / 255.0;
        let channel = |center: f32| {
            let v = (1.5 - (4.0 * t - center).abs()).clamp(0.0, 1.0);
            (v * 255.0).round() as u8
        };
        *entry = [channel(3.0), channel(2.0), channel(1.0)];
    }
    lut
});
