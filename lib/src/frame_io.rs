//! Raw camera frame loading
//!
//! Reads headerless binary dumps written by the acquisition scripts into a
//! `[height, width, frame]` intensity stack. The camera SDK itself is not
//! involved: shape and sample format come from the caller or a preset.

use crate::error::DemodError;
use crate::Result;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use std::fmt;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

/// Encoding of a single pixel in the raw file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    U16Le,
    U16Be,
    F32Le,
    F64Le,
}

impl SampleFormat {
    pub fn all() -> &'static [SampleFormat] {
        &[
            SampleFormat::U8,
            SampleFormat::U16Le,
            SampleFormat::U16Be,
            SampleFormat::F32Le,
            SampleFormat::F64Le,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::U16Le => "u16le",
            SampleFormat::U16Be => "u16be",
            SampleFormat::F32Le => "f32le",
            SampleFormat::F64Le => "f64le",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        Self::all().iter().copied().find(|f| f.name() == name)
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::U16Le | SampleFormat::U16Be => 2,
            SampleFormat::F32Le => 4,
            SampleFormat::F64Le => 8,
        }
    }

    fn decode(&self, bytes: &[u8]) -> f64 {
        match self {
            SampleFormat::U8 => bytes[0] as f64,
            SampleFormat::U16Le => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            SampleFormat::U16Be => u16::from_be_bytes([bytes[0], bytes[1]]) as f64,
            SampleFormat::F32Le => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            SampleFormat::F64Le => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                f64::from_le_bytes(raw)
            }
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Order in which pixels of successive frames follow each other on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameOrder {
    /// One complete row-major frame after another
    #[default]
    Planar,
    /// Row-major `[h, w, n]`, frame index varying fastest
    Interleaved,
}

impl FrameOrder {
    pub fn name(&self) -> &'static str {
        match self {
            FrameOrder::Planar => "planar",
            FrameOrder::Interleaved => "interleaved",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "planar" => Some(FrameOrder::Planar),
            "interleaved" => Some(FrameOrder::Interleaved),
            _ => None,
        }
    }
}

/// Shape and encoding of a raw frame dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub height: usize,
    pub width: usize,
    pub frames: usize,
    pub sample_format: SampleFormat,
    pub frame_order: FrameOrder,
}

impl RawLayout {
    pub fn new(height: usize, width: usize, frames: usize, sample_format: SampleFormat) -> Self {
        Self {
            height,
            width,
            frames,
            sample_format,
            frame_order: FrameOrder::Planar,
        }
    }

    pub fn with_order(mut self, frame_order: FrameOrder) -> Self {
        self.frame_order = frame_order;
        self
    }

    /// Pixels in one frame, `DimensionMismatch` if the count overflows
    pub fn pixels_per_frame(&self) -> Result<usize> {
        self.height
            .checked_mul(self.width)
            .ok_or_else(|| self.overflow())
    }

    /// Size of the whole stack on disk, `DimensionMismatch` if it overflows
    pub fn expected_bytes(&self) -> Result<usize> {
        self.pixels_per_frame()?
            .checked_mul(self.frames)
            .and_then(|n| n.checked_mul(self.sample_format.bytes_per_sample()))
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> DemodError {
        DemodError::mismatch(format!(
            "{}x{}x{} {} layout does not fit in memory",
            self.height, self.width, self.frames, self.sample_format
        ))
    }
}

/// Raw intensity stack `[height, width, frame]`
#[derive(Debug, Clone)]
pub struct FrameStack {
    data: Array3<f64>,
}

impl FrameStack {
    /// Wrap an existing array
    pub fn new(data: Array3<f64>) -> Result<Self> {
        let (h, w, n) = data.dim();
        if h == 0 || w == 0 || n == 0 {
            return Err(DemodError::mismatch(format!(
                "frame stack must be non-empty, got {}x{}x{}",
                h, w, n
            )));
        }
        Ok(Self { data })
    }

    /// Stack single 2D frames along the last axis
    pub fn from_frames(frames: &[Array2<f64>]) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| DemodError::mismatch("no frames supplied"))?;
        let (h, w) = first.dim();

        let mut data = Array3::<f64>::zeros((h, w, frames.len()));
        for (i, frame) in frames.iter().enumerate() {
            if frame.dim() != (h, w) {
                return Err(DemodError::mismatch(format!(
                    "frame {} is {}x{}, expected {}x{}",
                    i,
                    frame.nrows(),
                    frame.ncols(),
                    h,
                    w
                )));
            }
            data.slice_mut(s![.., .., i]).assign(frame);
        }
        Self::new(data)
    }

    /// Decode a stack from raw bytes
    pub fn from_bytes(bytes: &[u8], layout: &RawLayout) -> Result<Self> {
        let expected = layout.expected_bytes()?;
        if bytes.len() != expected {
            return Err(DemodError::mismatch(format!(
                "{}x{}x{} {} stack needs {} bytes, got {}",
                layout.height,
                layout.width,
                layout.frames,
                layout.sample_format,
                expected,
                bytes.len()
            )));
        }

        let step = layout.sample_format.bytes_per_sample();
        let samples: Vec<f64> = bytes
            .chunks_exact(step)
            .map(|chunk| layout.sample_format.decode(chunk))
            .collect();

        let (h, w, n) = (layout.height, layout.width, layout.frames);
        let data = match layout.frame_order {
            FrameOrder::Interleaved => Array3::from_shape_vec((h, w, n), samples)
                .map_err(|e| DemodError::mismatch(e.to_string()))?,
            FrameOrder::Planar => {
                let planar = Array3::from_shape_vec((n, h, w), samples)
                    .map_err(|e| DemodError::mismatch(e.to_string()))?;
                planar.permuted_axes([1, 2, 0]).as_standard_layout().to_owned()
            }
        };

        Self::new(data)
    }

    /// Read a whole stack from one file
    #[cfg(not(target_arch = "wasm32"))]
    pub fn read_raw<P: AsRef<Path>>(path: P, layout: &RawLayout) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        log::info!(
            "Read {} bytes from {}",
            bytes.len(),
            path.as_ref().display()
        );
        Self::from_bytes(&bytes, layout)
    }

    /// Read one single-frame raw file per path, in order
    ///
    /// `layout.frames` is ignored; each file must hold exactly one frame.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn read_raw_frames<P: AsRef<Path>>(paths: &[P], layout: &RawLayout) -> Result<Self> {
        let single = RawLayout {
            frames: 1,
            ..*layout
        };

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let stack = Self::read_raw(path, &single)?;
            frames.push(stack.frame(0)?.to_owned());
        }
        Self::from_frames(&frames)
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn num_frames(&self) -> usize {
        self.data.dim().2
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// View of one raw frame
    pub fn frame(&self, index: usize) -> Result<ArrayView2<'_, f64>> {
        if index >= self.num_frames() {
            return Err(DemodError::mismatch(format!(
                "frame {} requested from a stack of {}",
                index,
                self.num_frames()
            )));
        }
        Ok(self.data.index_axis(Axis(2), index))
    }

    /// Frame divided by its maximum, values in [0, 1] for non-negative input
    pub fn normalized_frame(&self, index: usize) -> Result<Array2<f64>> {
        let frame = self.frame(index)?;
        let max = frame.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !(max.is_finite() && max > 0.0) {
            return Err(DemodError::DegenerateFrame { index });
        }
        Ok(frame.mapv(|v| v / max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planar_u16_bytes(h: usize, w: usize, n: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(h * w * n * 2);
        for f in 0..n {
            for r in 0..h {
                for c in 0..w {
                    let value = (f * 1000 + r * 10 + c) as u16;
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        bytes
    }

    #[test]
    fn test_planar_decode() {
        let layout = RawLayout::new(3, 4, 2, SampleFormat::U16Le);
        let stack = FrameStack::from_bytes(&planar_u16_bytes(3, 4, 2), &layout).unwrap();

        assert_eq!(stack.height(), 3);
        assert_eq!(stack.width(), 4);
        assert_eq!(stack.num_frames(), 2);
        assert_eq!(stack.data()[[2, 3, 0]], 23.0);
        assert_eq!(stack.data()[[1, 2, 1]], 1012.0);
    }

    #[test]
    fn test_interleaved_decode() {
        // numpy C-order reshape of 0..12 to (2, 3, 2)
        let bytes: Vec<u8> = (0u8..12).collect();
        let layout =
            RawLayout::new(2, 3, 2, SampleFormat::U8).with_order(FrameOrder::Interleaved);
        let stack = FrameStack::from_bytes(&bytes, &layout).unwrap();

        assert_eq!(stack.data()[[0, 0, 1]], 1.0);
        assert_eq!(stack.data()[[1, 2, 0]], 10.0);
        assert_eq!(stack.frame(1).unwrap()[[0, 1]], 3.0);
    }

    #[test]
    fn test_size_mismatch() {
        let layout = RawLayout::new(4, 4, 2, SampleFormat::U16Be);
        let err = FrameStack::from_bytes(&[0u8; 10], &layout).unwrap_err();
        assert!(matches!(err, DemodError::DimensionMismatch(_)));
    }

    #[test]
    fn test_oversized_layout() {
        let layout = RawLayout::new(1usize << 62, 8, 1, SampleFormat::U16Le);
        assert!(matches!(
            layout.expected_bytes(),
            Err(DemodError::DimensionMismatch(_))
        ));
        let err = FrameStack::from_bytes(&[0u8; 16], &layout).unwrap_err();
        assert!(matches!(err, DemodError::DimensionMismatch(_)));

        // fits per frame, overflows across frames
        let layout = RawLayout::new(1 << 20, 1 << 20, 1 << 30, SampleFormat::F64Le);
        assert!(layout.pixels_per_frame().is_ok());
        assert!(layout.expected_bytes().is_err());
    }

    #[test]
    fn test_normalized_frame() {
        let frame = Array2::from_shape_fn((2, 2), |(r, c)| (r * 2 + c) as f64);
        let stack = FrameStack::from_frames(&[frame]).unwrap();
        let normalized = stack.normalized_frame(0).unwrap();

        assert_eq!(normalized[[1, 1]], 1.0);
        assert!((normalized[[0, 1]] - 1.0 / 3.0).abs() < 1e-12);
        assert!(normalized.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_degenerate_and_out_of_range_frames() {
        let stack = FrameStack::from_frames(&[Array2::zeros((3, 3))]).unwrap();
        assert!(matches!(
            stack.normalized_frame(0),
            Err(DemodError::DegenerateFrame { index: 0 })
        ));
        assert!(matches!(
            stack.frame(1),
            Err(DemodError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_from_frames_rejects_mixed_shapes() {
        let frames = vec![Array2::zeros((2, 2)), Array2::zeros((2, 3))];
        assert!(FrameStack::from_frames(&frames).is_err());
        assert!(FrameStack::from_frames(&[]).is_err());
    }

    #[test]
    fn test_read_raw_files() {
        let dir = std::env::temp_dir().join(format!("fringe_lib_raw_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let layout = RawLayout::new(3, 4, 2, SampleFormat::U16Le);
        let stack_path = dir.join("stack.raw");
        std::fs::write(&stack_path, planar_u16_bytes(3, 4, 2)).unwrap();
        let stack = FrameStack::read_raw(&stack_path, &layout).unwrap();
        assert_eq!(stack.num_frames(), 2);

        let single = planar_u16_bytes(3, 4, 1);
        let paths = vec![dir.join("a.raw"), dir.join("b.raw"), dir.join("c.raw")];
        for path in &paths {
            std::fs::write(path, &single).unwrap();
        }
        let frames = FrameStack::read_raw_frames(&paths, &layout).unwrap();
        assert_eq!(frames.num_frames(), 3);
        assert_eq!(frames.data()[[2, 3, 2]], 23.0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
