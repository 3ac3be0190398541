//! Camera capture abstraction and local frame analysis.
//!
//! The monitor never talks to real capture hardware directly; it opens a
//! [`Camera`] and pulls [`Frame`]s from the resulting [`FrameSource`].
//! The [`SyntheticCamera`] drives the demo binary and timing tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

/// Pixels to skip between luminance samples. Sampling a uniform subset
/// keeps the blindness check cheap on large frames.
const LUMINANCE_SAMPLE_STRIDE: usize = 10;

const SYNTHETIC_WIDTH: u32 = 64;
const SYNTHETIC_HEIGHT: u32 = 48;
const SYNTHETIC_BYTES: usize = 64 * 48 * 3;

/// Errors from camera acquisition and capture.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The capture device could not be acquired.
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    /// A frame could not be read from an open device.
    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// One still frame in packed 8-bit RGB.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Packed RGB bytes, row-major, `width * height * 3` long.
    pub rgb: Vec<u8>,
}

impl Frame {
    /// Mean luminance over a strided pixel subsample, 0..255.
    ///
    /// An empty frame reads as fully dark.
    pub fn mean_luminance(&self) -> f64 {
        let mut sum = 0.0_f64;
        let mut samples = 0_u32;
        for px in self.rgb.chunks_exact(3).step_by(LUMINANCE_SAMPLE_STRIDE) {
            let brightness =
                (f64::from(px[0]) + f64::from(px[1]) + f64::from(px[2])) / 3.0;
            sum += brightness;
            samples = samples.saturating_add(1);
        }
        if samples == 0 {
            return 0.0;
        }
        sum / f64::from(samples)
    }

    /// Encode the frame as an opaque base64 payload for oracle calls.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.rgb)
    }
}

/// An open capture handle yielding frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Capture one still frame.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::Capture`] if the stream is interrupted.
    async fn capture(&mut self) -> Result<Frame, CameraError>;
}

/// A capture device that can be opened into a [`FrameSource`].
#[async_trait]
pub trait Camera: Send + Sync {
    /// Acquire the capture handle.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::Unavailable`] if acquisition fails.
    async fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Deterministic camera producing uniform frames.
///
/// The obstruction flag can be flipped at runtime to switch the feed to
/// black frames, which is how the demo provokes the blindness heuristic.
#[derive(Clone)]
pub struct SyntheticCamera {
    brightness: u8,
    available: bool,
    obstructed: Arc<AtomicBool>,
}

impl SyntheticCamera {
    /// A working camera producing frames at the given brightness.
    pub fn new(brightness: u8) -> Self {
        Self {
            brightness,
            available: true,
            obstructed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A camera whose acquisition always fails.
    pub fn unavailable() -> Self {
        Self {
            brightness: 0,
            available: false,
            obstructed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for flipping the feed to black frames mid-session.
    pub fn obstruction_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.obstructed)
    }
}

struct SyntheticSource {
    brightness: u8,
    obstructed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn capture(&mut self) -> Result<Frame, CameraError> {
        let level = if self.obstructed.load(Ordering::Relaxed) {
            0
        } else {
            self.brightness
        };
        Ok(Frame {
            width: SYNTHETIC_WIDTH,
            height: SYNTHETIC_HEIGHT,
            rgb: vec![level; SYNTHETIC_BYTES],
        })
    }
}

#[async_trait]
impl Camera for SyntheticCamera {
    async fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if !self.available {
            return Err(CameraError::Unavailable(
                "no capture device present".to_owned(),
            ));
        }
        Ok(Box::new(SyntheticSource {
            brightness: self.brightness,
            obstructed: Arc::clone(&self.obstructed),
        }))
    }
}
