//! Camera capture via a raw-video subprocess
//!
//! Spawns `libcamera-vid` emitting planar YUV420 frames on stdout. A
//! blocking reader thread slices stdout into whole frames and feeds a small
//! channel; `read()` drains the channel to the newest frame so the
//! broadcast loop always works on fresh data and a stalled consumer never
//! backs up into the camera process.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::FrameSource;
use crate::{yuv420_to_rgb, Frame, FRAME_HEIGHT, FRAME_WIDTH};

/// Frames buffered between the reader thread and `read()`
const CHANNEL_DEPTH: usize = 4;

/// Camera capture configuration.
#[derive(Debug, Clone)]
pub struct CameraCaptureConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second requested from the camera
    pub fps: u32,
}

impl Default for CameraCaptureConfig {
    fn default() -> Self {
        Self {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            fps: 30,
        }
    }
}

impl CameraCaptureConfig {
    /// Size of one raw YUV420 frame in bytes
    fn frame_len(&self) -> usize {
        let (w, h) = (self.width as usize, self.height as usize);
        w * h + 2 * ((w / 2) * (h / 2))
    }
}

/// Handle to a running camera capture process.
pub struct CameraCapture {
    child: Option<Child>,
    rx: mpsc::Receiver<Bytes>,
    config: CameraCaptureConfig,
    started: Instant,
}

impl CameraCapture {
    /// Start the capture subprocess.
    pub fn start(config: CameraCaptureConfig) -> Result<Self> {
        let args = [
            "-t".to_string(),
            "0".to_string(), // Run indefinitely
            "--width".to_string(),
            config.width.to_string(),
            "--height".to_string(),
            config.height.to_string(),
            "--framerate".to_string(),
            config.fps.to_string(),
            "--codec".to_string(),
            "yuv420".to_string(),
            "--nopreview".to_string(),
            "--flush".to_string(),
            "-o".to_string(),
            "-".to_string(), // Raw frames to stdout
        ];

        info!(
            "Starting libcamera-vid: {}x{} @ {}fps (raw yuv420)",
            config.width, config.height, config.fps
        );

        let mut child = Command::new("libcamera-vid")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn libcamera-vid. Is it installed?")?;

        let stdout = child
            .stdout
            .take()
            .context("Failed to capture stdout from libcamera-vid")?;

        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let frame_len = config.frame_len();
        tokio::task::spawn_blocking(move || {
            read_raw_stream(stdout, tx, frame_len);
        });

        Ok(Self {
            child: Some(child),
            rx,
            config,
            started: Instant::now(),
        })
    }
}

impl FrameSource for CameraCapture {
    fn read(&mut self) -> Option<Frame> {
        // Drain to the most recent frame; older ones are stale
        let mut latest = None;
        while let Ok(raw) = self.rx.try_recv() {
            latest = Some(raw);
        }
        let raw = latest?;

        let Some(rgb) = yuv420_to_rgb(&raw, self.config.width, self.config.height) else {
            warn!(len = raw.len(), "Short raw frame from camera, skipping");
            return None;
        };
        Some(Frame::new(rgb).with_timestamp(self.started.elapsed().as_micros() as u64))
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Camera capture process stopped");
        }
    }
}

/// Blocking loop: slice stdout into whole raw frames. When the channel is
/// full the frame is discarded; `read()` only wants the newest one anyway.
fn read_raw_stream(mut stdout: impl Read, tx: mpsc::Sender<Bytes>, frame_len: usize) {
    let mut buf = vec![0u8; frame_len];
    loop {
        if let Err(e) = stdout.read_exact(&mut buf) {
            debug!(error = %e, "Camera stdout closed, reader exiting");
            break;
        }
        match tx.try_send(Bytes::copy_from_slice(&buf)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Consumer is behind; drop this frame
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}
