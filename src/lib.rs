//! Yagura - single-camera live video fan-out with per-viewer motion detection
//!
//! One capture source feeds a broadcast loop that fans frames out to any
//! number of WebSocket viewers. Each viewer independently toggles between a
//! plain grayscale view and a "secure" view that runs a motion detector over
//! its own private reference frame and burns annotations into the stream.
//!
//! Module map:
//!
//! - **`frame`**: fixed-resolution frame buffer, grayscale + YUV conversion
//! - **`capture`**: frame sources (camera subprocess, synthetic test pattern)
//! - **`detect`**: pure motion detection over explicit reference state
//! - **`server`**: subscriber registry and the broadcast loop
//! - **`web`**: axum HTTP + WebSocket surface
//! - **`alert`**: fire-and-forget motion notifications

pub mod alert;
pub mod capture;
pub mod detect;
mod frame;
pub mod server;
pub mod web;

pub use frame::{yuv420_to_rgb, Frame, FRAME_HEIGHT, FRAME_WIDTH};
