//! Frame sources
//!
//! The broadcast loop is the single owner of whichever source is in use and
//! pulls at most one frame per cycle. A source that has nothing new simply
//! returns `None`; that is a skipped cycle, never an error.

mod camera;
mod test_source;

pub use camera::{CameraCapture, CameraCaptureConfig};
pub use test_source::TestPattern;

use crate::Frame;

/// One pull-based frame producer.
pub trait FrameSource: Send + 'static {
    /// Fetch the newest available frame, or `None` when no frame is ready
    /// this cycle.
    fn read(&mut self) -> Option<Frame>;
}
