//! Presentation: display passes, frame pacing, masks and frame statistics.

pub mod compositor;
pub mod frame_stats;
pub mod mask;
pub mod pacer;

pub use compositor::{Compositor, Presented};
pub use frame_stats::{FrameStats, PerformanceStatus};
pub use mask::MaskImage;
pub use pacer::FramePacer;
