//! Offscreen render targets
//!
//! The pool owns every texture the simulation draws into. Other components
//! only see `RenderTarget` values and attach them as draw inputs for a
//! single call.

pub mod double;
pub mod pool;
pub mod target;

pub use double::DoubleBufferedTarget;
pub use pool::{FieldLayout, FieldSet, RenderTargetPool};
pub use target::{FilterMode, RenderTarget, TargetDesc, TargetFormat, TargetId, TextureSource};
