use glam::Vec2;

use crate::gpu::capability::{Channels, StorageFormat};

/// Opaque handle to a backend-owned texture that can be drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u32);

impl TargetId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// How a target is sampled when read at fractional coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Linear,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetFormat {
    pub storage: StorageFormat,
    pub channels: Channels,
}

/// Everything a backend needs to allocate a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDesc {
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
    pub filter: FilterMode,
}

impl TargetDesc {
    pub fn with_size(self, width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            ..self
        }
    }
}

/// A single offscreen target.
///
/// Not `Clone`: a `RenderTarget` value is the only owner of its backend
/// texture, and only the pool creates or releases one.
#[derive(Debug, PartialEq)]
pub struct RenderTarget {
    id: TargetId,
    desc: TargetDesc,
    texel_size: Vec2,
}

impl RenderTarget {
    pub(crate) fn new(id: TargetId, desc: TargetDesc) -> Self {
        Self {
            id,
            desc,
            texel_size: Vec2::new(1.0 / desc.width as f32, 1.0 / desc.height as f32),
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub fn texel_size(&self) -> Vec2 {
        self.texel_size
    }

    pub fn desc(&self) -> TargetDesc {
        self.desc
    }

    /// Bind this target as a texture input for a single draw call.
    pub fn attach(&self) -> TextureSource {
        TextureSource::Target(self.id)
    }
}

/// Texture input of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSource {
    Target(TargetId),
    /// The mask image uploaded with `RenderBackend::upload_mask`.
    Mask,
}
