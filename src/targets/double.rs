use glam::Vec2;

use super::target::RenderTarget;
use crate::error::{FluidError, FluidResult};

/// Two targets with `read` and `write` roles.
///
/// Solver passes sample `read`, draw into `write`, then call [`swap`].
/// The roles are private state: `swap` is the only way they change.
///
/// [`swap`]: DoubleBufferedTarget::swap
#[derive(Debug)]
pub struct DoubleBufferedTarget {
    targets: [RenderTarget; 2],
    read_index: usize,
}

impl DoubleBufferedTarget {
    pub fn new(read: RenderTarget, write: RenderTarget) -> FluidResult<Self> {
        if read.id() == write.id() {
            return Err(FluidError::TargetAliasing(read.id()));
        }
        Ok(Self {
            targets: [read, write],
            read_index: 0,
        })
    }

    pub fn read(&self) -> &RenderTarget {
        &self.targets[self.read_index]
    }

    pub fn write(&self) -> &RenderTarget {
        &self.targets[1 - self.read_index]
    }

    pub fn swap(&mut self) {
        self.read_index = 1 - self.read_index;
    }

    pub fn width(&self) -> u32 {
        self.targets[0].width()
    }

    pub fn height(&self) -> u32 {
        self.targets[0].height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets[0].size()
    }

    pub fn texel_size(&self) -> Vec2 {
        self.targets[0].texel_size()
    }

    /// Split into `(read, write)`.
    pub(crate) fn into_roles(self) -> (RenderTarget, RenderTarget) {
        let [first, second] = self.targets;
        if self.read_index == 0 {
            (first, second)
        } else {
            (second, first)
        }
    }
}
