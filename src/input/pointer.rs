use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

/// Raw device input in surface pixel coordinates (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub id: i64,
    pub x: f32,
    pub y: f32,
    pub phase: PointerPhase,
}

impl PointerEvent {
    pub fn new(id: i64, x: f32, y: f32, phase: PointerPhase) -> Self {
        Self { id, x, y, phase }
    }
}

/// Injection request for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    /// Texture-space centre, `0..1` on both axes.
    pub position: Vec2,
    /// Velocity impulse added at the centre.
    pub force: Vec2,
    pub color: [f32; 3],
}

/// A tracked pointer or touch.
#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    pub id: i64,
    pub texcoord: Vec2,
    pub prev_texcoord: Vec2,
    /// Aspect-corrected movement accumulated since the last splat.
    pub delta: Vec2,
    pub down: bool,
    pub moved: bool,
    pub active: bool,
    pub color: [f32; 3],
    positioned: bool,
}

impl Pointer {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            texcoord: Vec2::ZERO,
            prev_texcoord: Vec2::ZERO,
            delta: Vec2::ZERO,
            down: false,
            moved: false,
            active: true,
            color: [0.0; 3],
            positioned: false,
        }
    }

    pub(crate) fn press(&mut self, id: i64, texcoord: Vec2, color: [f32; 3]) {
        self.id = id;
        self.down = true;
        self.moved = false;
        self.active = true;
        self.texcoord = texcoord;
        self.prev_texcoord = texcoord;
        self.delta = Vec2::ZERO;
        self.color = color;
        self.positioned = true;
    }

    /// `correct` maps a raw texture-space delta to an aspect-corrected one.
    pub(crate) fn move_to<F>(&mut self, texcoord: Vec2, color: [f32; 3], correct: F)
    where
        F: Fn(Vec2) -> Vec2,
    {
        self.color = color;
        if !self.positioned {
            // First sample only anchors the pointer
            self.texcoord = texcoord;
            self.prev_texcoord = texcoord;
            self.positioned = true;
            return;
        }

        self.prev_texcoord = self.texcoord;
        self.texcoord = texcoord;
        self.delta += correct(self.texcoord - self.prev_texcoord);
        self.moved = self.delta.x.abs() > 0.0 || self.delta.y.abs() > 0.0;
    }

    pub(crate) fn release(&mut self) {
        self.down = false;
    }

    /// Consume accumulated movement.
    pub(crate) fn take_delta(&mut self) -> Option<Vec2> {
        if !self.moved {
            return None;
        }
        self.moved = false;
        Some(std::mem::take(&mut self.delta))
    }
}
