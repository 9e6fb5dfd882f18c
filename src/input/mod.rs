//! Pointer tracking and splat generation
//!
//! Event handlers only queue [`PointerEvent`]s. The queue is drained at the
//! start of the next tick so a frame never observes half-applied input.

pub mod color;
pub mod pointer;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{PointerMode, SimulationConfig};
use crate::constants::splat::{AMBIENT_POINTER_ID, CLICK_COLOR_BOOST, CLICK_FORCE_X, CLICK_FORCE_Y};

pub use color::{generate_color, hsv_to_rgb};
pub use pointer::{Pointer, PointerEvent, PointerPhase, Splat};

/// Scale a texture-space delta so equal screen distances give equal impulses.
pub fn correct_delta(delta: Vec2, aspect_ratio: f32) -> Vec2 {
    let mut corrected = delta;
    if aspect_ratio < 1.0 {
        corrected.x *= aspect_ratio;
    }
    if aspect_ratio > 1.0 {
        corrected.y /= aspect_ratio;
    }
    corrected
}

#[derive(Debug)]
pub struct InputController {
    mode: PointerMode,
    /// Index 0 is the ambient pointer and is never removed.
    pointers: Vec<Pointer>,
    queue: Vec<PointerEvent>,
    rng: StdRng,
    color_timer: f32,
    surface: (u32, u32),
    has_interacted: bool,
}

impl InputController {
    pub fn new(mode: PointerMode, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            mode,
            pointers: vec![Pointer::new(AMBIENT_POINTER_ID)],
            queue: Vec::new(),
            rng,
            color_timer: 0.0,
            surface: (1, 1),
            has_interacted: false,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.pointer_mode, config.seed)
    }

    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.surface = (width.max(1), height.max(1));
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.surface.0 as f32 / self.surface.1 as f32
    }

    /// Queue an event for the next tick.
    pub fn feed(&mut self, event: PointerEvent) {
        self.queue.push(event);
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    pub fn active_pointers(&self) -> impl Iterator<Item = &Pointer> {
        self.pointers.iter().filter(|pointer| pointer.active)
    }

    /// Apply queued input and return this tick's splats.
    pub fn process(&mut self, dt: f32, config: &SimulationConfig) -> Vec<Splat> {
        self.update_colors(dt, config.color_update_speed);

        let mut splats = Vec::new();
        let events = std::mem::take(&mut self.queue);
        for event in events {
            self.apply(event, &mut splats);
        }

        for pointer in self.pointers.iter_mut() {
            if let Some(delta) = pointer.take_delta() {
                splats.push(Splat {
                    position: pointer.texcoord,
                    force: delta * config.splat_force,
                    color: pointer.color,
                });
            }
        }

        if !splats.is_empty() {
            log::trace!("[InputController::process] {} splats", splats.len());
        }
        splats
    }

    /// Cycle pointer colours on a timer driven by `speed`.
    fn update_colors(&mut self, dt: f32, speed: f32) {
        self.color_timer += dt * speed;
        if self.color_timer >= 1.0 {
            self.color_timer = self.color_timer.rem_euclid(1.0);
            for pointer in self.pointers.iter_mut() {
                pointer.color = generate_color(&mut self.rng);
            }
        }
    }

    fn apply(&mut self, event: PointerEvent, splats: &mut Vec<Splat>) {
        let texcoord = Vec2::new(
            event.x / self.surface.0 as f32,
            event.y / self.surface.1 as f32,
        );
        let aspect = self.aspect_ratio();
        let index = self.pointer_index(&event);

        match event.phase {
            PointerPhase::Down => {
                self.has_interacted = true;
                let color = generate_color(&mut self.rng);
                self.pointers[index].press(event.id, texcoord, color);
                let splat = self.click_splat(texcoord);
                splats.push(splat);
            }
            PointerPhase::Move => {
                let color = if self.has_interacted {
                    self.pointers[index].color
                } else {
                    generate_color(&mut self.rng)
                };
                self.has_interacted = true;
                self.pointers[index].move_to(texcoord, color, |delta| correct_delta(delta, aspect));
            }
            PointerPhase::Up => {
                let pointer = &mut self.pointers[index];
                pointer.release();
                if index > 0 {
                    pointer.active = false;
                }
            }
        }
    }

    /// Randomised impulse so a tap without drag still shows.
    fn click_splat(&mut self, position: Vec2) -> Splat {
        let [r, g, b] = generate_color(&mut self.rng);
        let force = Vec2::new(
            CLICK_FORCE_X * (self.rng.gen::<f32>() - 0.5),
            CLICK_FORCE_Y * (self.rng.gen::<f32>() - 0.5),
        );
        Splat {
            position,
            force,
            color: [
                r * CLICK_COLOR_BOOST,
                g * CLICK_COLOR_BOOST,
                b * CLICK_COLOR_BOOST,
            ],
        }
    }

    fn pointer_index(&mut self, event: &PointerEvent) -> usize {
        if self.mode == PointerMode::Pooled || event.id == AMBIENT_POINTER_ID {
            return 0;
        }

        let tracked = self
            .pointers
            .iter()
            .skip(1)
            .position(|pointer| pointer.active && pointer.id == event.id)
            .map(|offset| offset + 1);
        if let Some(index) = tracked {
            return index;
        }

        if event.phase != PointerPhase::Down {
            // Untracked hover or stray release drives the ambient pointer
            return 0;
        }

        match self.pointers.iter().skip(1).position(|pointer| !pointer.active) {
            Some(offset) => offset + 1,
            None => {
                self.pointers.push(Pointer::new(event.id));
                self.pointers.len() - 1
            }
        }
    }
}
