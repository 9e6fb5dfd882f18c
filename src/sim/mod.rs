//! Simulation stepping
//!
//! Per tick: curl, vorticity confinement, divergence, pressure seed, Jacobi
//! relaxation, projection, velocity advection, dye advection. No pass may be
//! reordered; each reads what the previous one wrote.

pub mod clock;
pub mod stepper;

pub use clock::FrameClock;
pub use stepper::{correct_radius, SimulationStepper, StepReport};
