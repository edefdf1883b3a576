//! Population-based global optimizers for geophysical inversion
//!
//! This crate provides a particle swarm optimizer (inertia or constriction
//! control, full/ring/toroidal topologies) and a binary-coded genetic
//! algorithm over a bounded parameter space, driven generation by generation
//! through a submit/receive/join evaluation barrier.

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod functions;
pub mod genalg;
pub mod grid;
pub mod objective;
pub mod pspace;
pub mod random;
pub mod store;
pub mod swarm;
pub mod topology;

pub use error::{OptError, Result};
pub use grid::Grid;
pub use objective::{Objective, Sense};
pub use pspace::{Bounds, ParameterSpace};
