//! Mass-Spring Cloth Simulation Library
//!
//! Exposes both integrators and the rendering plugin for testing and reuse.

pub mod render;
pub mod resources;
pub mod simulation;
