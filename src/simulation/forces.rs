//! Force model of the cloth.
//!
//! The net force on a node is the sum of four terms:
//!
//! - springs to up to twelve neighbors (structural, shear, flexion),
//! - gravity `(0, -g·m, 0)`,
//! - linear damping `-Cd·v`,
//! - fluid drag `Cv·(n·(uf - v))·(uf - v)`.
//!
//! Every function here reads the state and never mutates it.

use bevy::math::Vec3;

use super::grid::GridCoord;
use super::physics_config::{ClothConfig, RestLengths, SpringRank};
use super::state::ParticleState;

/// Physical constants the force law needs, resolved from a [`ClothConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceModel {
    pub mass: f32,
    pub stiffness: [f32; 3],
    pub rest_lengths: RestLengths,
    pub damping: f32,
    pub wind: Vec3,
    pub fluid_drag: f32,
    pub gravity: f32,
}

impl ForceModel {
    pub fn from_config(config: &ClothConfig) -> Self {
        Self {
            mass: config.mass,
            stiffness: config.stiffness,
            rest_lengths: config.rest_lengths(),
            damping: config.damping,
            wind: config.wind,
            fluid_drag: config.fluid_drag,
            gravity: config.gravity,
        }
    }
}

/// Net force split by origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceBreakdown {
    pub spring: Vec3,
    pub gravity: Vec3,
    pub damping: Vec3,
    pub fluid: Vec3,
}

impl ForceBreakdown {
    pub fn total(&self) -> Vec3 {
        self.spring + self.gravity + self.damping + self.fluid
    }
}

/// Force a spring of stiffness `k` and rest length `rest` exerts on the node at
/// `p` when anchored at `q`. Coincident endpoints exert nothing.
pub fn spring_link_force(p: Vec3, q: Vec3, k: f32, rest: f32) -> Vec3 {
    let d = p - q;
    let len = d.length();
    if len <= 0.0 {
        return Vec3::ZERO;
    }
    d * (k * (rest - len) / len)
}

/// Sum of the spring forces of all in-grid neighbors of `at`.
pub fn spring_force(state: &ParticleState, model: &ForceModel, at: GridCoord) -> Vec3 {
    let p = state.position(at);
    let mut total = Vec3::ZERO;
    for rank in SpringRank::ALL {
        let k = model.stiffness[rank.index()];
        let rest = model.rest_lengths.effective(rank);
        for (di, dj) in rank.offsets() {
            if let Some(q) = state.positions.neighbor(at, di, dj) {
                total += spring_link_force(p, *q, k, rest);
            }
        }
    }
    total
}

/// All four force terms acting on `at`.
pub fn force_breakdown(state: &ParticleState, model: &ForceModel, at: GridCoord) -> ForceBreakdown {
    let velocity = state.velocity(at);
    let relative = model.wind - velocity;
    ForceBreakdown {
        spring: spring_force(state, model, at),
        gravity: Vec3::new(0.0, -model.gravity * model.mass, 0.0),
        damping: -model.damping * velocity,
        fluid: model.fluid_drag * state.normal(at).dot(relative) * relative,
    }
}

/// Net force on `at`.
pub fn net_force(state: &ParticleState, model: &ForceModel, at: GridCoord) -> Vec3 {
    force_breakdown(state, model, at).total()
}
