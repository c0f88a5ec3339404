//! Semi-implicit Euler integration of the cloth on the CPU.

use bevy::prelude::*;

use super::forces::{net_force, ForceModel};
use super::grid::{GridCoord, Grid2};
use super::physics_config::{ClothConfig, FlexionRestLength};
use super::state::ParticleState;

/// Simulation context: configuration, particle state and integration scratch.
#[derive(Resource, Clone, Debug)]
pub struct ClothSimulation {
    config: ClothConfig,
    model: ForceModel,
    pinned: Vec<GridCoord>,
    state: ParticleState,
    /// Per-node forces of the step in progress.
    forces: Grid2<Vec3>,
    steps: u64,
}

impl ClothSimulation {
    /// New simulation starting from the flat lattice.
    pub fn new(config: ClothConfig) -> Self {
        let state = ParticleState::lattice(config.mesh_resolution);
        Self::from_state(config, state)
    }

    /// New simulation starting from an arbitrary state of matching size.
    pub fn from_state(config: ClothConfig, mut state: ParticleState) -> Self {
        debug_assert_eq!(
            state.resolution(),
            config.mesh_resolution,
            "state does not match the configured resolution"
        );
        if config.flexion_rest_length == FlexionRestLength::Shear && config.stiffness[2] != 0.0 {
            warn!("flexion springs use the shear rest length");
        }
        state.compute_normals();
        let n = state.resolution();
        Self {
            model: ForceModel::from_config(&config),
            pinned: config.pinned_nodes(),
            forces: Grid2::filled(n, Vec3::ZERO),
            config,
            state,
            steps: 0,
        }
    }

    /// Discard the current state and restart from the flat lattice with `config`.
    pub fn reset(&mut self, config: ClothConfig) {
        *self = Self::new(config);
    }

    pub fn config(&self) -> &ClothConfig {
        &self.config
    }

    pub fn state(&self) -> &ParticleState {
        &self.state
    }

    pub fn pinned(&self) -> &[GridCoord] {
        &self.pinned
    }

    pub fn is_pinned(&self, at: GridCoord) -> bool {
        self.pinned.contains(&at)
    }

    /// Number of completed steps since creation or the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Update the wind without resetting the state.
    pub fn set_wind(&mut self, wind: Vec3) {
        self.config.wind = wind;
        self.model.wind = wind;
    }

    /// Advance every free node by `step_size` seconds.
    ///
    /// All forces are evaluated on the pre-step state before any node moves.
    pub fn step(&mut self, step_size: f32) {
        self.state.compute_normals();
        for at in self.state.positions.coords() {
            self.forces[at] = net_force(&self.state, &self.model, at);
        }

        let mass = self.model.mass;
        for at in self.state.positions.coords() {
            if self.pinned.contains(&at) {
                continue;
            }
            let velocity = self.state.velocities[at] + self.forces[at] / mass * step_size;
            self.state.velocities[at] = velocity;
            self.state.positions[at] += velocity * step_size;
        }
        self.steps += 1;
    }

    /// Run the configured number of sub-steps for one rendered frame.
    /// Returns the number of steps taken.
    pub fn advance_frame(&mut self) -> u32 {
        let substeps = self.config.substeps_per_frame();
        let step_size = self.config.step_size;
        for _ in 0..substeps {
            self.step(step_size);
        }
        substeps
    }
}
