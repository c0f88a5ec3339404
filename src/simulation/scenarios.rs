//! Named cloth setups.
//!
//! A [`Scenario`] provides both the configuration and the initial particle
//! state. The app runs `Scenario::Drape` unless another one is handed to
//! [`super::SimulationPlugin`].

use bevy::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::grid::GridCoord;
use super::physics_config::{ClothConfig, FlexionRestLength, Pinning, WarmUp};
use super::state::ParticleState;

// ==================== SCENARIO CONFIGS ====================

pub mod config {
    /// Seed of the jittered start.
    pub const JITTER_SEED: u64 = 0x5eed;
    /// Largest per-axis displacement of the jittered start, in world units.
    pub const JITTER_AMPLITUDE: f32 = 0.02;
    /// Resolution of the small structural-only test cloth.
    pub const SAG_RESOLUTION: usize = 3;
}

/// Scenario the running app was started with.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActiveScenario(pub Scenario);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scenario {
    /// Cloth hanging from its top corners in wind.
    #[default]
    Drape,
    /// Same as `Drape` without wind.
    StillAir,
    /// 3×3 grid, structural springs only, one pinned corner.
    StructuralSag,
    /// Unpinned cloth with no gravity, damping or drag.
    FreeFloat,
    /// Lattice at its rest lengths with every external force off.
    RestState,
    /// `Drape` starting from a randomly perturbed lattice.
    Jittered,
}

impl Scenario {
    pub fn config(self) -> ClothConfig {
        match self {
            Scenario::Drape => drape(),
            Scenario::StillAir => still_air(),
            Scenario::StructuralSag => structural_sag(),
            Scenario::FreeFloat => free_float(ClothConfig::default().mesh_resolution),
            Scenario::RestState => rest_state(ClothConfig::default().mesh_resolution),
            Scenario::Jittered => drape(),
        }
    }

    /// Initial particle state for `config`.
    pub fn initial_state(self, config: &ClothConfig) -> ParticleState {
        match self {
            Scenario::Jittered => jittered_lattice(
                config.mesh_resolution,
                config::JITTER_AMPLITUDE,
                config::JITTER_SEED,
            ),
            _ => ParticleState::lattice(config.mesh_resolution),
        }
    }
}

// ==================== SCENARIOS ====================

/// Default setup.
pub fn drape() -> ClothConfig {
    ClothConfig::default()
}

pub fn still_air() -> ClothConfig {
    ClothConfig {
        wind: Vec3::ZERO,
        ..ClothConfig::default()
    }
}

/// A 3×3 cloth with only structural springs, pinned at node `(2, 0)`, sagging
/// under gravity. Small enough to check by hand.
pub fn structural_sag() -> ClothConfig {
    ClothConfig {
        mesh_resolution: config::SAG_RESOLUTION,
        stiffness: [1.0, 0.0, 0.0],
        damping: 0.1,
        wind: Vec3::ZERO,
        fluid_drag: 0.0,
        pinning: Pinning::Nodes(vec![GridCoord::new(2, 0)]),
        step_size: 0.001,
        ..ClothConfig::default()
    }
}

/// Isolated cloth: no pins and no external force. Total momentum is conserved.
pub fn free_float(mesh_resolution: usize) -> ClothConfig {
    ClothConfig {
        mesh_resolution,
        gravity: 0.0,
        damping: 0.0,
        fluid_drag: 0.0,
        wind: Vec3::ZERO,
        pinning: Pinning::Free,
        warm_up: WarmUp::disabled(),
        ..ClothConfig::default()
    }
}

/// Free cloth whose flexion springs rest at twice the structural length, so
/// the initial lattice is an equilibrium.
pub fn rest_state(mesh_resolution: usize) -> ClothConfig {
    ClothConfig {
        flexion_rest_length: FlexionRestLength::Flexion,
        ..free_float(mesh_resolution)
    }
}

/// The initial lattice with every node displaced by up to `amplitude` per
/// axis. Reproducible for a given `seed`.
pub fn jittered_lattice(n: usize, amplitude: f32, seed: u64) -> ParticleState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = ParticleState::lattice(n);
    for at in state.positions.coords() {
        let offset = Vec3::new(
            rng.gen_range(-amplitude..=amplitude),
            rng.gen_range(-amplitude..=amplitude),
            rng.gen_range(-amplitude..=amplitude),
        );
        state.positions[at] += offset;
    }
    state.compute_normals();
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_reproducible_and_bounded() {
        let a = jittered_lattice(5, 0.01, 7);
        let b = jittered_lattice(5, 0.01, 7);
        assert_eq!(a, b);
        let lattice = ParticleState::lattice(5);
        for at in lattice.positions.coords() {
            let d = a.position(at) - lattice.position(at);
            assert!(d.abs().max_element() <= 0.01);
        }
        assert_ne!(a, jittered_lattice(5, 0.01, 8));
    }

    #[test]
    fn structural_sag_pins_one_corner() {
        let config = structural_sag();
        assert_eq!(config.pinned_nodes(), vec![GridCoord::new(2, 0)]);
        assert_eq!(config.stiffness, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn rest_state_uses_flexion_length() {
        let lengths = rest_state(4).rest_lengths();
        assert_eq!(lengths.effective_all()[2], lengths.flexion);
    }
}
