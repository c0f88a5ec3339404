//! Physics configuration for the cloth simulation.
//!
//! This module defines the canonical physical constants of the cloth. Both the
//! CPU integrator and the GPU passes read their parameters from [`ClothConfig`];
//! the GPU side receives them packed into a uniform block (see
//! [`crate::resources::ClothParams`]).

use bevy::{prelude::*, render::extract_resource::ExtractResource};

use super::grid::GridCoord;

/// Gravitational acceleration used by the default configuration.
pub const GRAVITY: f32 = 9.8;

/// Resolutions selectable at runtime with the number keys.
pub const RESOLUTION_PRESETS: [usize; 3] = [25, 100, 200];

/// The three ranks of virtual springs linking a node to its neighbors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpringRank {
    /// Distance-1 orthogonal neighbors.
    Structural = 0,
    /// Distance-1 diagonal neighbors.
    Shear = 1,
    /// Distance-2 orthogonal neighbors.
    Flexion = 2,
}

impl SpringRank {
    pub const ALL: [SpringRank; 3] = [SpringRank::Structural, SpringRank::Shear, SpringRank::Flexion];

    /// Grid offsets `(di, dj)` of the four neighbors of this rank.
    pub const fn offsets(self) -> [(i32, i32); 4] {
        match self {
            SpringRank::Structural => [(1, 0), (-1, 0), (0, 1), (0, -1)],
            SpringRank::Shear => [(1, 1), (1, -1), (-1, 1), (-1, -1)],
            SpringRank::Flexion => [(2, 0), (-2, 0), (0, 2), (0, -2)],
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Which rest length flexion springs pull towards.
///
/// The reference cloth reuses the shear rest length for flexion springs even
/// though a separate flexion length is computed. `Shear` keeps that behavior,
/// `Flexion` uses the geometric distance-2 length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlexionRestLength {
    #[default]
    Shear,
    Flexion,
}

/// Rest lengths of the three spring ranks for a given resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestLengths {
    pub structural: f32,
    pub shear: f32,
    pub flexion: f32,
    pub flexion_mapping: FlexionRestLength,
}

impl RestLengths {
    /// Rest lengths of a `n × n` lattice spanning 4 units per side.
    pub fn for_resolution(n: usize, flexion_mapping: FlexionRestLength) -> Self {
        let structural = 4.0 / (n as f32 - 1.0);
        Self {
            structural,
            shear: std::f32::consts::SQRT_2 * 4.0 / (n as f32 - 1.0),
            flexion: 2.0 * structural,
            flexion_mapping,
        }
    }

    /// Rest length the force law uses for springs of `rank`.
    pub fn effective(&self, rank: SpringRank) -> f32 {
        match rank {
            SpringRank::Structural => self.structural,
            SpringRank::Shear => self.shear,
            SpringRank::Flexion => match self.flexion_mapping {
                FlexionRestLength::Shear => self.shear,
                FlexionRestLength::Flexion => self.flexion,
            },
        }
    }

    /// Effective rest lengths indexed by [`SpringRank::index`].
    pub fn effective_all(&self) -> [f32; 3] {
        SpringRank::ALL.map(|rank| self.effective(rank))
    }
}

/// Which nodes are held fixed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Pinning {
    /// The two corners of the last row, `(n-1, 0)` and `(n-1, n-1)`.
    #[default]
    TopCorners,
    /// An explicit node list.
    Nodes(Vec<GridCoord>),
    /// No pinned nodes.
    Free,
}

impl Pinning {
    /// Resolve to concrete coordinates for a grid of side `n`.
    /// Coordinates outside the grid are dropped.
    pub fn resolve(&self, n: usize) -> Vec<GridCoord> {
        match self {
            Pinning::TopCorners => {
                if n == 0 {
                    Vec::new()
                } else if n == 1 {
                    vec![GridCoord::new(0, 0)]
                } else {
                    vec![GridCoord::new(n - 1, 0), GridCoord::new(n - 1, n - 1)]
                }
            }
            Pinning::Nodes(nodes) => nodes.iter().copied().filter(|c| c.i < n && c.j < n).collect(),
            Pinning::Free => Vec::new(),
        }
    }
}

/// Start-up schedule of the texture integrator.
///
/// During the first `zero_velocity_steps` steps both velocity textures are
/// zero-filled before integrating, which suppresses the velocity spike of the
/// initially stretched springs. Until step `hold_steps` the position pass
/// writes the origin texture instead of integrating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WarmUp {
    pub zero_velocity_steps: u64,
    pub hold_steps: u64,
}

impl WarmUp {
    pub const fn disabled() -> Self {
        Self {
            zero_velocity_steps: 0,
            hold_steps: 0,
        }
    }
}

impl Default for WarmUp {
    fn default() -> Self {
        Self {
            zero_velocity_steps: 10,
            hold_steps: 1,
        }
    }
}

/// The canonical cloth configuration shared by both integrators.
#[derive(Resource, Clone, Debug, PartialEq, ExtractResource)]
pub struct ClothConfig {
    /// Grid side length `n` (at least 2).
    pub mesh_resolution: usize,
    /// Mass of every node.
    pub mass: f32,
    /// Spring stiffness per rank: structural, shear, flexion.
    pub stiffness: [f32; 3],
    /// Linear velocity damping coefficient (`Cd`).
    pub damping: f32,
    /// Ambient wind velocity (`uf`).
    pub wind: Vec3,
    /// Fluid drag coefficient (`Cv`).
    pub fluid_drag: f32,
    /// Gravitational acceleration, applied along -Y.
    pub gravity: f32,
    pub flexion_rest_length: FlexionRestLength,
    pub pinning: Pinning,
    /// Integration step in seconds.
    pub step_size: f32,
    /// Simulated time advanced per rendered frame.
    pub frame_time: f32,
    pub warm_up: WarmUp,
}

impl Default for ClothConfig {
    fn default() -> Self {
        Self {
            mesh_resolution: RESOLUTION_PRESETS[0],
            mass: 0.1,
            // Soft flexion: under the shear rest length it pre-tensions the lattice.
            stiffness: [5_000.0, 5_000.0, 100.0],
            // Drag feeds energy into nodes moving along their normal faster
            // than `damping / fluid_drag`.
            damping: 2.0,
            wind: Vec3::new(0.0, 0.0, 1.0),
            fluid_drag: 0.1,
            gravity: GRAVITY,
            flexion_rest_length: FlexionRestLength::Shear,
            pinning: Pinning::TopCorners,
            step_size: 0.001,
            frame_time: 0.01,
            warm_up: WarmUp::default(),
        }
    }
}

impl ClothConfig {
    pub fn rest_lengths(&self) -> RestLengths {
        RestLengths::for_resolution(self.mesh_resolution, self.flexion_rest_length)
    }

    pub fn pinned_nodes(&self) -> Vec<GridCoord> {
        self.pinning.resolve(self.mesh_resolution)
    }

    pub fn substeps_per_frame(&self) -> u32 {
        substeps_per_frame(self.frame_time, self.step_size)
    }
}

/// Number of `step_size` steps needed to cover `frame_time`, rounded up.
///
/// Ratios that are integral up to float noise (`0.01 / 0.001`) are not bumped
/// to the next integer. Always at least one step.
pub fn substeps_per_frame(frame_time: f32, step_size: f32) -> u32 {
    if step_size <= 0.0 || frame_time <= 0.0 {
        return 1;
    }
    let ratio = frame_time as f64 / step_size as f64;
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() < 1e-4 {
        nearest
    } else {
        ratio.ceil()
    };
    (steps as u32).max(1)
}
