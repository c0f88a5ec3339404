//! GPU-compatible data structures for the cloth simulation.
//!
//! All structs use `#[repr(C)]` and implement `Pod`/`Zeroable` for GPU buffer compatibility.

use bytemuck::{Pod, Zeroable};

use crate::simulation::{ClothConfig, PassError};

/// One RGBA32F texel. Position and velocity textures store a 3-vector in
/// `xyz`; `w` is padding (1 for positions, 0 for velocities).
pub type Texel = [f32; 4];

/// Maximum number of pinned nodes the uniform block can describe.
pub const MAX_GPU_PINS: usize = 4;

/// Uniform block shared by the velocity and position passes.
///
/// Mirrors `struct ClothParams` in the cloth WGSL shaders.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ClothParams {
    /// Ambient wind velocity `uf` (xyz), w unused
    pub wind: [f32; 4],
    /// Spring stiffness: structural, shear, flexion, unused
    pub stiffness: [f32; 4],
    /// Rest length the force law uses per rank, unused
    pub rest_length: [f32; 4],
    /// Pinned nodes as (row, column, 0, 0)
    pub pins: [[i32; 4]; MAX_GPU_PINS],
    /// Mass of every node
    pub mass: f32,
    /// Gravitational acceleration (applied along -Y)
    pub gravity: f32,
    /// Linear damping coefficient `Cd`
    pub damping: f32,
    /// Fluid drag coefficient `Cv`
    pub fluid_drag: f32,
    /// Integration step in seconds
    pub step_size: f32,
    /// Texture side length in texels (the grid resolution)
    pub width: u32,
    /// Number of valid entries in `pins`
    pub pin_count: u32,
    /// Nonzero while the position pass holds nodes at the origin texture
    pub is_start: u32,
}

impl ClothParams {
    /// Pack `config` into the uniform layout.
    pub fn new(config: &ClothConfig, is_start: bool) -> Result<Self, PassError> {
        let pinned = config.pinned_nodes();
        if pinned.len() > MAX_GPU_PINS {
            return Err(PassError::TooManyPins {
                count: pinned.len(),
                max: MAX_GPU_PINS,
            });
        }
        let mut pins = [[0i32; 4]; MAX_GPU_PINS];
        for (slot, at) in pins.iter_mut().zip(&pinned) {
            *slot = [at.i as i32, at.j as i32, 0, 0];
        }
        let [k0, k1, k2] = config.stiffness;
        let [l0, l1, l2] = config.rest_lengths().effective_all();
        Ok(Self {
            wind: [config.wind.x, config.wind.y, config.wind.z, 0.0],
            stiffness: [k0, k1, k2, 0.0],
            rest_length: [l0, l1, l2, 0.0],
            pins,
            mass: config.mass,
            gravity: config.gravity,
            damping: config.damping,
            fluid_drag: config.fluid_drag,
            step_size: config.step_size,
            width: config.mesh_resolution as u32,
            pin_count: pinned.len() as u32,
            is_start: is_start as u32,
        })
    }

    /// Same parameters with the `is_start` flag replaced.
    pub fn with_start(mut self, is_start: bool) -> Self {
        self.is_start = is_start as u32;
        self
    }

    pub fn is_pinned(&self, row: i32, column: i32) -> bool {
        self.pins[..self.pin_count as usize]
            .iter()
            .any(|p| p[0] == row && p[1] == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{GridCoord, Pinning};

    #[test]
    fn cloth_params_size() {
        // 3 vec4 + 4 pin vec4 + 8 scalars = 48 + 64 + 32
        assert_eq!(std::mem::size_of::<ClothParams>(), 144);
        assert_eq!(std::mem::size_of::<ClothParams>() % 16, 0, "ClothParams must be 16-byte aligned");
    }

    #[test]
    fn packs_pins_and_flags() {
        let config = ClothConfig {
            mesh_resolution: 8,
            ..ClothConfig::default()
        };
        let params = ClothParams::new(&config, true).unwrap();
        assert_eq!(params.width, 8);
        assert_eq!(params.pin_count, 2);
        assert!(params.is_pinned(7, 0));
        assert!(params.is_pinned(7, 7));
        assert!(!params.is_pinned(0, 0));
        assert_eq!(params.is_start, 1);
        assert_eq!(params.with_start(false).is_start, 0);
    }

    #[test]
    fn rejects_too_many_pins() {
        let config = ClothConfig {
            pinning: Pinning::Nodes((0..5).map(|j| GridCoord::new(0, j)).collect()),
            ..ClothConfig::default()
        };
        assert!(matches!(
            ClothParams::new(&config, false),
            Err(PassError::TooManyPins { count: 5, max: MAX_GPU_PINS })
        ));
    }
}
