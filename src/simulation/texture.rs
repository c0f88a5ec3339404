//! Texture-resident particle state.
//!
//! The GPU integrator keeps positions and velocities in RGBA32F textures of
//! side `n`. Texel `(x, y)` holds node `(i, j) = (y, x)`.

use bevy::math::Vec3;

use super::grid::{GridCoord, Grid2};
use super::gpgpu::PassError;
use crate::resources::Texel;

/// Identity of one of the fixed state textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

impl TextureId {
    pub const VELOCITY_A: TextureId = TextureId(0);
    pub const VELOCITY_B: TextureId = TextureId(1);
    pub const POSITION_A: TextureId = TextureId(2);
    pub const POSITION_B: TextureId = TextureId(3);
    pub const ORIGIN: TextureId = TextureId(4);

    /// Number of state textures.
    pub const COUNT: usize = 5;

    pub const ALL: [TextureId; TextureId::COUNT] = [
        TextureId::VELOCITY_A,
        TextureId::VELOCITY_B,
        TextureId::POSITION_A,
        TextureId::POSITION_B,
        TextureId::ORIGIN,
    ];

    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "Cloth Velocity A",
            1 => "Cloth Velocity B",
            2 => "Cloth Position A",
            3 => "Cloth Position B",
            4 => "Cloth Origin",
            _ => "Cloth Texture",
        }
    }
}

/// A square RGBA32F texture held in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct TexelTexture {
    width: u32,
    texels: Vec<Texel>,
}

impl TexelTexture {
    pub fn zeroed(width: u32) -> Self {
        Self {
            width,
            texels: vec![[0.0; 4]; (width * width) as usize],
        }
    }

    /// Encode a grid of vectors, writing `w` into the padding channel.
    pub fn from_vectors(grid: &Grid2<Vec3>, w: f32) -> Self {
        Self {
            width: grid.size() as u32,
            texels: grid.iter().map(|v| [v.x, v.y, v.z, w]).collect(),
        }
    }

    pub fn from_texels(width: u32, texels: Vec<Texel>) -> Result<Self, PassError> {
        let expected = (width * width) as usize;
        if texels.len() != expected {
            return Err(PassError::SizeMismatch {
                expected,
                actual: texels.len(),
            });
        }
        Ok(Self { width, texels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Fetch texel `(x, y)`; `None` outside the texture.
    pub fn load(&self, x: i32, y: i32) -> Option<Texel> {
        let w = self.width as i32;
        if x < 0 || y < 0 || x >= w || y >= w {
            return None;
        }
        Some(self.texels[(y * w + x) as usize])
    }

    /// `xyz` of texel `(x, y)`; `None` outside the texture.
    pub fn load_vec3(&self, x: i32, y: i32) -> Option<Vec3> {
        self.load(x, y).map(|[r, g, b, _]| Vec3::new(r, g, b))
    }

    /// Node `at` of the grid this texture encodes.
    pub fn node(&self, at: GridCoord) -> Option<Vec3> {
        self.load_vec3(at.j as i32, at.i as i32)
    }

    /// Decode into a grid, dropping the padding channel.
    pub fn to_vectors(&self) -> Grid2<Vec3> {
        Grid2::from_fn(self.width as usize, |at| {
            let [r, g, b, _] = self.texels[at.i * self.width as usize + at.j];
            Vec3::new(r, g, b)
        })
    }

    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::state::ParticleState;

    #[test]
    fn texel_addressing_matches_grid() {
        let state = ParticleState::lattice(3);
        let texture = TexelTexture::from_vectors(&state.positions, 1.0);
        let at = GridCoord::new(2, 1);
        assert_eq!(texture.node(at), Some(state.position(at)));
        assert_eq!(texture.load(1, 2).map(|t| t[3]), Some(1.0));
        assert_eq!(texture.load(3, 0), None);
        assert_eq!(texture.load(0, -1), None);
        assert_eq!(texture.to_vectors(), state.positions);
    }

    #[test]
    fn byte_view_is_rgba32f() {
        let texture = TexelTexture::zeroed(4);
        assert_eq!(texture.as_bytes().len(), 4 * 4 * 16);
    }

    #[test]
    fn rejects_wrong_texel_count() {
        assert!(matches!(
            TexelTexture::from_texels(2, vec![[0.0; 4]; 3]),
            Err(PassError::SizeMismatch { expected: 4, actual: 3 })
        ));
    }
}
