//! Particle state of the cloth lattice.

use bevy::math::Vec3;

use super::grid::{GridCoord, Grid2};

/// Hexagonal fan around a node, as `(di, dj)` offsets in winding order.
/// Consecutive pairs span the up-to-six triangles that share the node.
const FAN: [(i32, i32); 6] = [(0, 1), (1, 1), (1, 0), (0, -1), (-1, -1), (-1, 0)];

/// Positions, velocities and normals of every node, addressed by grid coordinate.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleState {
    pub positions: Grid2<Vec3>,
    pub velocities: Grid2<Vec3>,
    pub normals: Grid2<Vec3>,
}

impl ParticleState {
    /// Flat `n × n` lattice covering `[-2, 2]²` in the XY plane, at rest.
    pub fn lattice(n: usize) -> Self {
        let span = (n.max(2) - 1) as f32;
        let positions = Grid2::from_fn(n, |c| {
            Vec3::new(-2.0 + 4.0 * c.j as f32 / span, -2.0 + 4.0 * c.i as f32 / span, 0.0)
        });
        let mut state = Self {
            velocities: Grid2::filled(n, Vec3::ZERO),
            normals: Grid2::filled(n, Vec3::ZERO),
            positions,
        };
        state.compute_normals();
        state
    }

    /// Side length of the grid.
    pub fn resolution(&self) -> usize {
        self.positions.size()
    }

    pub fn position(&self, at: GridCoord) -> Vec3 {
        self.positions[at]
    }

    pub fn velocity(&self, at: GridCoord) -> Vec3 {
        self.velocities[at]
    }

    pub fn normal(&self, at: GridCoord) -> Vec3 {
        self.normals[at]
    }

    /// Recompute every normal from the current positions.
    pub fn compute_normals(&mut self) {
        for at in self.positions.coords() {
            self.normals[at] = vertex_normal(&self.positions, at);
        }
    }

    /// Sum of `mass * velocity` over all nodes.
    pub fn momentum(&self, mass: f32) -> Vec3 {
        self.velocities.iter().fold(Vec3::ZERO, |acc, v| acc + *v * mass)
    }

    /// Mean position of all nodes.
    pub fn centroid(&self) -> Vec3 {
        if self.positions.is_empty() {
            return Vec3::ZERO;
        }
        self.positions.iter().fold(Vec3::ZERO, |acc, p| acc + *p) / self.positions.len() as f32
    }

    /// Largest node speed.
    pub fn max_speed(&self) -> f32 {
        self.velocities.iter().map(|v| v.length()).fold(0.0, f32::max)
    }

    /// True if every component of every position and velocity is finite.
    pub fn is_finite(&self) -> bool {
        self.positions.iter().chain(self.velocities.iter()).all(|v| v.is_finite())
    }
}

/// Normal of the surface at `at`: the normalized sum of the unit normals of
/// the in-grid triangles of its hexagonal fan.
pub fn vertex_normal(positions: &Grid2<Vec3>, at: GridCoord) -> Vec3 {
    let p0 = positions[at];
    let mut sum = Vec3::ZERO;
    for t in 0..FAN.len() {
        let (di1, dj1) = FAN[t];
        let (di2, dj2) = FAN[(t + 1) % FAN.len()];
        let (Some(p1), Some(p2)) = (positions.neighbor(at, di1, dj1), positions.neighbor(at, di2, dj2))
        else {
            continue;
        };
        sum += (*p1 - p0).cross(*p2 - p0).normalize_or_zero();
    }
    sum.normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_spans_four_units() {
        let state = ParticleState::lattice(5);
        assert_eq!(state.position(GridCoord::new(0, 0)), Vec3::new(-2.0, -2.0, 0.0));
        assert_eq!(state.position(GridCoord::new(4, 4)), Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(state.position(GridCoord::new(0, 2)), Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(state.max_speed(), 0.0);
    }

    #[test]
    fn flat_lattice_normals_point_along_z() {
        let state = ParticleState::lattice(4);
        for n in state.normals.iter() {
            assert!((*n - Vec3::Z).length() < 1e-6, "normal {n:?}");
        }
    }

    #[test]
    fn collapsed_fan_gives_zero_normal() {
        let positions = Grid2::filled(3, Vec3::ONE);
        assert_eq!(vertex_normal(&positions, GridCoord::new(1, 1)), Vec3::ZERO);
    }

    #[test]
    fn momentum_scales_with_mass() {
        let mut state = ParticleState::lattice(2);
        state.velocities.fill(Vec3::X);
        assert_eq!(state.momentum(0.5), Vec3::new(2.0, 0.0, 0.0));
    }
}
